//! Per-frame processing for recordings: mirror, resize, and burn in the
//! wall-clock time and elapsed recording time.

use chrono::{DateTime, TimeZone};
use image::imageops::{self, FilterType};
use image::Rgb;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::media::{Frame, VideoFormat};

/// Glyph height in font pixels.
const GLYPH_HEIGHT: u32 = 7;

/// Horizontal advance per character in font pixels.
const GLYPH_ADVANCE: u32 = 6;

/// Screen pixels per font pixel.
const TEXT_SCALE: u32 = 2;

/// Left margin of the overlay text.
const TEXT_X: i32 = 20;

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// 5x7 glyphs, one byte per row, bit 4 is the leftmost column.
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c.to_ascii_uppercase() {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ' ' => [0x00; 7],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        _ => return None,
    };
    Some(rows)
}

/// Draw `text` with its baseline at `baseline` (the bottom row of the
/// glyphs). Characters without a glyph leave a gap.
pub fn draw_text(frame: &mut Frame, text: &str, x: i32, baseline: i32) {
    let scale = TEXT_SCALE as i32;
    let top = baseline - (GLYPH_HEIGHT * TEXT_SCALE) as i32;
    let mut cursor = x;
    for c in text.chars() {
        if let Some(rows) = glyph(c) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..5 {
                    if bits & (0x10 >> col) != 0 {
                        let px = cursor + col * scale;
                        let py = top + row as i32 * scale;
                        draw_filled_rect_mut(
                            frame,
                            Rect::at(px, py).of_size(TEXT_SCALE, TEXT_SCALE),
                            TEXT_COLOR,
                        );
                    }
                }
            }
        }
        cursor += (GLYPH_ADVANCE * TEXT_SCALE) as i32;
    }
}

/// Mirror `frame` horizontally and bring it to the recording size.
#[must_use]
pub fn prepare(frame: &Frame, format: VideoFormat) -> Frame {
    let mirrored = imageops::flip_horizontal(frame);
    if mirrored.dimensions() == (format.width, format.height) {
        mirrored
    } else {
        imageops::resize(&mirrored, format.width, format.height, FilterType::Triangle)
    }
}

/// The two overlay lines for a frame captured at `now`, `elapsed_secs`
/// into the recording.
#[must_use]
pub fn overlay_lines<Tz: TimeZone>(now: &DateTime<Tz>, elapsed_secs: u64) -> (String, String)
where
    Tz::Offset: std::fmt::Display,
{
    (
        now.format("%Y-%m-%d %H:%M:%S").to_string(),
        format!("RECORDING TIME: {elapsed_secs}S"),
    )
}

/// Burn the wall-clock time and the elapsed recording time into `frame`.
pub fn stamp<Tz: TimeZone>(frame: &mut Frame, now: &DateTime<Tz>, elapsed_secs: u64)
where
    Tz::Offset: std::fmt::Display,
{
    let height = i32::try_from(frame.height()).unwrap_or(i32::MAX);
    let (clock, elapsed) = overlay_lines(now, elapsed_secs);
    draw_text(frame, &clock, TEXT_X, height - 20);
    draw_text(frame, &elapsed, TEXT_X, height - 50);
}
