//! `camwatch` - CLI for camwatch
//!
//! This binary provides the command-line interface for logging in, recording
//! from all cameras, playing recordings back and reading number plates.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use camwatch::account::{ConsentForm, PermissionOutcome, ProfileUpdate};
use camwatch::cli::{
    AccountCommand, Cli, Command, ConfigCommand, ImagesCommand, ImportCommand, PlayCommand,
    PlateCommand, ProfileCommand, RecordCommand,
};
use camwatch::media::ffmpeg::{FfmpegCamera, FfmpegEncoderFactory, FfmpegVideoOpener};
use camwatch::media::{CameraBackend, NullPreview, Preview, SnapshotPreview, VideoOpener};
use camwatch::plate::{self, PlateExtractor, PlateReader, TesseractRecognizer};
use camwatch::playback::{self, PlaybackController, Zoom};
use camwatch::{init_logging, AppContext, Config, LoginOutcome, RecordingSupervisor};

/// How often a running recording checks whether every camera has stopped.
const RECORDING_POLL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    if let Command::Config(config_cmd) = cli.command {
        return handle_config(cli.config, config_cmd);
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;
    let ctx = AppContext::new(config);

    match cli.command {
        Command::Login(cmd) => handle_login(&ctx, &cmd.email),
        Command::Logout => {
            let session = ctx.logout()?;
            println!("Logged out {}.", session.email);
            Ok(())
        }
        Command::Whoami => handle_whoami(&ctx),
        Command::Permissions(cmd) => handle_permissions(&ctx, ConsentForm::new(cmd.camera, cmd.storage)),
        Command::Profile(cmd) => handle_profile(&ctx, cmd),
        Command::Account(cmd) => handle_account(&ctx, cmd),
        Command::Record(cmd) => handle_record(&ctx, cmd).await,
        Command::Import(cmd) => handle_import(&ctx, &cmd),
        Command::Images(cmd) => handle_images(&ctx, cmd),
        Command::Play(cmd) => handle_play(&ctx, cmd).await,
        Command::Plate(cmd) => handle_plate(&ctx, cmd).await,
        Command::Config(_) => Ok(()),
    }
}

fn handle_login(ctx: &AppContext, email: &str) -> Result<()> {
    let (session, outcome) = ctx.login(email)?;
    match outcome {
        LoginOutcome::WelcomeBack => println!("Welcome back, {}!", session.email),
        LoginOutcome::NeedsPermission { created } => {
            if created {
                println!("Account created for {}.", session.email);
            } else {
                println!("Logged in as {}.", session.email);
            }
            println!("Recording needs camera and storage access:");
            println!("  camwatch permissions --camera --storage");
        }
    }
    Ok(())
}

fn handle_whoami(ctx: &AppContext) -> Result<()> {
    let (session, record) = ctx.current_user()?;
    println!("Email:       {}", session.email);
    println!("Logged in:   {}", session.logged_in_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Permission:  {}", record.permission);
    println!("Save path:   {}", display_or_unset(record.save_path.as_deref()));
    Ok(())
}

fn handle_permissions(ctx: &AppContext, form: ConsentForm) -> Result<()> {
    match ctx.submit_permissions(form)? {
        PermissionOutcome::Granted => println!("Permissions granted. You can start recording."),
        PermissionOutcome::Denied => {
            println!("Permission denied. Recording needs both --camera and --storage.");
        }
    }
    Ok(())
}

fn handle_profile(ctx: &AppContext, cmd: ProfileCommand) -> Result<()> {
    match cmd {
        ProfileCommand::Show { json } => {
            let (_, record) = ctx.current_user()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
                println!("Personal Information");
                println!("====================");
                println!("  Email:        {}", record.email);
                println!("  Name:         {}", field(&record.name));
                println!("  Country code: {}", field(&record.country_code));
                println!("  Contact:      {}", field(&record.contact));
                println!("  Address:      {}", field(&record.address));
            }
        }
        ProfileCommand::Set {
            name,
            country_code,
            contact,
            address,
        } => {
            let update = ProfileUpdate {
                name,
                country_code,
                contact,
                address,
            };
            if update.is_empty() {
                bail!("nothing to update: pass --name, --country-code, --contact or --address");
            }
            ctx.update_profile(&update)?;
            println!("Personal information updated successfully.");
        }
    }
    Ok(())
}

fn handle_account(ctx: &AppContext, cmd: AccountCommand) -> Result<()> {
    match cmd {
        AccountCommand::SavePath { path: None } => {
            let (_, record) = ctx.current_user()?;
            println!("{}", display_or_unset(record.save_path.as_deref()));
        }
        AccountCommand::SavePath { path: Some(path) } => {
            if !path.is_dir() {
                bail!("{} is not a directory", path.display());
            }
            ctx.set_save_path(&path)?;
            println!("Recordings will be saved to {}.", path.display());
        }
        AccountCommand::Delete { yes: false } => {
            let session = ctx.current_session()?;
            println!("This will delete the account {} and log you out.", session.email);
            println!("Use --yes to confirm.");
        }
        AccountCommand::Delete { yes: true } => {
            let email = ctx.delete_account()?;
            println!("Account {email} deleted.");
        }
    }
    Ok(())
}

fn preview_sink(dir: Option<PathBuf>, every: u64) -> Arc<dyn Preview> {
    match dir {
        Some(dir) => Arc::new(SnapshotPreview::new(dir, every)),
        None => Arc::new(NullPreview),
    }
}

async fn handle_record(ctx: &AppContext, cmd: RecordCommand) -> Result<()> {
    let target = ctx.recording_target(cmd.save_path.as_deref())?;
    let config = ctx.config();
    let device_count = cmd.cameras.unwrap_or(config.recording.device_count);

    let mut supervisor = RecordingSupervisor::new(
        Arc::new(FfmpegCamera::from_config(config)),
        Arc::new(FfmpegEncoderFactory::new(config.camera.ffmpeg.clone())),
        preview_sink(cmd.preview_dir, u64::from(config.recording.fps)),
        config.video_format(),
    );

    let root = target.clone();
    let (mut supervisor, started) = tokio::task::spawn_blocking(move || {
        let started = supervisor.start(&root, device_count);
        (supervisor, started)
    })
    .await
    .context("camera start-up task failed")?;
    let report = started?;

    for (camera, reason) in &report.skipped {
        debug!("Camera {camera} skipped: {reason}");
    }
    if report.is_empty() {
        println!("No cameras available.");
        return Ok(());
    }

    let cameras: Vec<String> = report.started.iter().map(ToString::to_string).collect();
    println!(
        "Recording camera(s) {} into {}",
        cameras.join(", "),
        target.display()
    );
    match cmd.duration {
        Some(secs) => println!("Stopping after {secs}s, or press Ctrl-C."),
        None => println!("Press Ctrl-C to stop."),
    }

    wait_for_stop(&supervisor, cmd.duration.map(Duration::from_secs)).await;

    let reports = tokio::task::spawn_blocking(move || supervisor.stop())
        .await
        .context("camera shutdown task failed")?;
    for report in reports {
        let output = report
            .output
            .as_deref()
            .map_or_else(|| "-".to_string(), |path| path.display().to_string());
        println!(
            "Camera {}: {} frames, {} ({})",
            report.camera, report.frames_written, output, report.outcome
        );
    }
    Ok(())
}

/// Wait for Ctrl-C, the optional duration, or every camera stopping on
/// its own, whichever comes first.
async fn wait_for_stop(supervisor: &RecordingSupervisor, duration: Option<Duration>) {
    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    let all_stopped = async {
        let mut interval = tokio::time::interval(RECORDING_POLL);
        loop {
            interval.tick().await;
            if supervisor.status().iter().all(|unit| !unit.running) {
                break;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => println!(),
        () = deadline => {}
        () = all_stopped => println!("All cameras stopped delivering frames."),
    }
}

fn handle_import(ctx: &AppContext, cmd: &ImportCommand) -> Result<()> {
    let entry = ctx.import_image(&cmd.file, &cmd.name)?;
    println!("Image '{}' saved in your folder.", entry.name);
    Ok(())
}

fn handle_images(ctx: &AppContext, cmd: ImagesCommand) -> Result<()> {
    match cmd {
        ImagesCommand::List { json } => {
            let entries = ctx.list_images()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No images imported yet.");
            } else {
                for entry in entries {
                    println!("{:<32} {}", entry.name, &entry.content_hash[..16]);
                }
            }
        }
        ImagesCommand::Search { query } => {
            if ctx.search_images(&query)? {
                println!("Data is found.");
            } else {
                println!("Data not found.");
            }
        }
    }
    Ok(())
}

/// A token cancelled by Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

async fn handle_play(ctx: &AppContext, cmd: PlayCommand) -> Result<()> {
    let config = ctx.config();
    let opener = Arc::new(FfmpegVideoOpener::from_config(config));
    let mut player = PlaybackController::from_config(opener, &config.playback);
    player.set_speed(cmd.speed);
    player.set_zoom(Zoom::from_percent(cmd.zoom)?);

    let file = cmd.file.clone();
    let seeks = cmd.seek;
    let mut player = tokio::task::spawn_blocking(move || -> camwatch::Result<PlaybackController> {
        player.open(&file)?;
        for direction in seeks {
            let frame = player.seek(direction.into())?;
            debug!("Seeked to frame {frame}");
        }
        Ok(player)
    })
    .await
    .context("video open task failed")??;

    let preview = preview_sink(cmd.preview_dir, 1);
    println!(
        "Playing {} at {} (Ctrl-C to stop)",
        cmd.file.display(),
        player.speed()
    );
    let shown = playback::run(&mut player, preview.as_ref(), &interrupt_token()).await?;
    println!("Played {shown} frames.");
    Ok(())
}

async fn handle_plate(ctx: &AppContext, cmd: PlateCommand) -> Result<()> {
    let config = ctx.config();
    let reader = PlateReader::new(
        PlateExtractor::from_config(&config.plate),
        Arc::new(TesseractRecognizer::from_config(&config.plate)),
        config.plate_output(),
    );

    let text = if let Some(image) = cmd.image {
        let frame = plate::load_frame(&image)?;
        reader.read(&frame).await?
    } else if let Some(video) = cmd.video {
        let opener = FfmpegVideoOpener::from_config(config);
        let source = tokio::task::spawn_blocking(move || opener.open(&video))
            .await
            .context("video open task failed")??;
        reader.scan(source, &interrupt_token()).await?
    } else if let Some(index) = cmd.device {
        let camera = FfmpegCamera::from_config(config);
        let source = tokio::task::spawn_blocking(move || camera.open(index))
            .await
            .context("camera open task failed")??;
        println!("Reading plates from camera {index} (Ctrl-C to stop)");
        reader.scan(source, &interrupt_token()).await?
    } else {
        bail!("pass one of --image, --video or --device");
    };

    match text {
        Some(text) => {
            println!("Number plate text: {text}");
            println!("Saved to {}", reader.output().display());
        }
        None => println!("No number plate text recognized."),
    }
    Ok(())
}

fn handle_config(config_path: Option<PathBuf>, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(config_path).context("failed to load configuration")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Paths]");
                println!("  Data directory:     {}", config.data_dir().display());
                println!("  Users directory:    {}", config.users_dir().display());
                println!("  Images directory:   {}", config.images_dir().display());
                println!("  Plate output:       {}", config.plate_output().display());
                println!();
                println!("[Recording]");
                println!("  Devices:            {}", config.recording.device_count);
                println!(
                    "  Format:             {}x{} @ {} fps",
                    config.recording.width, config.recording.height, config.recording.fps
                );
                println!();
                println!("[Camera]");
                println!("  ffmpeg:             {}", config.camera.ffmpeg.display());
                println!("  Input format:       {}", config.camera.input_format);
                println!("  Device 0:           {}", config.device_name(0));
                println!();
                println!("[Playback]");
                println!("  ffprobe:            {}", config.playback.ffprobe.display());
                println!("  Seek step (s):      {}", config.playback.seek_seconds);
                println!("  Fallback fps:       {}", config.playback.fallback_fps);
                println!();
                println!("[Plate]");
                println!("  tesseract:          {}", config.plate.tesseract.display());
                println!("  Page segmentation:  {}", config.plate.page_segmentation_mode);
            }
        }
        ConfigCommand::Path => {
            println!("{}", config_path.unwrap_or_else(Config::default_config_path).display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

fn display_or_unset(path: Option<&Path>) -> String {
    path.map_or_else(|| "(not set)".to_string(), |path| path.display().to_string())
}
