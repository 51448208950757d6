//! Command-line interface for camwatch.
//!
//! This module provides the CLI structure for the `camwatch` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AccountCommand, ConfigCommand, ImagesCommand, ImportCommand, LoginCommand, PermissionsCommand,
    PlayCommand, PlateCommand, ProfileCommand, RecordCommand, SeekArg,
};

/// camwatch - Record, review and read number plates from your cameras
///
/// Records every connected camera at once into dated folders, plays the
/// recordings back, and reads number plates from images, videos or a live
/// camera.
#[derive(Debug, Parser)]
#[command(name = "camwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in with a Gmail address, creating the account on first use
    Login(LoginCommand),

    /// Log out the current user
    Logout,

    /// Show who is logged in
    Whoami,

    /// Grant or refuse camera and storage access
    Permissions(PermissionsCommand),

    /// View or edit personal information
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Manage the recording folder or delete the account
    #[command(subcommand)]
    Account(AccountCommand),

    /// Record from all available cameras until interrupted
    Record(RecordCommand),

    /// Import a reference image into your folder
    Import(ImportCommand),

    /// List or search your reference images
    #[command(subcommand)]
    Images(ImagesCommand),

    /// Play a recorded video
    Play(PlayCommand),

    /// Read a number plate from an image, a video or a camera
    Plate(PlateCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
