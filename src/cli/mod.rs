use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::alert::AlertKind;
use crate::feeder::DEFAULT_CHUNK_SIZE;

pub mod status;
pub use status::StatusDisplay;


/// Streaming MP3 voice player
#[derive(Debug, Parser)]
#[command(name = "vsplay")]
#[command(about = "Plays MP3 speech streams and alert prompts through the streaming voice player")]
#[command(version)]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Stream an MP3 file through the player as if it arrived over the network
    Play {
        /// MP3 file to stream
        file: PathBuf,
        /// Session id to tag the stream with
        #[arg(long)]
        session: Option<String>,
        /// Bytes handed to the player per write
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE as u64, value_parser = clap::value_parser!(u64).range(1..=1_048_576))]
        chunk_bytes: u64,
        /// Delay between writes, imitating network arrival
        #[arg(long, default_value_t = 0)]
        chunk_interval_ms: u64,
        /// Output volume (0-100); defaults to the configured volume
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        volume: Option<u8>,
        /// Output device name; defaults to the configured or system device
        #[arg(long)]
        device: Option<String>,
    },
    /// Play one of the local alert prompts
    Alert {
        #[arg(value_enum)]
        kind: AlertKind,
    },
    /// List audio output devices
    Devices,
    /// Show or change the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration subcommands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write the default configuration back to disk
    Reset,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home_dir) = dirs::home_dir() {
                return home_dir.join(rest);
            }
        } else if path == "~" {
            if let Some(home_dir) = dirs::home_dir() {
                return home_dir;
            }
        }
        PathBuf::from(path)
    }

    /// CLI volume percentage as a 0.0..=1.0 gain
    pub fn volume_gain(level: u8) -> f32 {
        level.min(100) as f32 / 100.0
    }
}
