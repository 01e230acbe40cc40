//! Command-line interface for voxgate
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Voice turn-taking with remote speaker verification
#[derive(Parser, Debug)]
#[command(
    name = "voxgate",
    version,
    about = "Voice turn-taking with remote speaker verification"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress status output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: phase transitions and turn diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device (e.g., pipewire)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Verification backend base URL
    #[arg(long, value_name = "URL")]
    pub server_url: Option<String>,

    /// Real-time room URL
    #[arg(long, value_name = "URL")]
    pub room_url: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// Show configuration
    Config {
        /// Action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration file path
    Path,
    /// Print the effective configuration
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses_no_args() {
        let cli = Cli::parse_from(["voxgate"]);
        assert!(cli.command.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_parses_devices() {
        let cli = Cli::parse_from(["voxgate", "devices"]);
        assert!(matches!(cli.command, Some(Commands::Devices)));
    }

    #[test]
    fn test_cli_parses_overrides() {
        let cli = Cli::parse_from([
            "voxgate",
            "--device",
            "pipewire",
            "--server-url",
            "https://api.example.com",
            "--room-url",
            "wss://room.example.com",
            "-vv",
        ]);
        assert_eq!(cli.device.as_deref(), Some("pipewire"));
        assert_eq!(cli.server_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(cli.room_url.as_deref(), Some("wss://room.example.com"));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }
}
