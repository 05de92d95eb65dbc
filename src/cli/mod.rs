//! CLI module for aerolink
//!
//! Command-line interface definitions and handlers.
//!
//! # Commands
//!
//! - `run` - Run one contest session against a server
//! - `mock-server` - Start the local contest mock
//! - `config` - Configuration utilities (init)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Rehearse against the local mock
//! aerolink mock-server --frames 300 &
//! aerolink run --base-url http://127.0.0.1:5000
//!
//! # Generate shell completions
//! aerolink completions bash > ~/.bash_completion.d/aerolink
//! ```

pub mod completions;
pub mod config;
pub mod mock_server;
pub mod output;
pub mod run;

pub use completions::handle_completions;
pub use config::handle_config_init;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// aerolink - resilient contest-server client
#[derive(Parser, Debug)]
#[command(
    name = "aerolink",
    version,
    about = "Fetch, perceive and submit drone frames under a strict frame budget"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one session against the contest server
    Run(RunArgs),
    /// Start the local contest mock server
    MockServer(MockServerArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "aerolink.toml")]
    pub config: PathBuf,

    /// Override contest server base URL
    #[arg(short, long, env = "AEROLINK_BASE_URL")]
    pub base_url: Option<String>,

    /// Override team name sent as `user`
    #[arg(short, long, env = "AEROLINK_TEAM")]
    pub team: Option<String>,

    /// Override the session id used in idempotency keys
    #[arg(long, env = "AEROLINK_SESSION_ID")]
    pub session_id: Option<String>,

    /// Stop after this many frames
    #[arg(short = 'n', long, env = "AEROLINK_MAX_FRAMES")]
    pub max_frames: Option<u64>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "AEROLINK_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Print the session report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct MockServerArgs {
    /// Bind host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Bind port
    #[arg(short, long, default_value = "5000")]
    pub port: u16,

    /// Serve images from this directory instead of synthetic frames
    #[arg(short = 'd', long)]
    pub frames_dir: Option<PathBuf>,

    /// Number of synthetic frames
    #[arg(short, long, default_value = "100")]
    pub frames: usize,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "aerolink.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parse_run_defaults() {
        let cli = Cli::try_parse_from(["aerolink", "run"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("aerolink.toml"));
                assert!(!args.json);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "aerolink",
            "run",
            "-c",
            "custom.toml",
            "--base-url",
            "http://10.0.0.9:5000",
            "-n",
            "40",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("custom.toml"));
                assert_eq!(args.base_url.as_deref(), Some("http://10.0.0.9:5000"));
                assert_eq!(args.max_frames, Some(40));
                assert!(args.json);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_mock_server() {
        let cli =
            Cli::try_parse_from(["aerolink", "mock-server", "-p", "5050", "--frames", "12"])
                .unwrap();
        match cli.command {
            Commands::MockServer(args) => {
                assert_eq!(args.port, 5050);
                assert_eq!(args.frames, 12);
                assert_eq!(args.host, "127.0.0.1");
                assert!(args.frames_dir.is_none());
            }
            _ => panic!("Expected MockServer command"),
        }
    }

    #[test]
    fn test_cli_parse_config_init() {
        let cli = Cli::try_parse_from(["aerolink", "config", "init", "--force"]).unwrap();
        match cli.command {
            Commands::Config(ConfigCommands::Init(args)) => {
                assert!(args.force);
                assert_eq!(args.output, PathBuf::from("aerolink.toml"));
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = Cli::try_parse_from(["aerolink", "completions", "zsh"]).unwrap();
        assert!(matches!(cli.command, Commands::Completions(_)));
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["aerolink", "serve"]).is_err());
    }
}
