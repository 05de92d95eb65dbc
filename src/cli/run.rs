//! Run command implementation

use crate::cli::output::{format_report_json, format_report_table};
use crate::cli::RunArgs;
use crate::config::{AerolinkConfig, LogFormat};
use crate::perception::Perception;
use crate::session::{SessionDriver, StopReason};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Load configuration with CLI overrides
pub fn load_config_with_overrides(
    args: &RunArgs,
) -> Result<AerolinkConfig, Box<dyn std::error::Error>> {
    // Load from file if it exists, otherwise use defaults
    let mut config = if args.config.exists() {
        AerolinkConfig::load(Some(&args.config))?
    } else {
        tracing::debug!("Config file not found, using defaults");
        AerolinkConfig::default()
    };

    config = config.with_env_overrides();

    // CLI overrides (highest priority)
    if let Some(ref base_url) = args.base_url {
        config.server.base_url = base_url.clone();
    }
    if let Some(ref team) = args.team {
        config.server.team = team.clone();
    }
    if let Some(ref session_id) = args.session_id {
        config.server.session_id = session_id.clone();
    }
    if let Some(max_frames) = args.max_frames {
        config.session.max_frames = Some(max_frames);
    }
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }

    Ok(config)
}

/// Initialize tracing based on configuration
///
/// Logs go to stderr so the report on stdout stays machine-readable.
pub fn init_tracing(
    config: &crate::config::LoggingConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter_str = crate::logging::build_filter_directives(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
    }

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM), then cancel `cancel_token`
pub async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
        _ = cancel_token.cancelled() => return,
    }

    cancel_token.cancel();
}

/// Session stops that should surface as a non-zero exit status
fn failed(reason: &StopReason) -> bool {
    match reason {
        StopReason::FetchFatal { .. } => true,
        StopReason::Cancelled => false,
        other => other.is_abort(),
    }
}

/// Main run command handler
pub async fn run_session(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_with_overrides(&args)?;
    config.validate()?;

    init_tracing(&config.logging)?;
    tracing::debug!(?config, "Loaded configuration");

    let driver = SessionDriver::from_config(&config, Perception::builtin())?;

    let cancel_token = CancellationToken::new();
    let signal_handle = tokio::spawn(shutdown_signal(cancel_token.clone()));
    let result = driver.start(cancel_token.clone()).await;
    cancel_token.cancel();
    signal_handle.await?;

    let report = result?;

    if args.json {
        println!("{}", format_report_json(&report)?);
    } else {
        println!("{}", format_report_table(&report));
    }

    if failed(&report.stop_reason) {
        return Err(format!("session {}", report.stop_reason).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn args(config: PathBuf) -> RunArgs {
        RunArgs {
            config,
            base_url: None,
            team: None,
            session_id: None,
            max_frames: None,
            log_level: None,
            json: false,
        }
    }

    #[test]
    fn test_run_config_loading() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[server]\nteam = \"osprey\"").unwrap();

        let config = load_config_with_overrides(&args(temp.path().to_path_buf())).unwrap();
        assert_eq!(config.server.team, "osprey");
    }

    #[test]
    fn test_run_cli_overrides_config() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(
            temp.path(),
            "[server]\nbase_url = \"http://10.0.0.1:5000\"\n[session]\nmax_frames = 10",
        )
        .unwrap();

        let mut run_args = args(temp.path().to_path_buf());
        run_args.base_url = Some("http://10.0.0.2:5000".to_string());
        run_args.max_frames = Some(3);
        run_args.log_level = Some("debug".to_string());

        let config = load_config_with_overrides(&run_args).unwrap();
        assert_eq!(config.server.base_url, "http://10.0.0.2:5000"); // CLI wins
        assert_eq!(config.session.max_frames, Some(3));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_run_works_without_config_file() {
        let config = load_config_with_overrides(&args(PathBuf::from("nonexistent.toml"))).unwrap();
        assert_eq!(config.server.next_frame_endpoint, "/next_frame");
    }

    #[test]
    fn test_run_invalid_config_file_is_error() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[retry]\nmax_retries = \"three\"").unwrap();

        assert!(load_config_with_overrides(&args(temp.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_failed_stop_reasons() {
        assert!(!failed(&StopReason::EndOfStream));
        assert!(!failed(&StopReason::MaxFrames { frames: 3 }));
        assert!(!failed(&StopReason::Cancelled));
        assert!(failed(&StopReason::ConsecutiveDuplicates { count: 5 }));
        assert!(failed(&StopReason::FetchFatal {
            reason: "unexpected_http".to_string(),
            http_status: Some(401),
        }));
    }

    #[tokio::test]
    async fn test_shutdown_signal_returns_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), shutdown_signal(token))
            .await
            .unwrap();
    }
}
