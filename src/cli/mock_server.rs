//! Mock server command implementation

use crate::cli::run::{init_tracing, shutdown_signal};
use crate::cli::MockServerArgs;
use crate::config::LoggingConfig;
use crate::mock::{MockConfig, MockServer};
use tokio_util::sync::CancellationToken;

/// Mock settings from command-line arguments
pub fn mock_config(args: &MockServerArgs) -> MockConfig {
    MockConfig {
        host: args.host.clone(),
        port: args.port,
        frames_dir: args.frames_dir.clone(),
        synthetic_frames: args.frames,
        ..Default::default()
    }
}

/// Handle `aerolink mock-server`
pub async fn run_mock_server(args: MockServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(&LoggingConfig {
        level: args.log_level.clone(),
        ..Default::default()
    })?;

    let server = MockServer::bind(&mock_config(&args)).await?;
    let cancel_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel_token.clone()));
    server.serve(cancel_token).await?;
    Ok(())
}
