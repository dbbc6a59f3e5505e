//! Startup helpers for the Lexcitator server.

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use crate::config::AssistantConfig;
use crate::server::{self, AppState};

/// Run the server (used by the `lexcitator-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Lexcitator v{}", env!("CARGO_PKG_VERSION"));

    let config = AssistantConfig::from_env();
    tracing::info!("Backend model: {}", config.model);

    let port = get_port();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    rt.block_on(async {
        let state = match AppState::new(config).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to create state: {e}");
                return ExitCode::from(1);
            }
        };

        if let Err(e) = server::run_server(state, port).await {
            tracing::error!("Server error: {e}");
            return ExitCode::from(1);
        }

        ExitCode::SUCCESS
    })
}

/// Run server with graceful shutdown.
///
/// # Errors
/// Returns an error if the server fails.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    port: u16,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    server::run_server_with_shutdown(state, port, shutdown_signal).await
}

/// Get configured server port.
#[must_use]
pub fn get_port() -> u16 {
    std::env::var("LEXCITATOR_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(server::DEFAULT_PORT)
}
