// SPDX-License-Identifier: AGPL-3.0
// Off Fire Agent - Main entry point
//
// Headless agent: keeps the offline queue in sync and serves host commands
// as JSON lines on stdin/stdout. Logs go to stderr.

mod bridge;
mod state;

use state::AppState;
use std::time::Duration;

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offfire_agent=info,offfire_sync=info,offfire_core=info".into()),
        )
        .init();

    tracing::info!("Starting Off Fire agent v{}", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create Tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(run());

    // A pending stdin read never completes on its own
    runtime.shutdown_timeout(Duration::from_secs(1));

    if let Err(e) = result {
        tracing::error!("Agent stopped with error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new().await?;
    let tasks = state.start_background().await;

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();
    let result = bridge::run(&state, input, &mut output).await;

    for task in tasks {
        if task.is_finished() {
            tracing::warn!("Background task {} exited before shutdown", task.name());
        }
        task.stop().await;
    }
    tracing::info!("Off Fire agent stopped");

    result.map_err(Into::into)
}
