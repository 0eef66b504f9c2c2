//! LineRelay - A Single-Process TCP Line Relay
//!
//! This is the main entry point for the relay server.
//! Usage: `linerelay <port>`. Binds 127.0.0.1 and runs until Ctrl+C.

use anyhow::Context;
use linerelay::{Config, Server};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{:#}", e);
            if message.is_empty() {
                eprintln!("Fatal error");
            } else {
                eprintln!("{}", message);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args(std::env::args().skip(1))?;

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let server = Server::bind(&config)
        .await
        .context("Fatal error")?;
    info!(
        "LineRelay v{} listening on {}",
        linerelay::VERSION,
        server.local_addr()?
    );

    server.run().await?;
    Ok(())
}
