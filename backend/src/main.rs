#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]
//! Backend entry-point: parses configuration, initializes tracing, and
//! hands control to the server wiring.

mod server;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt};

use server::AppConfig;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,backend=debug")),
        )
        .init();

    match server::run(AppConfig::parse()).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(reason) => {
            error!(%reason, "startup or shutdown failed");
            std::process::ExitCode::FAILURE
        }
    }
}
