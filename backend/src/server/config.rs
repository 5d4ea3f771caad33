//! Process configuration parsed from flags and the environment.

use std::net::SocketAddr;

use clap::Parser;

/// Runtime configuration for the enrichment backend.
///
/// Every flag can also be supplied through the environment, which is how
/// deployments configure the process.
#[derive(Debug, Parser)]
#[command(name = "backend", about = "Bulk data-enrichment execution service")]
pub struct AppConfig {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// 32-byte credential encryption key (hex, base64, or raw).
    /// The process refuses to start without a usable key.
    #[arg(long, env = "ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: String,

    /// Jobs processed in parallel by the queue worker pool.
    #[arg(long, env = "WORKER_CONCURRENCY", default_value_t = 5)]
    pub worker_concurrency: usize,

    /// HTTP bind address for the thin edge.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8080")]
    pub bind_addr: SocketAddr,

    /// Bounded drain window in seconds for graceful shutdown.
    #[arg(long, env = "SHUTDOWN_DRAIN_SECONDS", default_value_t = 30)]
    pub shutdown_drain_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_only_required_values_are_given() {
        let config = AppConfig::try_parse_from([
            "backend",
            "--database-url",
            "postgres://localhost/enrich",
            "--encryption-key",
            "0123456789abcdef0123456789abcdef",
        ])
        .expect("parses");

        assert_eq!(config.worker_concurrency, 5);
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.shutdown_drain_seconds, 30);
    }

    #[test]
    fn flags_override_defaults() {
        let config = AppConfig::try_parse_from([
            "backend",
            "--database-url",
            "postgres://localhost/enrich",
            "--encryption-key",
            "0123456789abcdef0123456789abcdef",
            "--worker-concurrency",
            "2",
            "--bind-addr",
            "0.0.0.0:9090",
        ])
        .expect("parses");

        assert_eq!(config.worker_concurrency, 2);
        assert_eq!(config.bind_addr.port(), 9090);
    }
}
