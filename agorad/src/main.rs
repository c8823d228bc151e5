//! Agora Daemon
//!
//! Hosts the settlement core behind an HTTP API.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p agorad
//!
//! # Start with custom environment
//! AGORA_ENV=test AGORA_API_PORT=8081 cargo run -p agorad
//! ```
//!
//! # Environment Variables
//!
//! - `AGORA_ENV`: Environment (test, development, production)
//! - `AGORA_API_HOST`: API host (default: 0.0.0.0)
//! - `AGORA_API_PORT`: API port (default: 8080)
//! - `AGORA_DEFAULT_MAX_ROUNDS`: Round budget when none is given (default: 5)
//! - `AGORA_MAX_ROUNDS_CAP`: Largest allowed round budget (default: 20)
//! - `AGORA_TURN_POLICY`: `free` or `alternating` (default: free)
//! - `AGORA_RETRY_MAX_ATTEMPTS`: Attempts on storage conflicts (default: 3)
//! - `AGORA_RETRY_BASE_DELAY_MS`: First retry delay (default: 10)
//! - `AGORA_EXPIRY_SWEEP_SECS`: Seconds between expiry sweeps (default: 60)
//! - `AGORA_DAILY_RESET`: `calendar_utc` or `rolling_24h` (default: calendar_utc)
//! - `AGORA_EVENT_BUS_CAPACITY`: Event bus buffer (default: 1000)
//! - `AGORA_LOG_FORMAT`: `pretty` or `json` (default: pretty)
//! - `RUST_LOG`: Log filter (default: agorad=info)

use agorad::{Config, Daemon, LogFormat};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so the log format is known
    let config = Config::from_env()?;

    let filter = EnvFilter::from_default_env()
        .add_directive("agorad=info".parse()?)
        .add_directive("agora_engine=info".parse()?);
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry().with(fmt::layer().json()).with(filter).init(),
        LogFormat::Pretty => tracing_subscriber::registry().with(fmt::layer()).with(filter).init(),
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Agora Daemon"
    );

    Daemon::new(config).run().await?;

    Ok(())
}
