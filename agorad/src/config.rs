//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use agora_domain::TurnPolicy;
use agora_engine::{MarketplaceConfig, NegotiationConfig};
use agora_store::RetryPolicy;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Settlement core configuration
    pub settlement: SettlementConfig,

    /// Background job configuration
    pub scheduler: SchedulerConfig,

    /// Event bus buffer size
    pub event_bus_capacity: usize,

    /// Log output format
    pub log_format: LogFormat,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Negotiation and retry policy.
#[derive(Debug, Clone, Copy)]
pub struct SettlementConfig {
    /// Round budget when the caller passes none
    pub default_max_rounds: u32,
    /// Largest round budget a caller may ask for
    pub max_rounds_cap: u32,
    /// Turn discipline between buyer and seller
    pub turn_policy: TurnPolicy,
    /// Attempts per operation on storage conflicts
    pub retry_max_attempts: u32,
    /// First backoff delay
    pub retry_base_delay_ms: u64,
}

/// Background job configuration.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Seconds between expiry sweeps
    pub expiry_sweep_secs: u64,
    /// When daily spending counters roll over
    pub daily_reset: DailyReset,
}

/// Day boundary for `daily_spent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyReset {
    /// At 00:00 UTC
    CalendarUtc,
    /// 24 hours after the previous reset
    Rolling24h,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable
    Pretty,
    /// One JSON object per line
    Json,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let settlement = Self::load_settlement_config()?;
        let scheduler = Self::load_scheduler_config()?;
        let event_bus_capacity = Self::load_parsed_env("AGORA_EVENT_BUS_CAPACITY", 1000usize)?;
        let log_format = match env::var("AGORA_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        if event_bus_capacity == 0 {
            return Err(DaemonError::Config("AGORA_EVENT_BUS_CAPACITY must be positive".to_string()));
        }

        Ok(Self {
            api,
            settlement,
            scheduler,
            event_bus_capacity,
            log_format,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            settlement: SettlementConfig::default(),
            scheduler: SchedulerConfig {
                expiry_sweep_secs: 1,
                daily_reset: DailyReset::CalendarUtc,
            },
            event_bus_capacity: 100,
            log_format: LogFormat::Pretty,
            environment: Environment::Test,
        }
    }

    /// Settlement core configuration derived from this config.
    pub fn marketplace(&self) -> MarketplaceConfig {
        let s = &self.settlement;
        MarketplaceConfig {
            negotiation: NegotiationConfig {
                default_max_rounds: s.default_max_rounds,
                max_rounds_cap: s.max_rounds_cap,
                turn_policy: s.turn_policy,
            },
            retry: RetryPolicy::new(s.retry_max_attempts, Duration::from_millis(s.retry_base_delay_ms)),
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("AGORA_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid AGORA_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("AGORA_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = Self::load_parsed_env("AGORA_API_PORT", 8080u16)?;

        Ok(ApiConfig { host, port })
    }

    fn load_settlement_config() -> DaemonResult<SettlementConfig> {
        let defaults = SettlementConfig::default();

        let default_max_rounds = Self::load_parsed_env("AGORA_DEFAULT_MAX_ROUNDS", defaults.default_max_rounds)?;
        let max_rounds_cap = Self::load_parsed_env("AGORA_MAX_ROUNDS_CAP", defaults.max_rounds_cap)?;
        let turn_policy = match env::var("AGORA_TURN_POLICY") {
            Ok(val) => TurnPolicy::from_str(&val).map_err(|e| DaemonError::Config(e.to_string()))?,
            Err(_) => defaults.turn_policy,
        };
        let retry_max_attempts = Self::load_parsed_env("AGORA_RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts)?;
        let retry_base_delay_ms = Self::load_parsed_env("AGORA_RETRY_BASE_DELAY_MS", defaults.retry_base_delay_ms)?;

        if default_max_rounds == 0 || default_max_rounds > max_rounds_cap {
            return Err(DaemonError::Config(format!(
                "AGORA_DEFAULT_MAX_ROUNDS must be between 1 and AGORA_MAX_ROUNDS_CAP ({}), got {}",
                max_rounds_cap, default_max_rounds
            )));
        }
        if retry_max_attempts == 0 {
            return Err(DaemonError::Config("AGORA_RETRY_MAX_ATTEMPTS must be at least 1".to_string()));
        }

        Ok(SettlementConfig {
            default_max_rounds,
            max_rounds_cap,
            turn_policy,
            retry_max_attempts,
            retry_base_delay_ms,
        })
    }

    fn load_scheduler_config() -> DaemonResult<SchedulerConfig> {
        let expiry_sweep_secs = Self::load_parsed_env("AGORA_EXPIRY_SWEEP_SECS", 60u64)?;
        let daily_reset = match env::var("AGORA_DAILY_RESET") {
            Ok(val) => val.parse()?,
            Err(_) => DailyReset::CalendarUtc,
        };

        if expiry_sweep_secs == 0 {
            return Err(DaemonError::Config("AGORA_EXPIRY_SWEEP_SECS must be positive".to_string()));
        }

        Ok(SchedulerConfig {
            expiry_sweep_secs,
            daily_reset,
        })
    }

    fn load_parsed_env<T: FromStr>(key: &str, default: T) -> DaemonResult<T> {
        match env::var(key) {
            Ok(val) => val
                .parse::<T>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            settlement: SettlementConfig::default(),
            scheduler: SchedulerConfig {
                expiry_sweep_secs: 60,
                daily_reset: DailyReset::CalendarUtc,
            },
            event_bus_capacity: 1000,
            log_format: LogFormat::Pretty,
            environment: Environment::Development,
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            default_max_rounds: 5,
            max_rounds_cap: 20,
            turn_policy: TurnPolicy::Free,
            retry_max_attempts: 3,
            retry_base_delay_ms: 10,
        }
    }
}

impl FromStr for DailyReset {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "calendar_utc" | "calendar" => Ok(DailyReset::CalendarUtc),
            "rolling_24h" | "rolling" => Ok(DailyReset::Rolling24h),
            other => Err(DaemonError::Config(format!(
                "Invalid AGORA_DAILY_RESET: {}. Expected: calendar_utc, rolling_24h",
                other
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.api.port, 8080);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.scheduler.daily_reset, DailyReset::CalendarUtc);
        assert_eq!(config.event_bus_capacity, 1000);
    }

    #[test]
    fn test_test_config() {
        let config = Config::test();

        assert_eq!(config.api.port, 0);
        assert_eq!(config.environment, Environment::Test);
    }

    #[test]
    fn test_marketplace_config_mirrors_settlement() {
        let mut config = Config::default();
        config.settlement.turn_policy = TurnPolicy::Alternating;
        config.settlement.default_max_rounds = 7;

        let marketplace = config.marketplace();
        assert_eq!(marketplace.negotiation.default_max_rounds, 7);
        assert_eq!(marketplace.negotiation.max_rounds_cap, 20);
        assert_eq!(marketplace.negotiation.turn_policy, TurnPolicy::Alternating);
        assert_eq!(marketplace.retry.max_attempts, 3);
    }

    #[test]
    fn test_daily_reset_parsing() {
        assert_eq!("calendar_utc".parse::<DailyReset>().unwrap(), DailyReset::CalendarUtc);
        assert_eq!("ROLLING_24H".parse::<DailyReset>().unwrap(), DailyReset::Rolling24h);
        assert!("weekly".parse::<DailyReset>().is_err());
    }
}
