use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::engine::AutocheckPolicy;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let auto_deny_on_autocheck = match env::var("APP_AUTO_DENY_ON_AUTOCHECK") {
            Ok(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidAutoDeny)?,
            Err(_) => false,
        };
        let autocheck_workers = env::var("APP_AUTOCHECK_WORKERS")
            .unwrap_or_else(|_| "4".to_string())
            .parse::<usize>()
            .ok()
            .filter(|workers| *workers > 0)
            .ok_or(ConfigError::InvalidWorkerCount)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            engine: EngineSettings {
                auto_deny_on_autocheck,
                autocheck_workers,
            },
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Behavior knobs for the authorization engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Revoke pending requests that fail evaluation during an autocheck sweep
    /// instead of leaving them for a manual decision.
    pub auto_deny_on_autocheck: bool,
    /// Worker count for the autocheck batch.
    pub autocheck_workers: usize,
}

impl EngineSettings {
    pub fn autocheck_policy(&self) -> AutocheckPolicy {
        AutocheckPolicy {
            auto_deny: self.auto_deny_on_autocheck,
            workers: self.autocheck_workers,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidAutoDeny,
    InvalidWorkerCount,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidAutoDeny => {
                write!(f, "APP_AUTO_DENY_ON_AUTOCHECK must be a boolean")
            }
            ConfigError::InvalidWorkerCount => {
                write!(f, "APP_AUTOCHECK_WORKERS must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("APP_AUTO_DENY_ON_AUTOCHECK");
        env::remove_var("APP_AUTOCHECK_WORKERS");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(!config.engine.auto_deny_on_autocheck);
        assert_eq!(config.engine.autocheck_workers, 4);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn engine_settings_read_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_AUTO_DENY_ON_AUTOCHECK", "yes");
        env::set_var("APP_AUTOCHECK_WORKERS", "8");
        let config = AppConfig::load().expect("config loads");
        assert!(config.engine.auto_deny_on_autocheck);
        assert_eq!(config.engine.autocheck_workers, 8);
        reset_env();
    }

    #[test]
    fn rejects_zero_workers() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_AUTOCHECK_WORKERS", "0");
        let error = AppConfig::load().expect_err("zero workers rejected");
        assert!(matches!(error, ConfigError::InvalidWorkerCount));
        reset_env();
    }
}
