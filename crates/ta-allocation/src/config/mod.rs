use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::allocation::{EngineSettings, DEFAULT_COMMIT_ATTEMPTS};

pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Deployment stage the service runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub allocation: AllocationConfig,
}

impl AppConfig {
    /// Reads `.env` (when present) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::parse(&var_or("APP_ENV", "development"));

        let host = var_or("APP_HOST", "127.0.0.1");
        let port = var_or("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = var_or("APP_LOG_LEVEL", "info");

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            allocation: AllocationConfig::from_env()?,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn positive<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value >= T::from(1) => Ok(value),
        _ => Err(ConfigError::InvalidNumber { name, value: raw }),
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::from(([127, 0, 0, 1], self.port)));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Allocation engine, live update and mail settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationConfig {
    /// Administrator copied on every allocation email (`TA_ADMIN_EMAIL`).
    pub admin_email: String,
    /// Check-and-commit passes before a write conflict is reported (`TA_COMMIT_ATTEMPTS`).
    pub commit_attempts: u32,
    /// Buffered live events per subscriber (`TA_BROADCAST_CAPACITY`).
    pub broadcast_capacity: usize,
    /// From address on outgoing mail (`TA_MAIL_SENDER`).
    pub mail_sender: String,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            admin_email: "admin@localhost".to_string(),
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            mail_sender: "allocations@localhost".to_string(),
        }
    }
}

impl AllocationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            admin_email: var_or("TA_ADMIN_EMAIL", &defaults.admin_email),
            commit_attempts: positive("TA_COMMIT_ATTEMPTS", defaults.commit_attempts)?,
            broadcast_capacity: positive("TA_BROADCAST_CAPACITY", defaults.broadcast_capacity)?,
            mail_sender: var_or("TA_MAIL_SENDER", &defaults.mail_sender),
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            admin_email: self.admin_email.clone(),
            max_attempts: self.commit_attempts,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} must be a positive integer (got '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
        }
    }
}
