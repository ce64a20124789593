use g1_voice_core::{AgentCredentials, ConnectionOptions};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_AGENT_ENDPOINT: &str = "wss://api.elevenlabs.io/v1/convai/conversation";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub agent_api_key: Option<String>,
    pub agent_id: Option<String>,
    pub agent_endpoint: String,
    pub package_name: String,
    pub host_api_key: Option<String>,
    pub log_level: Level,
    pub reply_timeout: Duration,
    pub max_reconnect_attempts: u32,
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let port: u16 = parse_var("PORT", 3000)?;
        let bind_address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

        let agent_api_key = std::env::var("ELEVENLABS_API_KEY").ok();
        let agent_id = std::env::var("ELEVENLABS_AGENT_ID").ok();
        let agent_endpoint = std::env::var("ELEVENLABS_WS_URL")
            .unwrap_or_else(|_| DEFAULT_AGENT_ENDPOINT.to_string());

        let package_name = std::env::var("PACKAGE_NAME")
            .map_err(|_| ConfigError::MissingVar("PACKAGE_NAME".to_string()))?;
        let host_api_key = std::env::var("MENTRAOS_API_KEY").ok();

        let log_level_str = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "LOG_LEVEL".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let reply_timeout = Duration::from_secs(parse_var("AGENT_REPLY_TIMEOUT_SECS", 30)?);
        let max_reconnect_attempts = parse_var("AGENT_MAX_RECONNECTS", 3)?;

        Ok(Self {
            bind_address,
            agent_api_key,
            agent_id,
            agent_endpoint,
            package_name,
            host_api_key,
            log_level,
            reply_timeout,
            max_reconnect_attempts,
        })
    }

    pub fn credentials(&self) -> AgentCredentials {
        AgentCredentials::new(self.agent_api_key.clone(), self.agent_id.clone())
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            max_reconnect_attempts: self.max_reconnect_attempts,
            reply_timeout: self.reply_timeout,
            ..ConnectionOptions::default()
        }
    }
}
