// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server configuration module
//!
//! This module provides configuration structures and logic for the identity gateway,
//! supporting different environments and validation of configuration parameters.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::{Result, anyhow, ensure};
use config::{
    Config, ConfigError, Environment as ConfigEnv, File,
    builder::{ConfigBuilder, DefaultState},
};
use identity_client::ClientLogLevel;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use sts_client::StsConfig;

use crate::error::{ServerError, ServerResult};

/// Port the gateway listens on when nothing else is configured
pub const DEFAULT_PORT: u16 = 8888;
/// Environment variable holding the identity client diagnostic level
pub const IDENTITY_LOG_LEVEL_ENV: &str = "IDENTITY_LOG_LEVEL";

const DEFAULT_IDENTITY_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_IDENTITY_MAX_RETRIES: u32 = 1;
const MAX_TIMEOUT_SECONDS: u64 = 300;

/// A validated server port that ensures the value is appropriate for the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerPort {
    port: u16,
    environment: Environment,
}

impl ServerPort {
    /// Create a new `ServerPort`, ensuring it's valid for the given environment
    ///
    /// # Errors
    ///
    /// Returns an error if the port is 0 in non-testing environments
    pub fn new(port: u16, environment: Environment) -> Result<Self> {
        if port == 0 && environment != Environment::Testing {
            return Err(anyhow!("port cannot be 0 in non-testing environments"));
        }
        Ok(Self { port, environment })
    }

    /// The gateway's well-known listening port
    pub const fn default_gateway() -> Self {
        Self {
            port: DEFAULT_PORT,
            environment: Environment::Development,
        }
    }

    /// Port 0, letting the OS choose
    pub const fn testing() -> Self {
        Self {
            port: 0,
            environment: Environment::Testing,
        }
    }

    /// Get the port value
    pub fn value(&self) -> u16 {
        self.port
    }
}

impl<'de> Deserialize<'de> for ServerPort {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let port = u16::deserialize(deserializer)?;
        // Re-validated in `load` once the environment is known
        Ok(Self {
            port,
            environment: Environment::Development,
        })
    }
}

/// A validated timeout duration in seconds (1-300)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSeconds(Duration);

impl TimeoutSeconds {
    /// Create a new `TimeoutSeconds`, ensuring the value is within valid bounds
    ///
    /// # Errors
    ///
    /// Returns an error if timeout is 0 or greater than 300 seconds
    pub fn new(seconds: u64) -> Result<Self> {
        ensure!(seconds != 0, "timeout must be greater than 0");
        ensure!(
            seconds <= MAX_TIMEOUT_SECONDS,
            "timeout cannot exceed {MAX_TIMEOUT_SECONDS}"
        );
        Ok(Self(Duration::from_secs(seconds)))
    }

    /// Default shutdown drain deadline (30 seconds)
    pub const fn default_value() -> Self {
        Self(Duration::from_secs(30))
    }

    /// Default identity service request timeout (10 seconds)
    pub const fn default_identity() -> Self {
        Self(Duration::from_secs(DEFAULT_IDENTITY_TIMEOUT_SECONDS))
    }

    /// Create a safe testing timeout (5 seconds)
    pub const fn testing() -> Self {
        Self(Duration::from_secs(5))
    }

    /// Get the timeout value
    pub fn value(&self) -> Duration {
        self.0
    }
}

impl Serialize for TimeoutSeconds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.0.as_secs())
    }
}

impl<'de> Deserialize<'de> for TimeoutSeconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Self::new(seconds).map_err(|e| de::Error::custom(e.to_string()))
    }
}

impl Default for TimeoutSeconds {
    fn default() -> Self {
        Self::default_value()
    }
}

/// Environment types for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production environment
    Production,
    /// Development environment
    Development,
    /// Testing environment
    Testing,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
            Environment::Testing => write!(f, "testing"),
        }
    }
}

/// Settings for the external identity service client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Endpoint override, e.g. a local emulator. Unset uses the AWS endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Signing region. Unset resolves it from the AWS environment
    #[serde(default)]
    pub region: Option<String>,
    /// Per-request timeout
    pub timeout_seconds: TimeoutSeconds,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Client diagnostic verbosity
    pub log_level: ClientLogLevel,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: None,
            timeout_seconds: TimeoutSeconds::default_identity(),
            max_retries: DEFAULT_IDENTITY_MAX_RETRIES,
            log_level: ClientLogLevel::Off,
        }
    }
}

impl IdentityConfig {
    /// Client configuration for the STS implementation
    pub fn sts_config(&self) -> StsConfig {
        StsConfig {
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            timeout_seconds: self.timeout_seconds.value().as_secs(),
            max_retries: self.max_retries,
            log_level: self.log_level,
        }
    }
}

/// Server configuration for different environments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    pub host: IpAddr,
    /// Server port (validated for environment compatibility)
    pub port: ServerPort,
    /// Environment type
    pub environment: Environment,
    /// How long in-flight requests may drain after an interrupt
    pub shutdown_timeout_seconds: TimeoutSeconds,
    /// Identity service client settings
    pub identity: IdentityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: ServerPort::default_gateway(),
            environment: Environment::Development,
            shutdown_timeout_seconds: TimeoutSeconds::default(),
            identity: IdentityConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables and optional configuration files
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if configuration is invalid or cannot be loaded.
    pub fn from_env() -> ServerResult<Self> {
        Self::load().map_err(|e| ServerError::Config {
            message: format!("failed to load configuration: {e}"),
        })
    }

    /// Load configuration using the config crate with hierarchical sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. Configuration file (config.json)
    /// 3. Environment-specific files (config.{env}.json)
    /// 4. Environment variables with `SERVER_` prefix, `__` between nested keys
    ///    (`SERVER_IDENTITY__ENDPOINT`)
    /// 5. `IDENTITY_LOG_LEVEL`, read leniently
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let env_var = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut config_builder = Self::with_defaults(Config::builder())?
            .add_source(File::with_name("config.json").required(false))
            .add_source(
                File::with_name(&format!("config.{}.json", env_var.to_lowercase())).required(false),
            )
            .add_source(
                ConfigEnv::with_prefix("SERVER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if std::env::var("ENVIRONMENT").is_ok() {
            config_builder = config_builder.set_override("environment", env_var.to_lowercase())?;
        }

        let mut server_config = Self::from_builder(config_builder)?;

        // Unset keeps the configured level; set but unparseable disables client logging
        if let Ok(raw) = std::env::var(IDENTITY_LOG_LEVEL_ENV) {
            server_config.identity.log_level = ClientLogLevel::from_env_value(Some(&raw));
        }

        Ok(server_config)
    }

    fn with_defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            .set_default("host", "0.0.0.0")?
            .set_default("port", i64::from(DEFAULT_PORT))?
            .set_default("environment", "development")?
            .set_default("shutdown_timeout_seconds", 30)?
            .set_default("identity.timeout_seconds", DEFAULT_IDENTITY_TIMEOUT_SECONDS)?
            .set_default("identity.max_retries", i64::from(DEFAULT_IDENTITY_MAX_RETRIES))?
            .set_default("identity.log_level", "off")
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let mut server_config: Self = builder.build()?.try_deserialize()?;

        // Fix the ServerPort to have the correct environment context
        server_config.port = ServerPort::new(server_config.port.value(), server_config.environment)
            .map_err(|e| ConfigError::Message(format!("invalid port configuration: {e}")))?;

        Ok(server_config)
    }

    /// Create configuration optimized for testing
    pub fn for_testing() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: ServerPort::testing(),
            environment: Environment::Testing,
            shutdown_timeout_seconds: TimeoutSeconds::testing(),
            identity: IdentityConfig {
                region: Some(sts_client::DEFAULT_REGION.to_string()),
                ..IdentityConfig::default()
            },
        }
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_validation() {
        assert!(TimeoutSeconds::new(0).is_err());
        assert!(TimeoutSeconds::new(400).is_err());

        assert!(TimeoutSeconds::new(30).is_ok());
        assert!(TimeoutSeconds::new(1).is_ok());
        assert!(TimeoutSeconds::new(300).is_ok());
    }

    #[test]
    fn server_port_validation() {
        // Port 0 should only be valid in testing environment
        assert!(ServerPort::new(0, Environment::Testing).is_ok());
        assert!(ServerPort::new(0, Environment::Development).is_err());
        assert!(ServerPort::new(0, Environment::Production).is_err());

        assert!(ServerPort::new(8888, Environment::Development).is_ok());
        assert!(ServerPort::new(443, Environment::Production).is_ok());
    }

    #[test]
    fn environment_display() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Testing.to_string(), "testing");
    }

    #[test]
    fn defaults_listen_on_all_interfaces_port_8888() {
        let config = ServerConfig::from_builder(
            ServerConfig::with_defaults(Config::builder()).unwrap(),
        )
        .unwrap();

        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8888");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.shutdown_timeout_seconds.value(), Duration::from_secs(30));
        assert_eq!(config.identity.endpoint, None);
        assert_eq!(config.identity.region, None);
        assert_eq!(config.identity.max_retries, 1);
        assert_eq!(config.identity.log_level, ClientLogLevel::Off);
    }

    #[test]
    fn overrides_reach_nested_identity_settings() {
        let builder = ServerConfig::with_defaults(Config::builder())
            .unwrap()
            .set_override("identity.endpoint", "http://127.0.0.1:4566")
            .unwrap()
            .set_override("identity.region", "eu-west-1")
            .unwrap()
            .set_override("identity.log_level", 4096)
            .unwrap()
            .set_override("shutdown_timeout_seconds", 2)
            .unwrap();

        let config = ServerConfig::from_builder(builder).unwrap();

        assert_eq!(config.identity.endpoint.as_deref(), Some("http://127.0.0.1:4566"));
        assert_eq!(config.identity.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.identity.log_level, ClientLogLevel::Debug);
        assert_eq!(config.shutdown_timeout_seconds.value(), Duration::from_secs(2));
    }

    #[test]
    fn port_zero_rejected_outside_testing() {
        let builder = ServerConfig::with_defaults(Config::builder())
            .unwrap()
            .set_override("port", 0)
            .unwrap();

        assert!(ServerConfig::from_builder(builder).is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let builder = ServerConfig::with_defaults(Config::builder())
            .unwrap()
            .set_override("identity.timeout_seconds", 0)
            .unwrap();

        assert!(ServerConfig::from_builder(builder).is_err());
    }

    #[test]
    fn sts_config_carries_identity_settings() {
        let identity = IdentityConfig {
            endpoint: Some("http://localhost:4566".to_string()),
            region: Some("eu-west-1".to_string()),
            timeout_seconds: TimeoutSeconds::new(3).unwrap(),
            max_retries: 4,
            log_level: ClientLogLevel::Trace,
        };

        let sts = identity.sts_config();
        assert_eq!(sts.endpoint.as_deref(), Some("http://localhost:4566"));
        assert_eq!(sts.region.as_deref(), Some("eu-west-1"));
        assert_eq!(sts.timeout_seconds, 3);
        assert_eq!(sts.max_retries, 4);
        assert_eq!(sts.log_level, ClientLogLevel::Trace);
    }

    #[test]
    fn testing_config_uses_ephemeral_port() {
        let config = ServerConfig::for_testing();
        assert_eq!(config.port.value(), 0);
        assert_eq!(config.environment, Environment::Testing);
    }
}
