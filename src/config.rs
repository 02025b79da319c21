// src/config.rs

//! Manages proxy configuration: loading, resolving environment overrides, and validation.

use crate::connection::{DEFAULT_CHANNEL_CAPACITY, Endpoint};
use crate::core::auth::{Credentials, MechanismPreference};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable that, when set, replaces `fallback.password`.
pub const FALLBACK_PASSWORD_ENV: &str = "DOCPROXY_FALLBACK_PASSWORD";

/// How client traffic is routed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyMode {
    /// Forward to the primary and retry empty `find` results on the fallback.
    #[default]
    Failover,
    /// Forward to the primary only.
    Passthrough,
}

/// The backend that receives all client traffic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PrimaryConfig {
    #[serde(default = "default_backend_host")]
    pub host: String,
    #[serde(default = "default_primary_port")]
    pub port: u16,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            host: default_backend_host(),
            port: default_primary_port(),
        }
    }
}

/// The backend empty `find` results are retried against, and how to log into it.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FallbackConfig {
    #[serde(default = "default_backend_host")]
    pub host: String,
    #[serde(default = "default_fallback_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_auth_db")]
    pub auth_db: String,
    #[serde(default)]
    pub mechanism: MechanismPreference,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            host: default_backend_host(),
            port: default_fallback_port(),
            username: default_username(),
            password: default_password(),
            auth_db: default_auth_db(),
            mechanism: MechanismPreference::default(),
        }
    }
}

impl FallbackConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.password).with_auth_db(&self.auth_db)
    }
}

impl std::fmt::Debug for FallbackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("auth_db", &self.auth_db)
            .field("mechanism", &self.mechanism)
            .finish()
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// The configuration as it appears in the TOML file.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    mode: ProxyMode,
    #[serde(default = "default_channel_capacity")]
    channel_capacity: usize,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    connect_timeout: Duration,
    #[serde(default)]
    primary: PrimaryConfig,
    #[serde(default)]
    fallback: FallbackConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    27019
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_backend_host() -> String {
    "127.0.0.1".to_string()
}
fn default_primary_port() -> u16 {
    27017
}
fn default_fallback_port() -> u16 {
    27018
}
fn default_username() -> String {
    "admin".to_string()
}
fn default_password() -> String {
    "secret".to_string()
}
fn default_auth_db() -> String {
    "admin".to_string()
}
fn default_metrics_port() -> u16 {
    9216
}

/// Represents the final, validated, and resolved proxy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub mode: ProxyMode,
    pub channel_capacity: usize,
    /// Bounds dialing a backend. The handshake and forwarding are unbounded.
    pub connect_timeout: Duration,
    pub primary: PrimaryConfig,
    pub fallback: FallbackConfig,
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            mode: ProxyMode::default(),
            channel_capacity: default_channel_capacity(),
            connect_timeout: default_connect_timeout(),
            primary: PrimaryConfig::default(),
            fallback: FallbackConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Loads, resolves and validates the configuration at `path`.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Like [`Config::from_file`], but a missing file yields the defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            return Self::from_file(path);
        }
        info!("No config file at '{}', using defaults.", path);
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents).context("Failed to parse TOML")?;

        let mut config = Config {
            host: raw.host,
            port: raw.port,
            log_level: raw.log_level,
            mode: raw.mode,
            channel_capacity: raw.channel_capacity,
            connect_timeout: raw.connect_timeout,
            primary: raw.primary,
            fallback: raw.fallback,
            metrics: raw.metrics,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var(FALLBACK_PASSWORD_ENV) {
            self.fallback.password = password;
        }
    }

    /// Checks the invariants every other component relies on.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.channel_capacity == 0 {
            return Err(anyhow!("channel_capacity cannot be 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(anyhow!("connect_timeout cannot be 0"));
        }
        if self.primary.port == 0 {
            return Err(anyhow!("primary.port cannot be 0"));
        }
        if self.primary.host.trim().is_empty() {
            return Err(anyhow!("primary.host cannot be empty"));
        }

        if self.mode == ProxyMode::Failover {
            if self.fallback.port == 0 {
                return Err(anyhow!("fallback.port cannot be 0"));
            }
            if self.fallback.host.trim().is_empty() {
                return Err(anyhow!("fallback.host cannot be empty"));
            }
            if self.fallback.username.is_empty() {
                return Err(anyhow!("fallback.username cannot be empty"));
            }
            if self.fallback.auth_db.is_empty() {
                return Err(anyhow!("fallback.auth_db cannot be empty"));
            }
            if self.fallback.password == default_password() {
                warn!("fallback.password is still the built-in default.");
            }
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port ({}) must differ from the proxy port",
                    self.metrics.port
                ));
            }
        }

        Ok(())
    }

    /// The `host:port` the proxy listens on.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn primary_endpoint(&self) -> Endpoint {
        Endpoint::new(format!("{}:{}", self.primary.host, self.primary.port))
            .with_channel_capacity(self.channel_capacity)
            .with_connect_timeout(self.connect_timeout)
    }

    pub fn fallback_endpoint(&self) -> Endpoint {
        Endpoint::new(format!("{}:{}", self.fallback.host, self.fallback.port))
            .with_channel_capacity(self.channel_capacity)
            .with_connect_timeout(self.connect_timeout)
    }
}
