//! Configuration management with secure storage
//!
//! Handles:
//! - OpenStack credentials and endpoint selection
//! - Collection interval and measurement naming
//! - MQTT publishing settings
//! - Password lookup (config file, OS keyring, OS_PASSWORD)

use anyhow::{bail, Context, Result};
use keyring::Entry;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const KEYRING_SERVICE: &str = "symbion-agent-openstack";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub openstack: OpenStackConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenStackConfig {
    pub identity_endpoint: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    pub project: String,
    pub username: String,
    #[serde(default, skip_serializing)] // Never serialize passwords
    pub password: Option<Password>,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub store_credentials: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(
        default = "default_interval",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub interval: Duration,
    #[serde(default = "default_prefix")]
    pub measurement_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub keep_alive_secs: u16,
    pub topic: String,
}

/// Password wrapper that keeps credentials out of logs
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

fn default_domain() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_interface() -> String {
    "public".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_prefix() -> String {
    "openstack_".to_string()
}

fn serialize_duration<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            measurement_prefix: default_prefix(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1883,
            client_id: None,
            keep_alive_secs: 30,
            topic: "symbion/openstack/metrics@v1".to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            openstack: OpenStackConfig {
                identity_endpoint: "https://my.openstack.cloud:5000".to_string(),
                domain: default_domain(),
                project: "admin".to_string(),
                username: "admin".to_string(),
                password: None,
                verify_tls: true,
                interface: default_interface(),
                region: None,
                timeout_secs: default_timeout_secs(),
                store_credentials: false,
            },
            collection: CollectionConfig::default(),
            mqtt: MqttConfig::default(),
        }
    }
}

impl MqttConfig {
    /// Client id, falling back to one derived from the local hostname
    pub fn effective_client_id(&self) -> String {
        self.client_id.clone().unwrap_or_else(|| {
            format!(
                "symbion-openstack-{}",
                gethostname::gethostname().to_string_lossy()
            )
        })
    }
}

impl AgentConfig {
    /// Load config from the given path, or the OS-specific location
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::read(path).await?;

        let os = &config.openstack;
        let keyring_password = if os.store_credentials && os.password.is_none() {
            Self::load_password(&os.username).ok()
        } else {
            None
        };
        config
            .openstack
            .resolve_password(keyring_password, std::env::var("OS_PASSWORD").ok());

        config.validate()?;
        Ok(config)
    }

    /// Read and parse the config file, without password lookup or validation
    pub async fn read(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_file_path()?,
        };

        let content = tokio::fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", config_path.display()))
    }

    /// Parse a TOML document without touching keyring or environment
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Default configuration rendered as TOML (without password)
    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default()).context("Failed to render default config")
    }

    pub fn validate(&self) -> Result<()> {
        let os = &self.openstack;
        for (name, value) in [
            ("openstack.identity_endpoint", &os.identity_endpoint),
            ("openstack.project", &os.project),
            ("openstack.username", &os.username),
        ] {
            if value.trim().is_empty() {
                bail!("{} is required", name);
            }
        }
        if os.password.is_none() {
            bail!("openstack.password is required (config file, keyring or OS_PASSWORD)");
        }
        if os.timeout_secs == 0 {
            bail!("openstack.timeout_secs must be greater than zero");
        }
        if self.collection.interval.is_zero() {
            bail!("collection.interval must be greater than zero");
        }
        if self.mqtt.keep_alive_secs < 5 {
            bail!("mqtt.keep_alive_secs must be at least 5");
        }
        Ok(())
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("symbion-agent-openstack");
        path.push("config.toml");
        Ok(path)
    }

    /// Load password from secure OS keyring
    fn load_password(username: &str) -> Result<Password> {
        let entry = Entry::new(KEYRING_SERVICE, username)?;
        Ok(Password::new(entry.get_password()?))
    }

    /// Save password to secure OS keyring
    pub fn save_password(username: &str, password: &str) -> Result<()> {
        let entry = Entry::new(KEYRING_SERVICE, username)?;
        entry.set_password(password).map_err(Into::into)
    }
}

impl OpenStackConfig {
    /// Fill in the password: config file first, then keyring, then environment
    pub fn resolve_password(&mut self, keyring: Option<Password>, env: Option<String>) {
        if self.password.is_some() {
            return;
        }
        self.password = keyring.or_else(|| env.filter(|p| !p.is_empty()).map(Password::new));
    }
}
