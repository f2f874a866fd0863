use crate::error::BridgeError;
use crate::rate_limit::RateLimitPolicy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Complete bridge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Per-entity rate limits, keyed by entity key
    #[serde(default = "default_rate_limits")]
    pub rate_limits: BTreeMap<String, RateLimitConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            settings: SettingsConfig::default(),
            database: DatabaseConfig::default(),
            rate_limits: default_rate_limits(),
        }
    }
}

/// MQTT broker connection
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
    /// Grace period for the final disconnect on shutdown
    #[serde(default = "default_disconnect_timeout")]
    pub disconnect_timeout_ms: u64,
}

fn default_mqtt_host() -> String {
    "127.0.0.1".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    30
}

fn default_disconnect_timeout() -> u64 {
    250
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            keep_alive_seconds: default_keep_alive(),
            disconnect_timeout_ms: default_disconnect_timeout(),
        }
    }
}

/// Bridge behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_polling_interval")]
    pub polling_interval_seconds: u64,
    /// Device name shown by discovery consumers
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Expose raw state-machine fields as diagnostic sensors
    #[serde(default)]
    pub debug_sensors: bool,
}

fn default_polling_interval() -> u64 {
    1
}

fn default_device_name() -> String {
    "Wallbox".to_string()
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            polling_interval_seconds: default_polling_interval(),
            device_name: default_device_name(),
            debug_sensors: false,
        }
    }
}

/// Data source locations
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `mysql://...` or `sqlite://<path>`
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

fn default_database_url() -> String {
    "mysql://root@127.0.0.1:3306/wallbox".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            redis_url: default_redis_url(),
        }
    }
}

/// Rate limit for one entity
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RateLimitConfig {
    pub min_interval_seconds: u64,
    pub delta_threshold: f64,
}

impl RateLimitConfig {
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(
            Duration::from_secs(self.min_interval_seconds),
            self.delta_threshold,
        )
    }
}

fn default_rate_limits() -> BTreeMap<String, RateLimitConfig> {
    let mut limits = BTreeMap::new();
    limits.insert(
        "charging_power".to_string(),
        RateLimitConfig {
            min_interval_seconds: 10,
            delta_threshold: 100.0,
        },
    );
    limits.insert(
        "added_energy".to_string(),
        RateLimitConfig {
            min_interval_seconds: 10,
            delta_threshold: 50.0,
        },
    );
    limits
}

impl BridgeConfig {
    /// Polling period for the sync loop
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.settings.polling_interval_seconds)
    }

    /// Rate limit policies keyed by entity key
    pub fn rate_limit_policies(&self) -> BTreeMap<String, RateLimitPolicy> {
        self.rate_limits
            .iter()
            .map(|(key, limit)| (key.clone(), limit.policy()))
            .collect()
    }

    fn validate(&self) -> Result<(), BridgeError> {
        if self.settings.polling_interval_seconds == 0 {
            return Err(BridgeError::Config(
                "settings.polling_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.mqtt.host.is_empty() {
            return Err(BridgeError::Config("mqtt.host is required".to_string()));
        }
        for (key, limit) in &self.rate_limits {
            if !limit.delta_threshold.is_finite() || limit.delta_threshold < 0.0 {
                return Err(BridgeError::Config(format!(
                    "rate_limits.{key}.delta_threshold must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}

/// Parse and validate configuration from TOML text
pub fn parse_config(contents: &str) -> Result<BridgeConfig, BridgeError> {
    let config: BridgeConfig =
        toml::from_str(contents).map_err(|e| BridgeError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<BridgeConfig, BridgeError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("cannot read {path}: {e}")))?;
    parse_config(&contents)
}
