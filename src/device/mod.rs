//! Access to the charger's internal state.
//!
//! The charger keeps live readings in Redis hashes and its configuration and
//! session history in a relational database. Physical actions (lock, pause)
//! are requested over POSIX message queues owned by the charger firmware.
//!
//! ```text
//!        Wallbox  ── DataSource / DeviceControl
//!       /   |    \
//! CacheStore ConfigStore CommandChannel
//!  (redis)  (mysql/sqlite) (posix mq)
//! ```

mod cache;
mod mq;
mod mysql;
mod snapshot;
mod sql;
mod sqlite;


pub use self::cache::RedisCache;
pub use self::mq::{pad_message, PosixQueue, MESSAGE_SIZE};
pub use self::mysql::MysqlStore;
pub use self::snapshot::{ConfigRow, MeterState, SessionState, Snapshot, METER_HASH, STATE_HASH};
pub use self::sqlite::SqliteStore;

use crate::config::DatabaseConfig;
use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const LOGIN_CHANNEL: &str = "WALLBOX_MYWALLBOX_WALLBOX_LOGIN";
pub const STATEMACHINE_CHANNEL: &str = "WALLBOX_MYWALLBOX_WALLBOX_STATEMACHINE";

pub const EVENT_REQUEST_LOCK: &str = "EVENT_REQUEST_LOCK";
pub const EVENT_RESUME_CHARGING: &str = "EVENT_REQUEST_USER_ACTION#1.000000";
pub const EVENT_PAUSE_CHARGING: &str = "EVENT_REQUEST_USER_ACTION#2.000000";

/// Unlock requests log in the given user.
pub fn login_event(user_id: &str) -> String {
    format!("EVENT_REQUEST_LOGIN#{user_id}.000000")
}

/// Key/value cache holding live readings.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read every field of a hash. Fails with `SnapshotUnavailable`.
    async fn hash(&self, key: &str) -> BridgeResult<HashMap<String, String>>;
}

/// Writable `wallbox_config` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigColumn {
    MaxChargingCurrent,
    HaloBrightness,
}

impl ConfigColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            ConfigColumn::MaxChargingCurrent => "max_charging_current",
            ConfigColumn::HaloBrightness => "halo_brightness",
        }
    }
}

/// Relational store holding configuration and session history.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn config_row(&self) -> BridgeResult<ConfigRow>;
    async fn serial_number(&self) -> BridgeResult<String>;
    /// Most recent user other than the built-in admin
    async fn latest_user_id(&self) -> BridgeResult<String>;
    /// Current ceiling for `max_charging_current`, A
    async fn available_current(&self) -> BridgeResult<i64>;
    async fn set_config_value(&self, column: ConfigColumn, value: i64) -> BridgeResult<()>;
}

/// Fire-and-forget channel to the charger firmware.
pub trait CommandChannel: Send + Sync {
    fn send(&self, channel: &str, command: &str) -> BridgeResult<()>;
}

/// Produces one consistent snapshot of every bridged field.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_snapshot(&self) -> BridgeResult<Snapshot>;
}

/// Write path used by writable entities.
#[async_trait]
pub trait DeviceControl: Send + Sync {
    async fn set_locked(&self, locked: bool) -> BridgeResult<()>;
    async fn set_charging_enable(&self, enable: bool) -> BridgeResult<()>;
    async fn set_max_charging_current(&self, amps: i64) -> BridgeResult<()>;
    async fn set_halo_brightness(&self, percent: i64) -> BridgeResult<()>;
}

/// Pick the relational backend from the URL scheme.
pub fn open_config_store(url: &str) -> BridgeResult<Arc<dyn ConfigStore>> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        info!(path = %path, "Using SQLite config store");
        Ok(Arc::new(SqliteStore::open(path)?))
    } else if url.starts_with("mysql://") {
        info!("Using MySQL config store");
        Ok(Arc::new(MysqlStore::connect(url)?))
    } else {
        Err(BridgeError::Config(format!(
            "database.url must start with mysql:// or sqlite://, got '{url}'"
        )))
    }
}

/// The charger, seen through its stores and command channel.
pub struct Wallbox {
    cache: Arc<dyn CacheStore>,
    sql: Arc<dyn ConfigStore>,
    commands: Arc<dyn CommandChannel>,
    /// Serializes snapshot reads against writes.
    io: Mutex<()>,
}

impl Wallbox {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        sql: Arc<dyn ConfigStore>,
        commands: Arc<dyn CommandChannel>,
    ) -> Self {
        Self {
            cache,
            sql,
            commands,
            io: Mutex::new(()),
        }
    }

    /// Connect to the stores named in the configuration.
    pub async fn connect(config: &DatabaseConfig) -> BridgeResult<Self> {
        let sql = open_config_store(&config.url)?;
        let cache = RedisCache::connect(&config.redis_url).await?;
        Ok(Self::new(Arc::new(cache), sql, Arc::new(PosixQueue)))
    }

    pub async fn serial_number(&self) -> BridgeResult<String> {
        self.sql.serial_number().await
    }

    pub async fn available_current(&self) -> BridgeResult<i64> {
        self.sql.available_current().await
    }

    /// Queue sends may block until the firmware drains the queue, so they run
    /// off the async workers.
    async fn send_command(&self, channel: &'static str, command: String) -> BridgeResult<()> {
        let commands = Arc::clone(&self.commands);
        tokio::task::spawn_blocking(move || commands.send(channel, &command))
            .await
            .map_err(|e| BridgeError::CommandChannel {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?
    }

    async fn read_snapshot(&self) -> BridgeResult<Snapshot> {
        let state = SessionState::from_hash(&self.cache.hash(STATE_HASH).await?)?;
        let meter = MeterState::from_hash(&self.cache.hash(METER_HASH).await?)?;
        let config = self.sql.config_row().await?;
        Ok(Snapshot {
            config,
            state,
            meter,
        })
    }
}

#[async_trait]
impl DataSource for Wallbox {
    async fn fetch_snapshot(&self) -> BridgeResult<Snapshot> {
        let _guard = self.io.lock().await;
        self.read_snapshot().await
    }
}

#[async_trait]
impl DeviceControl for Wallbox {
    async fn set_locked(&self, locked: bool) -> BridgeResult<()> {
        let _guard = self.io.lock().await;
        // The firmware applies the request asynchronously, so compare
        // against fresh state rather than the last poll.
        let current = self.read_snapshot().await?;
        if (current.config.lock == 1) == locked {
            debug!(locked, "Lock already in requested state");
            return Ok(());
        }

        let event = if locked {
            EVENT_REQUEST_LOCK.to_string()
        } else {
            login_event(&self.sql.latest_user_id().await?)
        };
        self.send_command(LOGIN_CHANNEL, event).await
    }

    async fn set_charging_enable(&self, enable: bool) -> BridgeResult<()> {
        let _guard = self.io.lock().await;
        let current = self.read_snapshot().await?;
        if (current.config.charging_enable == 1) == enable {
            debug!(enable, "Charging enable already in requested state");
            return Ok(());
        }

        let event = if enable {
            EVENT_RESUME_CHARGING
        } else {
            EVENT_PAUSE_CHARGING
        };
        self.send_command(STATEMACHINE_CHANNEL, event.to_string()).await
    }

    async fn set_max_charging_current(&self, amps: i64) -> BridgeResult<()> {
        let _guard = self.io.lock().await;
        self.sql
            .set_config_value(ConfigColumn::MaxChargingCurrent, amps)
            .await
    }

    async fn set_halo_brightness(&self, percent: i64) -> BridgeResult<()> {
        let _guard = self.io.lock().await;
        self.sql
            .set_config_value(ConfigColumn::HaloBrightness, percent)
            .await
    }
}
