use super::sql::{
    update_config_statement, AVAILABLE_CURRENT_QUERY, CONFIG_ROW_QUERY, LATEST_USER_QUERY,
    SERIAL_NUMBER_QUERY,
};
use super::{ConfigColumn, ConfigRow, ConfigStore};
use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed config store, for bench setups that mirror the charger schema.
///
/// # Thread Safety
/// - Connection is wrapped in Mutex for safe concurrent access
/// - Queries are short and run inline on the calling task
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> BridgeResult<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| BridgeError::Config(format!("failed to open database: {e}")))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub(super) fn conn(&self) -> BridgeResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BridgeError::SnapshotUnavailable("sqlite connection poisoned".to_string()))
    }

    fn query_one<T, F>(&self, query: &str, map: F) -> BridgeResult<T>
    where
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        self.conn()?
            .query_row(query, [], map)
            .optional()
            .map_err(|e| BridgeError::SnapshotUnavailable(format!("sqlite query: {e}")))?
            .ok_or_else(|| BridgeError::SnapshotUnavailable(format!("no rows for: {query}")))
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn config_row(&self) -> BridgeResult<ConfigRow> {
        self.query_one(CONFIG_ROW_QUERY, |row| {
            Ok(ConfigRow {
                lock: row.get(0)?,
                charging_enable: row.get(1)?,
                max_charging_current: row.get(2)?,
                halo_brightness: row.get(3)?,
                cumulative_added_energy: row.get(4)?,
                added_range: row.get(5)?,
            })
        })
    }

    async fn serial_number(&self) -> BridgeResult<String> {
        self.query_one(SERIAL_NUMBER_QUERY, |row| row.get(0))
    }

    async fn latest_user_id(&self) -> BridgeResult<String> {
        let user_id: i64 = self.query_one(LATEST_USER_QUERY, |row| row.get(0))?;
        Ok(user_id.to_string())
    }

    async fn available_current(&self) -> BridgeResult<i64> {
        self.query_one(AVAILABLE_CURRENT_QUERY, |row| row.get(0))
    }

    async fn set_config_value(&self, column: ConfigColumn, value: i64) -> BridgeResult<()> {
        self.conn()?
            .execute(&update_config_statement(column), params![value])
            .map_err(|e| BridgeError::Storage(format!("update {}: {e}", column.column_name())))?;
        Ok(())
    }
}
