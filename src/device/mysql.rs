use super::sql::{
    update_config_statement, AVAILABLE_CURRENT_QUERY, CONFIG_ROW_QUERY, LATEST_USER_QUERY,
    SERIAL_NUMBER_QUERY,
};
use super::{ConfigColumn, ConfigRow, ConfigStore};
use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use mysql_async::prelude::{FromValue, Queryable};
use mysql_async::{Conn, Opts, Pool, Row};
use tracing::debug;

/// MySQL-backed config store (the charger's own database)
pub struct MysqlStore {
    pool: Pool,
}

impl MysqlStore {
    /// Create a connection pool. Connections are opened lazily.
    pub fn connect(url: &str) -> BridgeResult<Self> {
        let opts = Opts::from_url(url)
            .map_err(|e| BridgeError::Config(format!("invalid database url: {e}")))?;
        Ok(Self {
            pool: Pool::new(opts),
        })
    }

    async fn conn(&self) -> BridgeResult<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| BridgeError::SnapshotUnavailable(format!("mysql connect: {e}")))
    }

    async fn first_row(&self, query: &str) -> BridgeResult<Row> {
        let mut conn = self.conn().await?;
        let row: Option<Row> = conn
            .query_first(query)
            .await
            .map_err(|e| BridgeError::SnapshotUnavailable(format!("mysql query: {e}")))?;
        row.ok_or_else(|| BridgeError::SnapshotUnavailable(format!("no rows for: {query}")))
    }
}

fn column<T: FromValue>(row: &Row, index: usize, name: &str) -> BridgeResult<T> {
    match row.get_opt::<T, usize>(index) {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(BridgeError::SnapshotUnavailable(format!(
            "column '{name}' has unexpected value: {e:?}"
        ))),
        None => Err(BridgeError::SnapshotUnavailable(format!(
            "column '{name}' missing from result"
        ))),
    }
}

#[async_trait]
impl ConfigStore for MysqlStore {
    async fn config_row(&self) -> BridgeResult<ConfigRow> {
        let row = self.first_row(CONFIG_ROW_QUERY).await?;
        Ok(ConfigRow {
            lock: column(&row, 0, "lock")?,
            charging_enable: column(&row, 1, "charging_enable")?,
            max_charging_current: column(&row, 2, "max_charging_current")?,
            halo_brightness: column(&row, 3, "halo_brightness")?,
            cumulative_added_energy: column(&row, 4, "cumulative_added_energy")?,
            added_range: column(&row, 5, "added_range")?,
        })
    }

    async fn serial_number(&self) -> BridgeResult<String> {
        let row = self.first_row(SERIAL_NUMBER_QUERY).await?;
        column(&row, 0, "serial_num")
    }

    async fn latest_user_id(&self) -> BridgeResult<String> {
        let row = self.first_row(LATEST_USER_QUERY).await?;
        column(&row, 0, "user_id")
    }

    async fn available_current(&self) -> BridgeResult<i64> {
        let row = self.first_row(AVAILABLE_CURRENT_QUERY).await?;
        column(&row, 0, "max_avbl_current")
    }

    async fn set_config_value(&self, column: ConfigColumn, value: i64) -> BridgeResult<()> {
        let statement = update_config_statement(column);
        debug!(column = column.column_name(), value, "Updating wallbox_config");

        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| BridgeError::Storage(format!("mysql connect: {e}")))?;
        conn.exec_drop(statement, (value,))
            .await
            .map_err(|e| BridgeError::Storage(format!("update {}: {e}", column.column_name())))
    }
}
