use thiserror::Error;

/// Errors raised by the synchronization engine and its collaborators.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Transport connection dropped; the process must exit and be restarted.
    #[error("connection to MQTT broker lost: {0}")]
    ConnectionLost(String),

    /// The data source could not produce a complete snapshot.
    #[error("snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    #[error("unknown status code {0}")]
    UnknownStatusCode(i64),

    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("entity '{0}' is read-only")]
    NotWritable(String),

    #[error("invalid payload '{payload}' for '{key}': {reason}")]
    InvalidPayload {
        key: String,
        payload: String,
        reason: String,
    },

    #[error("failed to publish to '{topic}': {reason}")]
    PublishFailed { topic: String, reason: String },

    #[error("device command channel '{channel}' failed: {reason}")]
    CommandChannel { channel: String, reason: String },

    #[error("storage write failed: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// Fatal errors terminate the process; everything else is reported and
    /// the bridge keeps running.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionLost(_) | BridgeError::SnapshotUnavailable(_)
        )
    }

    pub(crate) fn invalid_payload(key: &str, payload: &str, reason: impl Into<String>) -> Self {
        BridgeError::InvalidPayload {
            key: key.to_string(),
            payload: payload.to_string(),
            reason: reason.into(),
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
