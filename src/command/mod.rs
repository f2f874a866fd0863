//! Inbound command handling.

use crate::device::DeviceControl;
use crate::error::{BridgeError, BridgeResult};
use crate::mqtt::{InboundMessage, Topics};
use crate::state::Engine;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};


/// Routes `<root>/<key>/set` messages to the entity's write path.
pub struct CommandDispatcher {
    engine: Arc<Engine>,
    control: Arc<dyn DeviceControl>,
    topics: Topics,
}

impl CommandDispatcher {
    pub fn new(engine: Arc<Engine>, control: Arc<dyn DeviceControl>, topics: Topics) -> Self {
        Self {
            engine,
            control,
            topics,
        }
    }

    /// Apply one command.
    ///
    /// Never touches publish state. A successful write asks the sync loop
    /// for an early poll so the new state is published promptly.
    pub async fn dispatch(&self, topic: &str, payload: &str) -> BridgeResult<()> {
        let key = self
            .topics
            .command_key(topic)
            .ok_or_else(|| BridgeError::UnknownEntity(topic.to_string()))?;
        let entity = self
            .engine
            .registry
            .get(key)
            .ok_or_else(|| BridgeError::UnknownEntity(key.to_string()))?;
        let setter = entity
            .setter()
            .ok_or_else(|| BridgeError::NotWritable(key.to_string()))?;

        info!(key = %key, payload = %payload, "Setting entity");
        setter.apply(key, payload, self.control.as_ref()).await?;

        self.engine.request_poll();
        Ok(())
    }

    /// Serve commands until the transport closes the channel.
    ///
    /// Failures are local to the command that caused them.
    pub async fn run(&self, mut messages: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = messages.recv().await {
            if let Err(e) = self.dispatch(&message.topic, &message.payload).await {
                warn!(topic = %message.topic, error = %e, "Command rejected");
            }
        }
        info!("Command channel closed");
    }
}
