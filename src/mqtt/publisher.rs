use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use tracing::debug;

/// Outbound side of the message transport.
///
/// Every publish is at-least-once.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> BridgeResult<()>;
}

/// Publishes through an MQTT client
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> BridgeResult<()> {
        debug!(topic = %topic, bytes = payload.len(), retain, "Publishing to MQTT");

        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| BridgeError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}
