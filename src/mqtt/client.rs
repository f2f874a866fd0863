use super::publisher::MqttPublisher;
use crate::config::MqttConfig;
use crate::error::{BridgeError, BridgeResult};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const REQUEST_CAPACITY: usize = 64;
const INBOUND_CAPACITY: usize = 32;

/// A publish received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

/// Receiving half of a connection.
pub struct MqttEvents {
    /// Publishes on subscribed topics, in arrival order
    pub messages: mpsc::Receiver<InboundMessage>,
    /// Resolves once if the broker connection drops
    pub lost: oneshot::Receiver<BridgeError>,
}

/// MQTT connection with a background event loop
pub struct MqttClient {
    client: AsyncClient,
    pump: JoinHandle<()>,
    closing: Arc<AtomicBool>,
}

impl MqttClient {
    /// Connect to the broker and wait for its acknowledgement
    pub async fn connect(config: &MqttConfig) -> BridgeResult<(Self, MqttEvents)> {
        let client_id = format!("wallbox-bridge-{}", Uuid::new_v4());
        info!(
            "Connecting to MQTT broker at {}:{} as {}",
            config.host, config.port, client_id
        );

        let mut options = MqttOptions::new(client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_seconds));
        options.set_clean_session(true);
        if let Some(username) = config.username.as_deref().filter(|u| !u.is_empty()) {
            options.set_credentials(username, config.password.clone().unwrap_or_default());
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        wait_for_connack(&mut eventloop).await?;
        info!("Connected to MQTT broker");

        let (message_tx, messages) = mpsc::channel(INBOUND_CAPACITY);
        let (lost_tx, lost) = oneshot::channel();
        let closing = Arc::new(AtomicBool::new(false));
        let pump = tokio::spawn(pump_events(
            eventloop,
            message_tx,
            lost_tx,
            Arc::clone(&closing),
        ));

        Ok((
            Self {
                client,
                pump,
                closing,
            },
            MqttEvents { messages, lost },
        ))
    }

    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher::new(self.client.clone())
    }

    pub async fn subscribe(&self, filter: &str) -> BridgeResult<()> {
        info!(filter = %filter, "Subscribing");
        self.client
            .subscribe(filter, QoS::AtLeastOnce)
            .await
            .map_err(|e| BridgeError::ConnectionLost(format!("subscribe {filter}: {e}")))
    }

    /// Send a clean disconnect, giving in-flight publishes up to `grace` to drain
    pub async fn disconnect(mut self, grace: Duration) {
        self.closing.store(true, Ordering::SeqCst);
        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "Failed to request MQTT disconnect");
        }
        if tokio::time::timeout(grace, &mut self.pump).await.is_err() {
            debug!("MQTT event loop did not stop within grace period");
            self.pump.abort();
        }
        info!("Disconnected from MQTT broker");
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> BridgeResult<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                debug!(code = ?ack.code, "Broker acknowledged connection");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => return Err(BridgeError::ConnectionLost(format!("connect: {e}"))),
        }
    }
}

async fn pump_events(
    mut eventloop: EventLoop,
    messages: mpsc::Sender<InboundMessage>,
    lost: oneshot::Sender<BridgeError>,
    closing: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic,
                    payload: String::from_utf8_lossy(&publish.payload).into_owned(),
                };
                debug!(topic = %message.topic, "Received MQTT message");
                if messages.send(message).await.is_err() {
                    debug!("Inbound receiver dropped, discarding message");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) if closing.load(Ordering::SeqCst) => {
                return;
            }
            Ok(_) => {}
            Err(e) => {
                if !closing.load(Ordering::SeqCst) {
                    warn!(error = %e, "MQTT connection lost");
                    let _ = lost.send(BridgeError::ConnectionLost(e.to_string()));
                }
                return;
            }
        }
    }
}
