// MQTT transport

mod client;
mod publisher;
mod topics;

pub use client::{InboundMessage, MqttClient, MqttEvents};
pub use publisher::{MqttPublisher, Transport};
pub use topics::{Topics, DISCOVERY_PREFIX};
