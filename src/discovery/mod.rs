//! Discovery documents advertising each entity to the automation hub.
//!
//! One retained document per entity, published once at startup. Documents
//! are independent of each other, so a failure for one entity never blocks
//! the rest.

use crate::entity::{Entity, EntityRegistry};
use crate::error::BridgeResult;
use crate::mqtt::{Topics, Transport};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};


const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Outcome of publishing one entity's document
#[derive(Debug)]
pub struct DiscoveryOutcome {
    pub key: String,
    pub topic: String,
    pub result: BridgeResult<()>,
}

pub struct DiscoveryPublisher {
    topics: Topics,
    device_name: String,
    attempts: u32,
    backoff: Duration,
}

impl DiscoveryPublisher {
    pub fn new(topics: Topics, device_name: &str) -> Self {
        Self {
            topics,
            device_name: device_name.to_string(),
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Override the retry schedule. The n-th retry waits `n * backoff`.
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Build the config document for `entity`.
    pub fn document(&self, entity: &Entity) -> Value {
        let mut doc = Map::new();
        doc.insert("~".into(), json!(self.topics.entity_base(&entity.key)));
        doc.insert("state_topic".into(), json!("~/state"));
        if entity.is_writable() {
            doc.insert("command_topic".into(), json!("~/set"));
        }
        doc.insert("unique_id".into(), json!(self.topics.unique_id(&entity.key)));
        doc.insert(
            "device".into(),
            json!({
                "identifiers": self.topics.serial(),
                "name": self.device_name,
            }),
        );
        // Entity metadata wins on conflicts
        for (name, value) in &entity.metadata {
            doc.insert(name.clone(), value.clone());
        }
        Value::Object(doc)
    }

    pub fn topic(&self, entity: &Entity) -> String {
        self.topics.discovery(entity.kind.component(), &entity.key)
    }

    /// Publish every entity's document, retained.
    ///
    /// Returns one outcome per entity in registry order. Final failures are
    /// logged and reported, never swallowed.
    pub async fn publish_all(
        &self,
        registry: &EntityRegistry,
        transport: &dyn Transport,
    ) -> Vec<DiscoveryOutcome> {
        info!(entities = registry.len(), "Publishing discovery documents");

        let mut outcomes = Vec::with_capacity(registry.len());
        for entity in registry.iter() {
            let topic = self.topic(entity);
            let result = self.publish_one(&topic, entity, transport).await;
            if let Err(e) = &result {
                error!(key = %entity.key, topic = %topic, error = %e, "Discovery publish failed");
            }
            outcomes.push(DiscoveryOutcome {
                key: entity.key.clone(),
                topic,
                result,
            });
        }
        outcomes
    }

    async fn publish_one(
        &self,
        topic: &str,
        entity: &Entity,
        transport: &dyn Transport,
    ) -> BridgeResult<()> {
        let payload = self.document(entity).to_string().into_bytes();

        let mut attempt = 1;
        loop {
            match transport.publish(topic, payload.clone(), true).await {
                Ok(()) => {
                    debug!(key = %entity.key, topic = %topic, "Published discovery document");
                    return Ok(());
                }
                Err(e) if attempt < self.attempts => {
                    warn!(key = %entity.key, attempt, error = %e, "Retrying discovery publish");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
