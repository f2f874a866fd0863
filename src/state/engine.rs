use crate::entity::EntityRegistry;
use crate::state::ChangeGate;
use tokio::sync::Notify;
use tracing::debug;

/// Engine state shared by the poll task and the command task.
///
/// The registry is immutable after startup; the gate carries the only
/// mutable per-entity state and serializes access to it.
#[derive(Debug)]
pub struct Engine {
    pub registry: EntityRegistry,
    pub gate: ChangeGate,
    /// Wakes the sync loop before its next tick
    poll_now: Notify,
}

impl Engine {
    pub fn new(registry: EntityRegistry, gate: ChangeGate) -> Self {
        Self {
            registry,
            gate,
            poll_now: Notify::new(),
        }
    }

    /// Ask for a poll cycle as soon as the sync loop is idle.
    ///
    /// Requests made while a cycle is running collapse into one extra cycle.
    pub fn request_poll(&self) {
        debug!("Early poll requested");
        self.poll_now.notify_one();
    }

    pub async fn poll_requested(&self) {
        self.poll_now.notified().await;
    }
}
