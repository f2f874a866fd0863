//! Startup sequencing and shutdown.
//!
//! Startup order: charger stores, serial number, first snapshot, entity
//! registry, broker connection, discovery, command subscription, sync loop.
//! Any failure before the sync loop starts aborts startup.

use crate::command::CommandDispatcher;
use crate::config::BridgeConfig;
use crate::device::{DataSource, DeviceControl, Snapshot, Wallbox};
use crate::discovery::{DiscoveryOutcome, DiscoveryPublisher};
use crate::entity::{self, CatalogOptions};
use crate::error::{BridgeError, BridgeResult};
use crate::mqtt::{InboundMessage, MqttClient, Topics, Transport};
use crate::state::{ChangeGate, Engine};
use crate::sync::SyncLoop;
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The assembled engine for one charger, independent of any live connection.
pub struct Bridge {
    engine: Arc<Engine>,
    topics: Topics,
    discovery: DiscoveryPublisher,
    dispatcher: Arc<CommandDispatcher>,
    sync: SyncLoop,
    transport: Arc<dyn Transport>,
}

impl Bridge {
    /// Build the registry from the first snapshot and wire up the engine.
    pub fn new(
        config: &BridgeConfig,
        serial: &str,
        available_current: i64,
        initial: &Snapshot,
        source: Arc<dyn DataSource>,
        control: Arc<dyn DeviceControl>,
        transport: Arc<dyn Transport>,
    ) -> BridgeResult<Self> {
        let options = CatalogOptions::new(available_current, config.settings.debug_sensors);
        let registry = entity::build(initial, &options)?;
        let engine = Arc::new(Engine::new(
            registry,
            ChangeGate::new(config.rate_limit_policies()),
        ));
        let topics = Topics::new(serial);

        Ok(Self {
            discovery: DiscoveryPublisher::new(topics.clone(), &config.settings.device_name),
            dispatcher: Arc::new(CommandDispatcher::new(
                Arc::clone(&engine),
                control,
                topics.clone(),
            )),
            sync: SyncLoop::new(
                Arc::clone(&engine),
                source,
                Arc::clone(&transport),
                topics.clone(),
                config.polling_interval(),
            ),
            engine,
            topics,
            transport,
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Publish every discovery document, logging a summary.
    pub async fn announce(&self) -> Vec<DiscoveryOutcome> {
        let outcomes = self
            .discovery
            .publish_all(&self.engine.registry, self.transport.as_ref())
            .await;
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        if failed > 0 {
            warn!(failed, total = outcomes.len(), "Some discovery documents were not published");
        } else {
            info!(total = outcomes.len(), "Discovery complete");
        }
        outcomes
    }

    /// Serve inbound commands on a separate task.
    pub fn spawn_dispatcher(&self, messages: mpsc::Receiver<InboundMessage>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move { dispatcher.run(messages).await })
    }

    /// Run the sync loop until `stop` resolves or a cycle fails.
    pub async fn serve<F>(&self, stop: F) -> BridgeResult<()>
    where
        F: Future<Output = BridgeResult<()>>,
    {
        self.sync.run(stop).await
    }
}

/// Run the bridge until a termination signal or a fatal error.
pub async fn launch(config: BridgeConfig) -> Result<()> {
    let wallbox = Arc::new(
        Wallbox::connect(&config.database)
            .await
            .context("Failed to connect to charger stores")?,
    );
    let serial = wallbox
        .serial_number()
        .await
        .context("Failed to read serial number")?;
    info!(serial = %serial, "Found charger");

    let initial = wallbox
        .fetch_snapshot()
        .await
        .context("Failed to read initial charger state")?;
    let available_current = wallbox
        .available_current()
        .await
        .context("Failed to read available current")?;

    let (client, events) = MqttClient::connect(&config.mqtt)
        .await
        .context("Failed to connect to MQTT broker")?;
    let transport: Arc<dyn Transport> = Arc::new(client.publisher());

    let bridge = Bridge::new(
        &config,
        &serial,
        available_current,
        &initial,
        wallbox.clone(),
        wallbox,
        transport,
    )?;
    bridge.announce().await;

    client
        .subscribe(&bridge.topics().command_filter())
        .await
        .context("Failed to subscribe to command topics")?;
    let dispatcher = bridge.spawn_dispatcher(events.messages);

    let lost = events.lost;
    let stop = async move {
        tokio::select! {
            _ = shutdown_signal() => Ok(()),
            lost = lost => Err(lost.unwrap_or_else(|_| {
                BridgeError::ConnectionLost("MQTT event loop stopped".to_string())
            })),
        }
    };

    info!("Bridge running");
    let result = bridge.serve(stop).await;

    dispatcher.abort();
    client
        .disconnect(Duration::from_millis(config.mqtt.disconnect_timeout_ms))
        .await;

    match result {
        Ok(()) => {
            info!("Bridge stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "Bridge stopped on error");
            Err(e.into())
        }
    }
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
