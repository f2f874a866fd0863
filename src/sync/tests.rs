use super::*;
use crate::entity::{build, CatalogOptions, Value};
use crate::state::ChangeGate;
use crate::test_support::{sample_snapshot, FakeSource, RecordingTransport};
use std::collections::BTreeMap;

const POWER_TOPIC: &str = "wallbox_123456/charging_power/state";
const STATUS_TOPIC: &str = "wallbox_123456/status/state";

struct Harness {
    sync: SyncLoop,
    engine: Arc<Engine>,
    source: Arc<FakeSource>,
    transport: Arc<RecordingTransport>,
}

fn harness() -> Harness {
    let registry = build(&sample_snapshot(), &CatalogOptions::new(32, false)).unwrap();
    let mut policies = BTreeMap::new();
    policies.insert(
        "charging_power".to_string(),
        crate::rate_limit::RateLimitPolicy::new(Duration::from_secs(10), 100.0),
    );
    let engine = Arc::new(Engine::new(registry, ChangeGate::new(policies)));
    let source = Arc::new(FakeSource::new(sample_snapshot()));
    let transport = Arc::new(RecordingTransport::default());
    let sync = SyncLoop::new(
        engine.clone(),
        source.clone(),
        transport.clone(),
        Topics::new("123456"),
        Duration::from_secs(1),
    );
    Harness {
        sync,
        engine,
        source,
        transport,
    }
}

#[tokio::test]
async fn test_first_cycle_publishes_everything_retained() {
    let h = harness();
    let report = h.sync.run_cycle(Instant::now()).await.unwrap();

    assert_eq!(report.published, h.engine.registry.len());
    assert_eq!(report.suppressed, 0);

    let published = h.transport.published();
    let topics: Vec<&str> = published.iter().map(|(t, _, _)| t.as_str()).collect();
    // Registry order
    assert_eq!(topics[0], "wallbox_123456/added_energy/state");
    assert_eq!(topics[topics.len() - 1], STATUS_TOPIC);
    assert!(published.iter().all(|(_, _, retain)| *retain));

    assert_eq!(h.transport.payloads_for(STATUS_TOPIC), vec!["Connected waiting car"]);
    assert_eq!(h.transport.payloads_for("wallbox_123456/lock/state"), vec!["0"]);
}

#[tokio::test]
async fn test_unchanged_values_are_suppressed() {
    let h = harness();
    let t0 = Instant::now();
    h.sync.run_cycle(t0).await.unwrap();
    h.transport.clear();

    let report = h.sync.run_cycle(t0 + Duration::from_secs(1)).await.unwrap();
    assert_eq!(report.published, 0);
    assert_eq!(report.suppressed, h.engine.registry.len());
    assert!(h.transport.published().is_empty());
}

#[tokio::test]
async fn test_only_changed_entities_publish() {
    let h = harness();
    let t0 = Instant::now();
    h.sync.run_cycle(t0).await.unwrap();
    h.transport.clear();

    h.source.update(|s| {
        s.config.lock = 1;
        s.config.halo_brightness = 10;
    });
    h.sync.run_cycle(t0 + Duration::from_secs(1)).await.unwrap();

    let topics: Vec<String> = h.transport.published().into_iter().map(|(t, _, _)| t).collect();
    assert_eq!(
        topics,
        vec![
            "wallbox_123456/halo_brightness/state",
            "wallbox_123456/lock/state"
        ]
    );
}

#[tokio::test]
async fn test_rate_limited_power() {
    let h = harness();
    let t0 = Instant::now();
    h.source.update(|s| s.meter.line1_power = 100.0);
    h.sync.run_cycle(t0).await.unwrap();

    h.source.update(|s| s.meter.line1_power = 150.0);
    h.sync.run_cycle(t0 + Duration::from_secs(5)).await.unwrap();
    h.source.update(|s| s.meter.line1_power = 250.0);
    h.sync.run_cycle(t0 + Duration::from_secs(6)).await.unwrap();

    assert_eq!(h.transport.payloads_for(POWER_TOPIC), vec!["100", "250"]);
}

#[tokio::test]
async fn test_snapshot_failure_is_fatal() {
    let h = harness();
    h.source.fail();

    let err = h.sync.run_cycle(Instant::now()).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(h.transport.published().is_empty());
}

#[tokio::test]
async fn test_unknown_status_skips_only_status() {
    let h = harness();
    h.source.update(|s| s.meter.charger_status = 250);

    let report = h.sync.run_cycle(Instant::now()).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.published, h.engine.registry.len() - 1);
    assert!(h.transport.payloads_for(STATUS_TOPIC).is_empty());
    assert!(h.engine.gate.last_published("status").is_none());
}

#[tokio::test]
async fn test_publish_failure_does_not_abort_cycle() {
    let h = harness();
    h.transport
        .failing
        .lock()
        .unwrap()
        .push("wallbox_123456/lock/state".to_string());

    let t0 = Instant::now();
    let report = h.sync.run_cycle(t0).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.published, h.engine.registry.len() - 1);
    // Entities after the failing one were still published
    assert_eq!(h.transport.payloads_for(STATUS_TOPIC).len(), 1);
    assert!(h.engine.gate.last_published("lock").is_none());

    // Retried on the next cycle once the transport recovers
    h.transport.failing.lock().unwrap().clear();
    h.transport.clear();
    h.sync.run_cycle(t0 + Duration::from_secs(1)).await.unwrap();
    assert_eq!(h.transport.payloads_for("wallbox_123456/lock/state"), vec!["0"]);
    assert_eq!(
        h.engine.gate.last_published("lock").unwrap().value,
        Value::Integer(0)
    );
}

#[tokio::test]
async fn test_run_stops_at_wait_point() {
    let h = harness();
    let result = h.sync.run(async { Ok(()) }).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_run_reports_stop_error() {
    let h = harness();
    let result = h
        .sync
        .run(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err(BridgeError::ConnectionLost("broker went away".to_string()))
        })
        .await;
    assert!(matches!(result, Err(BridgeError::ConnectionLost(_))));
    // The immediate first tick ran a cycle before the stop fired
    assert!(!h.transport.published().is_empty());
}

#[tokio::test]
async fn test_run_ends_on_failed_cycle() {
    let h = harness();
    h.source.fail();
    let result = h.sync.run(std::future::pending()).await;
    assert!(matches!(result, Err(BridgeError::SnapshotUnavailable(_))));
}

#[tokio::test]
async fn test_poll_request_triggers_cycle() {
    let h = harness();
    let sync = SyncLoop::new(
        h.engine.clone(),
        h.source.clone(),
        h.transport.clone(),
        Topics::new("123456"),
        Duration::from_secs(3600),
    );

    let (engine, source, transport) = (h.engine.clone(), h.source.clone(), h.transport.clone());
    let result = sync
        .run(async move {
            // Let the immediate first tick complete
            tokio::time::sleep(Duration::from_millis(50)).await;
            transport.clear();
            source.update(|s| s.config.lock = 1);
            engine.request_poll();
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(h.transport.payloads_for("wallbox_123456/lock/state"), vec!["1"]);
}
