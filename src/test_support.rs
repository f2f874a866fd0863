// In-memory collaborators for unit tests.

use crate::device::{
    CacheStore, CommandChannel, ConfigColumn, ConfigRow, ConfigStore, DataSource, DeviceControl,
    Snapshot, METER_HASH, STATE_HASH,
};
use crate::error::{BridgeError, BridgeResult};
use crate::mqtt::Transport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// A snapshot of an idle, unlocked charger with a cable plugged in.
pub fn sample_snapshot() -> Snapshot {
    let mut snapshot = Snapshot::default();
    snapshot.config = ConfigRow {
        lock: 0,
        charging_enable: 1,
        max_charging_current: 16,
        halo_brightness: 60,
        cumulative_added_energy: 123_456.0,
        added_range: 42.5,
    };
    snapshot.state.session_state = 161;
    snapshot.state.control_pilot = 2;
    snapshot.state.schedule_energy = 1500.0;
    snapshot.meter.charger_status = 2;
    snapshot
}

/// Redis hashes matching `sample_snapshot()`.
pub fn sample_hashes() -> HashMap<String, HashMap<String, String>> {
    let state: HashMap<String, String> = [
        ("session.state", "161"),
        ("ctrlPilot", "2"),
        ("S2open", "0"),
        ("scheduleEnergy", "1500"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let meter: HashMap<String, String> = [
        ("tms.charger_status", "2"),
        ("tms.line1.power_watt.value", "0"),
        ("tms.line2.power_watt.value", "0"),
        ("tms.line3.power_watt.value", "0"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let mut hashes = HashMap::new();
    hashes.insert(STATE_HASH.to_string(), state);
    hashes.insert(METER_HASH.to_string(), meter);
    hashes
}

#[derive(Default)]
pub struct FakeCache {
    pub hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    pub offline: Mutex<bool>,
}

impl FakeCache {
    pub fn with_sample() -> Self {
        Self {
            hashes: Mutex::new(sample_hashes()),
            offline: Mutex::new(false),
        }
    }

    pub fn set(&self, hash: &str, field: &str, value: &str) {
        self.hashes
            .lock()
            .unwrap()
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }
}

#[async_trait]
impl CacheStore for FakeCache {
    async fn hash(&self, key: &str) -> BridgeResult<HashMap<String, String>> {
        if *self.offline.lock().unwrap() {
            return Err(BridgeError::SnapshotUnavailable("redis offline".to_string()));
        }
        Ok(self
            .hashes
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}

pub struct FakeConfigStore {
    pub row: Mutex<ConfigRow>,
    pub serial: String,
    pub user_id: String,
    pub available_current: i64,
    pub writes: Mutex<Vec<(ConfigColumn, i64)>>,
}

impl FakeConfigStore {
    pub fn with_sample() -> Self {
        Self {
            row: Mutex::new(sample_snapshot().config),
            serial: "123456".to_string(),
            user_id: "7".to_string(),
            available_current: 32,
            writes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ConfigStore for FakeConfigStore {
    async fn config_row(&self) -> BridgeResult<ConfigRow> {
        Ok(self.row.lock().unwrap().clone())
    }

    async fn serial_number(&self) -> BridgeResult<String> {
        Ok(self.serial.clone())
    }

    async fn latest_user_id(&self) -> BridgeResult<String> {
        Ok(self.user_id.clone())
    }

    async fn available_current(&self) -> BridgeResult<i64> {
        Ok(self.available_current)
    }

    async fn set_config_value(&self, column: ConfigColumn, value: i64) -> BridgeResult<()> {
        self.writes.lock().unwrap().push((column, value));
        let mut row = self.row.lock().unwrap();
        match column {
            ConfigColumn::MaxChargingCurrent => row.max_charging_current = value,
            ConfigColumn::HaloBrightness => row.halo_brightness = value,
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl CommandChannel for RecordingChannel {
    fn send(&self, channel: &str, command: &str) -> BridgeResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((channel.to_string(), command.to_string()));
        Ok(())
    }
}

/// Data source returning whatever snapshot is currently set.
pub struct FakeSource {
    pub snapshot: Mutex<BridgeResult<Snapshot>>,
}

impl FakeSource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Ok(snapshot)),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut Snapshot)) {
        let mut current = self.snapshot.lock().unwrap();
        if let Ok(snapshot) = current.as_mut() {
            f(snapshot);
        }
    }

    pub fn fail(&self) {
        *self.snapshot.lock().unwrap() =
            Err(BridgeError::SnapshotUnavailable("store unreachable".to_string()));
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn fetch_snapshot(&self) -> BridgeResult<Snapshot> {
        match &*self.snapshot.lock().unwrap() {
            Ok(snapshot) => Ok(snapshot.clone()),
            Err(e) => Err(BridgeError::SnapshotUnavailable(e.to_string())),
        }
    }
}

/// Device control recording every applied write.
#[derive(Default)]
pub struct RecordingControl {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingControl {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> BridgeResult<()> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl DeviceControl for RecordingControl {
    async fn set_locked(&self, locked: bool) -> BridgeResult<()> {
        self.record(format!("lock={locked}"))
    }

    async fn set_charging_enable(&self, enable: bool) -> BridgeResult<()> {
        self.record(format!("charging_enable={enable}"))
    }

    async fn set_max_charging_current(&self, amps: i64) -> BridgeResult<()> {
        self.record(format!("max_charging_current={amps}"))
    }

    async fn set_halo_brightness(&self, percent: i64) -> BridgeResult<()> {
        self.record(format!("halo_brightness={percent}"))
    }
}

/// Transport recording every publish; topics listed in `failing` are rejected.
#[derive(Default)]
pub struct RecordingTransport {
    pub published: Mutex<Vec<(String, String, bool)>>,
    pub failing: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn published(&self) -> Vec<(String, String, bool)> {
        self.published.lock().unwrap().clone()
    }

    pub fn payloads_for(&self, topic: &str) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, payload, _)| payload)
            .collect()
    }

    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> BridgeResult<()> {
        if self.failing.lock().unwrap().iter().any(|t| t == topic) {
            return Err(BridgeError::PublishFailed {
                topic: topic.to_string(),
                reason: "broker rejected".to_string(),
            });
        }
        let payload = String::from_utf8(payload).unwrap();
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload, retain));
        Ok(())
    }
}
