//! The wallbox entity catalogue.

use super::{Entity, EntityKind, EntityRegistry, Setter, Value};
use crate::device::Snapshot;
use crate::error::BridgeResult;
use crate::status::StatusNormalizer;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lowest current the charger accepts, A
pub const MIN_CHARGING_CURRENT: i64 = 6;

/// Registration-time inputs that are not part of the snapshot.
#[derive(Debug, Clone)]
pub struct CatalogOptions {
    /// Installation limit read from `state_values`, A
    pub available_current: i64,
    pub debug_sensors: bool,
    pub normalizer: Arc<StatusNormalizer>,
}

impl CatalogOptions {
    pub fn new(available_current: i64, debug_sensors: bool) -> Self {
        Self {
            available_current,
            debug_sensors,
            normalizer: Arc::new(StatusNormalizer::default()),
        }
    }
}

/// Build the registry once, from the first snapshot.
pub fn build(initial: &Snapshot, options: &CatalogOptions) -> BridgeResult<EntityRegistry> {
    let mut registry = EntityRegistry::new();

    for entity in wallbox_entities(initial, options) {
        registry.register(entity)?;
    }
    if options.debug_sensors {
        for entity in debug_entities() {
            registry.register(entity)?;
        }
    }

    for entity in registry.iter() {
        match entity.read(initial) {
            Ok(value) => debug!(key = %entity.key, value = %value, "Registered entity"),
            Err(e) => warn!(key = %entity.key, error = %e, "Entity unreadable at registration"),
        }
    }

    Ok(registry)
}

fn wallbox_entities(initial: &Snapshot, options: &CatalogOptions) -> Vec<Entity> {
    // Never advertise a ceiling below the configured value or the charger minimum
    let max_current = options
        .available_current
        .max(initial.config.max_charging_current)
        .max(MIN_CHARGING_CURRENT);
    let normalizer = Arc::clone(&options.normalizer);

    vec![
        Entity::new("added_energy", EntityKind::Sensor, |s| {
            Ok(Value::Float(s.state.schedule_energy))
        })
        .meta("name", "Added energy")
        .meta("device_class", "energy")
        .meta("unit_of_measurement", "Wh")
        .meta("state_class", "total")
        .meta("suggested_display_precision", 1),
        Entity::new("added_range", EntityKind::Sensor, |s| {
            Ok(Value::Float(s.config.added_range))
        })
        .meta("name", "Added range")
        .meta("device_class", "distance")
        .meta("unit_of_measurement", "km")
        .meta("state_class", "total")
        .meta("suggested_display_precision", 1)
        .meta("icon", "mdi:map-marker-distance"),
        Entity::new("cable_connected", EntityKind::BinarySensor, |s| {
            Ok(Value::from(s.cable_connected()))
        })
        .meta("name", "Cable connected")
        .meta("payload_on", "1")
        .meta("payload_off", "0")
        .meta("icon", "mdi:ev-plug-type1")
        .meta("device_class", "plug"),
        Entity::new("charging_enable", EntityKind::Switch, |s| {
            Ok(Value::Integer(s.config.charging_enable))
        })
        .writable(Setter::ChargingEnable)
        .meta("name", "Charging enable")
        .meta("payload_on", "1")
        .meta("payload_off", "0")
        .meta("icon", "mdi:ev-station"),
        Entity::new("charging_power", EntityKind::Sensor, |s| {
            Ok(Value::Float(s.charging_power()))
        })
        .meta("name", "Charging power")
        .meta("device_class", "power")
        .meta("unit_of_measurement", "W")
        .meta("state_class", "measurement")
        .meta("suggested_display_precision", 1),
        Entity::new("cumulative_added_energy", EntityKind::Sensor, |s| {
            Ok(Value::Float(s.config.cumulative_added_energy))
        })
        .meta("name", "Cumulative added energy")
        .meta("device_class", "energy")
        .meta("unit_of_measurement", "Wh")
        .meta("state_class", "total_increasing")
        .meta("suggested_display_precision", 1),
        Entity::new("halo_brightness", EntityKind::Number, |s| {
            Ok(Value::Integer(s.config.halo_brightness))
        })
        .writable(Setter::HaloBrightness { min: 0, max: 100 })
        .meta("name", "Halo Brightness")
        .meta("min", 0)
        .meta("max", 100)
        .meta("icon", "mdi:brightness-percent")
        .meta("unit_of_measurement", "%")
        .meta("entity_category", "config"),
        Entity::new("lock", EntityKind::Lock, |s| Ok(Value::Integer(s.config.lock)))
            .writable(Setter::Lock)
            .meta("name", "Lock")
            .meta("payload_lock", "1")
            .meta("payload_unlock", "0")
            .meta("state_locked", "1")
            .meta("state_unlocked", "0"),
        Entity::new("max_charging_current", EntityKind::Number, |s| {
            Ok(Value::Integer(s.config.max_charging_current))
        })
        .writable(Setter::MaxChargingCurrent {
            min: MIN_CHARGING_CURRENT,
            max: max_current,
        })
        .meta("name", "Max charging current")
        .meta("min", MIN_CHARGING_CURRENT)
        .meta("max", max_current)
        .meta("unit_of_measurement", "A")
        .meta("device_class", "current"),
        Entity::new("status", EntityKind::Sensor, move |s| {
            normalizer
                .normalize(s.meter.charger_status, Some(s.state.session_state))
                .map(|name| Value::Text(name.to_string()))
        })
        .meta("name", "Status"),
    ]
}

fn debug_entities() -> Vec<Entity> {
    vec![
        Entity::new("control_pilot", EntityKind::Sensor, |s| {
            Ok(Value::Integer(s.state.control_pilot))
        })
        .meta("name", "Control pilot")
        .meta("entity_category", "diagnostic"),
        Entity::new("s2_open", EntityKind::Sensor, |s| {
            Ok(Value::Integer(s.state.s2_open))
        })
        .meta("name", "S2 open")
        .meta("entity_category", "diagnostic"),
        Entity::new("session_state", EntityKind::Sensor, |s| {
            Ok(Value::Integer(s.state.session_state))
        })
        .meta("name", "Session state")
        .meta("entity_category", "diagnostic"),
        Entity::new("charger_status", EntityKind::Sensor, |s| {
            Ok(Value::Integer(s.meter.charger_status))
        })
        .meta("name", "Charger status code")
        .meta("entity_category", "diagnostic"),
    ]
}
