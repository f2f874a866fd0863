use crate::device::{DeviceControl, Snapshot};
use crate::error::{BridgeError, BridgeResult};
use std::collections::BTreeMap;
use std::fmt;

mod catalog;

pub use catalog::{build, CatalogOptions, MIN_CHARGING_CURRENT};


/// Typed value read from a snapshot.
///
/// Change detection compares by exact equality within the same variant.
/// Floats compare bitwise, so a repeated NaN counts as unchanged.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    /// Numeric distance from `other`; `None` unless both are numeric.
    pub fn delta(&self, other: &Value) -> Option<f64> {
        Some(self.as_f64()? - other.as_f64()?)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

/// Capability set of a bridged field. Doubles as the discovery component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Sensor,
    BinarySensor,
    Switch,
    Number,
    Lock,
}

impl EntityKind {
    pub fn component(&self) -> &'static str {
        match self {
            EntityKind::Sensor => "sensor",
            EntityKind::BinarySensor => "binary_sensor",
            EntityKind::Switch => "switch",
            EntityKind::Number => "number",
            EntityKind::Lock => "lock",
        }
    }
}

/// Write path of a writable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setter {
    Lock,
    ChargingEnable,
    MaxChargingCurrent { min: i64, max: i64 },
    HaloBrightness { min: i64, max: i64 },
}

impl Setter {
    /// Validate `payload` and hand it to the device.
    pub async fn apply(
        &self,
        key: &str,
        payload: &str,
        control: &dyn DeviceControl,
    ) -> BridgeResult<()> {
        match *self {
            Setter::Lock => control.set_locked(parse_flag(key, payload)?).await,
            Setter::ChargingEnable => control.set_charging_enable(parse_flag(key, payload)?).await,
            Setter::MaxChargingCurrent { min, max } => {
                control
                    .set_max_charging_current(parse_bounded(key, payload, min, max)?)
                    .await
            }
            Setter::HaloBrightness { min, max } => {
                control
                    .set_halo_brightness(parse_bounded(key, payload, min, max)?)
                    .await
            }
        }
    }
}

fn parse_flag(key: &str, payload: &str) -> BridgeResult<bool> {
    match payload.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(BridgeError::invalid_payload(key, payload, "expected 0 or 1")),
    }
}

fn parse_bounded(key: &str, payload: &str, min: i64, max: i64) -> BridgeResult<i64> {
    let trimmed = payload.trim();
    let value = match trimmed.parse::<i64>() {
        Ok(v) => v,
        // Number entities may send "16.0"
        Err(_) => match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() && v.fract() == 0.0 => v as i64,
            _ => return Err(BridgeError::invalid_payload(key, payload, "expected an integer")),
        },
    };
    if value < min || value > max {
        return Err(BridgeError::invalid_payload(
            key,
            payload,
            format!("must be within {min}..={max}"),
        ));
    }
    Ok(value)
}

type Reader = Box<dyn Fn(&Snapshot) -> BridgeResult<Value> + Send + Sync>;

/// Discovery metadata merged into the entity's config document.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// One bridged device field.
pub struct Entity {
    pub key: String,
    pub kind: EntityKind,
    read: Reader,
    write: Option<Setter>,
    pub metadata: Metadata,
}

impl Entity {
    pub fn new<F>(key: &str, kind: EntityKind, read: F) -> Self
    where
        F: Fn(&Snapshot) -> BridgeResult<Value> + Send + Sync + 'static,
    {
        Self {
            key: key.to_string(),
            kind,
            read: Box::new(read),
            write: None,
            metadata: Metadata::new(),
        }
    }

    pub fn writable(mut self, setter: Setter) -> Self {
        self.write = Some(setter);
        self
    }

    pub fn meta(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(name.to_string(), value.into());
        self
    }

    pub fn read(&self, snapshot: &Snapshot) -> BridgeResult<Value> {
        (self.read)(snapshot)
    }

    pub fn setter(&self) -> Option<Setter> {
        self.write
    }

    pub fn is_writable(&self) -> bool {
        self.write.is_some()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("write", &self.write)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Immutable set of entities, iterated in key order.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, Entity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity. Keys appear in topic names and must be unique.
    pub fn register(&mut self, entity: Entity) -> BridgeResult<()> {
        if entity.key.is_empty() || entity.key.contains(&['/', '+', '#'][..]) {
            return Err(BridgeError::Config(format!(
                "entity key '{}' is not usable in a topic",
                entity.key
            )));
        }
        if self.entities.contains_key(&entity.key) {
            return Err(BridgeError::Config(format!(
                "duplicate entity key '{}'",
                entity.key
            )));
        }
        self.entities.insert(entity.key.clone(), entity);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Entity> {
        self.entities.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
