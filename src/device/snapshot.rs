use crate::error::{BridgeError, BridgeResult};
use crate::status::{STATUS_LOCKED, STATUS_READY};
use std::collections::HashMap;

/// Redis hash holding the session state machine.
pub const STATE_HASH: &str = "state";

/// Redis hash holding the meter-to-wallbox (TMS) readings.
pub const METER_HASH: &str = "m2w";

/// One row of charger configuration and session totals from the relational store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigRow {
    pub lock: i64,
    pub charging_enable: i64,
    pub max_charging_current: i64,
    pub halo_brightness: i64,
    pub cumulative_added_energy: f64,
    pub added_range: f64,
}

/// Session state-machine fields from the `state` hash.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Fine-grained state-machine code (`session.state`)
    pub session_state: i64,
    pub control_pilot: i64,
    pub s2_open: i64,
    /// Energy added in the current session, Wh
    pub schedule_energy: f64,
}

impl SessionState {
    pub fn from_hash(hash: &HashMap<String, String>) -> BridgeResult<Self> {
        Ok(Self {
            session_state: int_field(hash, STATE_HASH, "session.state")?,
            control_pilot: int_field(hash, STATE_HASH, "ctrlPilot")?,
            s2_open: int_field(hash, STATE_HASH, "S2open")?,
            schedule_energy: float_field(hash, STATE_HASH, "scheduleEnergy")?,
        })
    }
}

/// Meter readings from the `m2w` hash.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterState {
    /// Coarse charger status code (`tms.charger_status`)
    pub charger_status: i64,
    pub line1_power: f64,
    pub line2_power: f64,
    pub line3_power: f64,
}

impl MeterState {
    pub fn from_hash(hash: &HashMap<String, String>) -> BridgeResult<Self> {
        Ok(Self {
            charger_status: int_field(hash, METER_HASH, "tms.charger_status")?,
            line1_power: float_field(hash, METER_HASH, "tms.line1.power_watt.value")?,
            line2_power: float_field(hash, METER_HASH, "tms.line2.power_watt.value")?,
            line3_power: float_field(hash, METER_HASH, "tms.line3.power_watt.value")?,
        })
    }
}

/// All fields read from the device in one pull. Replaced wholesale on every
/// poll, never patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub config: ConfigRow,
    pub state: SessionState,
    pub meter: MeterState,
}

impl Snapshot {
    /// Total power over all three lines, W
    pub fn charging_power(&self) -> f64 {
        self.meter.line1_power + self.meter.line2_power + self.meter.line3_power
    }

    /// The charger reports Ready or Locked whenever no cable is plugged in.
    pub fn cable_connected(&self) -> bool {
        !matches!(self.meter.charger_status, STATUS_READY | STATUS_LOCKED)
    }
}

fn raw_field<'a>(
    hash: &'a HashMap<String, String>,
    source: &str,
    name: &str,
) -> BridgeResult<&'a str> {
    hash.get(name).map(|v| v.trim()).ok_or_else(|| {
        BridgeError::SnapshotUnavailable(format!("{source}: missing field '{name}'"))
    })
}

fn invalid(source: &str, name: &str, raw: &str, expected: &str) -> BridgeError {
    BridgeError::SnapshotUnavailable(format!(
        "{source}: field '{name}' is not {expected}: '{raw}'"
    ))
}

/// Parse a finite float. `f64::from_str` also accepts "nan" and "inf".
fn parse_finite(raw: &str, source: &str, name: &str) -> BridgeResult<f64> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(invalid(source, name, raw, "a finite number")),
    }
}

fn int_field(hash: &HashMap<String, String>, source: &str, name: &str) -> BridgeResult<i64> {
    let raw = raw_field(hash, source, name)?;
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(value);
    }
    // Some firmware versions write integral fields as "1.0"
    let value = parse_finite(raw, source, name)?;
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Ok(value as i64)
    } else {
        Err(invalid(source, name, raw, "an integer"))
    }
}

fn float_field(hash: &HashMap<String, String>, source: &str, name: &str) -> BridgeResult<f64> {
    let raw = raw_field(hash, source, name)?;
    parse_finite(raw, source, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_session_state_from_hash() {
        let state = SessionState::from_hash(&hash(&[
            ("session.state", "194"),
            ("ctrlPilot", "3"),
            ("S2open", "0"),
            ("scheduleEnergy", "1523.75"),
            ("unrelated", "x"),
        ]))
        .unwrap();
        assert_eq!(state.session_state, 194);
        assert_eq!(state.control_pilot, 3);
        assert_eq!(state.schedule_energy, 1523.75);
    }

    #[test]
    fn test_integral_float_accepted_for_int_field() {
        let meter = MeterState::from_hash(&hash(&[
            ("tms.charger_status", "1.0"),
            ("tms.line1.power_watt.value", "3680"),
            ("tms.line2.power_watt.value", "0"),
            ("tms.line3.power_watt.value", "0.5"),
        ]))
        .unwrap();
        assert_eq!(meter.charger_status, 1);
        assert_eq!(meter.line3_power, 0.5);
    }

    #[test]
    fn test_missing_field_fails_whole_hash() {
        let err = MeterState::from_hash(&hash(&[("tms.charger_status", "1")])).unwrap_err();
        assert!(matches!(err, BridgeError::SnapshotUnavailable(_)));
        assert!(err.to_string().contains("tms.line1.power_watt.value"));
    }

    #[test]
    fn test_garbage_field_fails() {
        let err = SessionState::from_hash(&hash(&[
            ("session.state", "1.5"),
            ("ctrlPilot", "3"),
            ("S2open", "0"),
            ("scheduleEnergy", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BridgeError::SnapshotUnavailable(_)));
    }

    #[test]
    fn test_derived_fields() {
        let mut snapshot = Snapshot::default();
        snapshot.meter.line1_power = 1200.0;
        snapshot.meter.line2_power = 1100.5;
        snapshot.meter.line3_power = 1000.0;
        assert_eq!(snapshot.charging_power(), 3300.5);

        for (status, connected) in [(0, false), (6, false), (1, true), (2, true), (4, true)] {
            snapshot.meter.charger_status = status;
            assert_eq!(snapshot.cable_connected(), connected, "status {status}");
        }
    }

    #[test]
    fn test_non_finite_readings_rejected() {
        for raw in ["nan", "NaN", "inf", "-infinity"] {
            let err = MeterState::from_hash(&hash(&[
                ("tms.charger_status", "1"),
                ("tms.line1.power_watt.value", raw),
                ("tms.line2.power_watt.value", "0"),
                ("tms.line3.power_watt.value", "0"),
            ]))
            .unwrap_err();
            assert!(matches!(err, BridgeError::SnapshotUnavailable(_)), "{raw}");
        }
    }

    #[test]
    fn test_out_of_range_integer_rejected() {
        for raw in ["1e30", "-1e30", "9223372036854775808.0", "nan"] {
            let err = SessionState::from_hash(&hash(&[
                ("session.state", raw),
                ("ctrlPilot", "3"),
                ("S2open", "0"),
                ("scheduleEnergy", "0"),
            ]))
            .unwrap_err();
            assert!(matches!(err, BridgeError::SnapshotUnavailable(_)), "{raw}");
        }

        let state = SessionState::from_hash(&hash(&[
            ("session.state", "-2.0"),
            ("ctrlPilot", "1e3"),
            ("S2open", "0"),
            ("scheduleEnergy", "0"),
        ]))
        .unwrap();
        assert_eq!(state.session_state, -2);
        assert_eq!(state.control_pilot, 1000);
    }
}
