//! Charger status normalization.
//!
//! The charger reports a coarse status code (`tms.charger_status`) and a
//! fine-grained session state-machine code (`session.state`). Some session
//! states are reflected by the coarse code only after a delay, so an override
//! table maps those session states to the coarse code that should be shown.

use crate::error::{BridgeError, BridgeResult};
use std::collections::BTreeMap;

pub const STATUS_READY: i64 = 0;
pub const STATUS_LOCKED: i64 = 6;

/// Session state while the charger waits for the user to unlock it.
pub const SESSION_WAIT_UNLOCK: i64 = 210;

const STATUS_NAMES: [&str; 19] = [
    "Ready",
    "Charging",
    "Connected waiting car",
    "Connected waiting schedule",
    "Paused",
    "Schedule end",
    "Locked",
    "Error",
    "Connected waiting current assignation",
    "Unconfigured power sharing",
    "Queue by power boost",
    "Discharging",
    "Connected waiting admin auth for mid",
    "Connected mid safety margin exceeded",
    "OCPP unavailable",
    "OCPP charge finishing",
    "OCPP reserved",
    "Updating",
    "Queue by eco smart",
];

/// Maps raw status codes to display names.
#[derive(Debug, Clone)]
pub struct StatusNormalizer {
    /// session state code -> coarse status code
    overrides: BTreeMap<i64, i64>,
    /// coarse status code -> display name
    names: BTreeMap<i64, String>,
}

impl StatusNormalizer {
    pub fn new(overrides: BTreeMap<i64, i64>, names: BTreeMap<i64, String>) -> Self {
        Self { overrides, names }
    }

    /// Resolve the coarse code that should be displayed.
    pub fn effective_code(&self, charger_status: i64, session_state: Option<i64>) -> i64 {
        session_state
            .and_then(|state| self.overrides.get(&state).copied())
            .unwrap_or(charger_status)
    }

    /// Display name for the charger's current status.
    pub fn normalize(&self, charger_status: i64, session_state: Option<i64>) -> BridgeResult<&str> {
        let code = self.effective_code(charger_status, session_state);
        self.names
            .get(&code)
            .map(String::as_str)
            .ok_or(BridgeError::UnknownStatusCode(code))
    }
}

impl Default for StatusNormalizer {
    fn default() -> Self {
        let names = STATUS_NAMES
            .iter()
            .enumerate()
            .map(|(code, name)| (code as i64, name.to_string()))
            .collect();

        let mut overrides = BTreeMap::new();
        overrides.insert(SESSION_WAIT_UNLOCK, STATUS_LOCKED);

        Self::new(overrides, names)
    }
}
