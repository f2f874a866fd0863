/// Discovery topics live under this prefix.
pub const DISCOVERY_PREFIX: &str = "homeassistant";

/// Topic schema for one charger, rooted at `wallbox_<serial>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    serial: String,
    root: String,
}

impl Topics {
    pub fn new(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            root: format!("wallbox_{serial}"),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Base topic of an entity; discovery documents abbreviate it as `~`.
    pub fn entity_base(&self, key: &str) -> String {
        format!("{}/{}", self.root, key)
    }

    pub fn state(&self, key: &str) -> String {
        format!("{}/{}/state", self.root, key)
    }

    pub fn command(&self, key: &str) -> String {
        format!("{}/{}/set", self.root, key)
    }

    /// Single subscription covering every entity's command topic.
    pub fn command_filter(&self) -> String {
        format!("{}/+/set", self.root)
    }

    pub fn unique_id(&self, key: &str) -> String {
        format!("{}_{}", self.serial, key)
    }

    pub fn discovery(&self, component: &str, key: &str) -> String {
        format!(
            "{}/{}/{}/config",
            DISCOVERY_PREFIX,
            component,
            self.unique_id(key)
        )
    }

    /// Extract the entity key from a command topic.
    pub fn command_key<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let key = topic
            .strip_prefix(self.root.as_str())?
            .strip_prefix('/')?
            .strip_suffix("/set")?;
        if key.is_empty() || key.contains('/') {
            None
        } else {
            Some(key)
        }
    }
}
