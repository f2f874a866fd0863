// Error taxonomy
pub mod error;

// TOML configuration
pub mod config;

// Charger stores, snapshot model and command channel
pub mod device;

// Status code normalization
pub mod status;

// Entity registry and catalogue
pub mod entity;

// Delta rate limiting
pub mod rate_limit;

// Change gate and shared engine state
pub mod state;

// MQTT transport and topic schema
pub mod mqtt;

// Discovery documents
pub mod discovery;

// Poll-detect-publish loop
pub mod sync;

// Inbound command dispatch
pub mod command;

// Startup and shutdown
pub mod bridge;

#[cfg(test)]
mod test_support;
