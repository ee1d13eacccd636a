//! Flow configuration.
//!
//! All fields carry serde defaults, so an absent file or an entirely
//! unconfigured environment produces working settings. A malformed file or an
//! environment variable that cannot be coerced to the right type is a hard
//! error: it indicates deliberate-but-broken operator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

fn default_flow_inactivity_timeout_secs() -> u64 {
    120
}

fn default_receive_wait_ms() -> u64 {
    500
}

fn default_transport_window() -> u32 {
    1
}

fn default_browse_inactivity_timeout_secs() -> u64 {
    60
}

fn default_closed_retention_secs() -> u64 {
    300
}

/// Tunable values for flow lifecycle behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSettings {
    /// Idle seconds before a consumer flow is closed
    #[serde(default = "default_flow_inactivity_timeout_secs")]
    pub flow_inactivity_timeout_secs: u64,

    /// Maximum milliseconds a single pull waits for a message. Independent
    /// of the inactivity timeout.
    #[serde(default = "default_receive_wait_ms")]
    pub receive_wait_ms: u64,

    /// Maximum unacknowledged deliveries outstanding per consumer. The
    /// default of 1 trades throughput for deterministic one-message-at-a-time
    /// polling, which fits a pull-per-request transport.
    #[serde(default = "default_transport_window")]
    pub transport_window: u32,

    /// Idle seconds before a browse flow is closed
    #[serde(default = "default_browse_inactivity_timeout_secs")]
    pub browse_inactivity_timeout_secs: u64,

    /// Seconds a closed flow stays queryable by id before being purged.
    /// During this window stale callers get a precise "closed" reply instead
    /// of "unknown flow".
    #[serde(default = "default_closed_retention_secs")]
    pub closed_retention_secs: u64,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            flow_inactivity_timeout_secs: default_flow_inactivity_timeout_secs(),
            receive_wait_ms: default_receive_wait_ms(),
            transport_window: default_transport_window(),
            browse_inactivity_timeout_secs: default_browse_inactivity_timeout_secs(),
            closed_retention_secs: default_closed_retention_secs(),
        }
    }
}

impl FlowSettings {
    /// Inactivity window for consumer flows
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.flow_inactivity_timeout_secs)
    }

    /// Bounded wait for a single pull
    pub fn receive_wait(&self) -> Duration {
        Duration::from_millis(self.receive_wait_ms)
    }

    /// Inactivity window for browse flows
    pub fn browse_inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.browse_inactivity_timeout_secs)
    }

    /// Retention window for closed flows
    pub fn closed_retention(&self) -> Duration {
        Duration::from_secs(self.closed_retention_secs)
    }

    /// Load settings from files and environment.
    ///
    /// Sources (applied in order — later sources override earlier ones):
    ///  1. ./restq.toml                      — deployment-local file
    ///  2. Path given by RESTQ_CONFIG_FILE   — operator-specified file
    ///  3. Environment variables prefixed RESTQ__ (double-underscore
    ///     separator), e.g. RESTQ__RECEIVE_WAIT_MS=250
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder().add_source(
            config::File::with_name("restq")
                .required(false)
                .format(config::FileFormat::Toml),
        );

        if let Ok(explicit_path) = std::env::var("RESTQ_CONFIG_FILE") {
            if !explicit_path.is_empty() {
                builder = builder.add_source(
                    config::File::with_name(&explicit_path)
                        .required(true)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        builder
            .add_source(config::Environment::with_prefix("RESTQ").separator("__"))
            .build()?
            .try_deserialize()
    }
}
