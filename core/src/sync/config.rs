//! Timing configuration for a synchronization client

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client timing knobs, in milliseconds
///
/// Missing fields fall back to their defaults, so a partial JSON object such
/// as `{"submit_delay_ms": 50}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Debounce between a local edit and submitting the queue head
    pub submit_delay_ms: u64,

    /// Retry interval while no outbound channel is available
    pub reconnect_backoff_ms: u64,

    /// A remote caret not re-announced within this window is not shown
    pub selection_timeout_ms: u64,

    /// How often our own caret is re-announced
    pub selection_heartbeat_ms: u64,

    /// Maximum number of undo levels (0 = unlimited)
    pub max_undo_levels: usize,
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn submit_delay(&self) -> Duration {
        Duration::from_millis(self.submit_delay_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn selection_timeout(&self) -> Duration {
        Duration::from_millis(self.selection_timeout_ms)
    }

    pub fn selection_heartbeat(&self) -> Duration {
        Duration::from_millis(self.selection_heartbeat_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            submit_delay_ms: 10,
            reconnect_backoff_ms: 100,
            selection_timeout_ms: crate::awareness::DEFAULT_TIMEOUT.as_millis() as u64,
            selection_heartbeat_ms: crate::awareness::HEARTBEAT_INTERVAL.as_millis() as u64,
            max_undo_levels: crate::ot::DEFAULT_MAX_LEVELS,
        }
    }
}
