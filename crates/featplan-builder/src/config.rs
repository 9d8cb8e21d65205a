//! Session configuration that callers can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Keep the internal event-time column on the table returned by
    /// `build`. Off by default; useful when debugging temporal plans.
    pub keep_event_time: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            keep_event_time: false,
        }
    }
}
