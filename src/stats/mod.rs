//! Player statistics: the record returned by the stats server, the port the
//! pipeline fetches through, and the deterministic summary rendering used as
//! the analysis dedup key.

pub mod client;
pub mod summary;

pub use client::HttpStatsClient;
pub use summary::SummaryFormat;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Statistics for one player, keyed by the server's field names.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsRecord(pub Map<String, Value>);

impl StatsRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Numeric value of `key`; numeric strings ("24.5") count as numbers.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Value of `key` as display text, without JSON quoting.
    pub fn get_text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Value> for StatsRecord {
    /// Non-object values become an empty record.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => StatsRecord(map),
            _ => StatsRecord::default(),
        }
    }
}

/// Fetches statistics for a player in a room.
pub trait StatsPort: Send + Sync {
    fn fetch_stats(&self, identifier: &str, room: &str) -> Result<StatsRecord>;
}
