use chrono::Local;
use serde::{Deserialize, Serialize};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One delivered analysis.
///
/// Field aliases accept history files written by older releases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Local time, `YYYY-MM-DD HH:MM:SS`
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, alias = "nick")]
    pub identifier: String,
    #[serde(default, alias = "sala")]
    pub room: String,
    #[serde(default, alias = "stats")]
    pub summary: String,
    #[serde(default, alias = "analisis")]
    pub analysis: String,
    #[serde(default, alias = "notas", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl HistoryRecord {
    /// Creates a record stamped with the current local time.
    pub fn new(identifier: &str, room: &str, summary: &str, analysis: &str) -> Self {
        Self {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            identifier: identifier.to_string(),
            room: room.to_string(),
            summary: summary.to_string(),
            analysis: analysis.to_string(),
            notes: None,
        }
    }

    pub fn is_same_player(&self, identifier: &str, room: &str) -> bool {
        self.identifier == identifier && self.room == room
    }

    /// Case-insensitive match against identifier, summary, analysis and notes.
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        [
            Some(self.identifier.as_str()),
            Some(self.summary.as_str()),
            Some(self.analysis.as_str()),
            self.notes.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
    }
}
