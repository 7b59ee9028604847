use serde_json::Value;

use super::StatsRecord;
use crate::config::{AppConfig, StatField};

const VALUE_PLACEHOLDER: &str = "{value}";

/// Rendered in place of a stat the record does not contain.
pub const MISSING_VALUE: &str = "-";

/// Ordered, template-driven rendering of a stats record.
///
/// The output only depends on the field list, the separator and the record,
/// so the same stats always render to the same bytes.
#[derive(Clone, Debug)]
pub struct SummaryFormat {
    fields: Vec<StatField>,
    separator: String,
}

impl SummaryFormat {
    pub fn new(fields: Vec<StatField>, separator: impl Into<String>) -> Self {
        Self {
            fields,
            separator: separator.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.stats_fields.clone(), config.summary_separator.clone())
    }

    pub fn render(&self, stats: &StatsRecord) -> String {
        self.fields
            .iter()
            .filter(|field| field.enabled)
            .map(|field| {
                field
                    .template
                    .replace(VALUE_PLACEHOLDER, &render_value(stats, &field.key))
            })
            .collect::<Vec<_>>()
            .join(&self.separator)
    }
}

/// Numbers are truncated to integers; anything else is shown as-is.
fn render_value(stats: &StatsRecord, key: &str) -> String {
    if let Some(n) = stats.get_f64(key) {
        if n.is_finite() {
            return format!("{}", n.trunc() as i64);
        }
    }
    match stats.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => MISSING_VALUE.to_string(),
    }
}
