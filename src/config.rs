//! Application configuration.
//!
//! Loads settings from `config/config.json` next to the executable. Every
//! field carries a serde default so partial files keep working.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::capture::CaptureRegion;

/// One statistic in the rendered summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatField {
    /// Key in the statistics record returned by the stats server
    pub key: String,
    /// Format template; `{value}` is replaced by the rendered value
    pub template: String,
    /// Disabled fields stay in the list so their position is remembered
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl StatField {
    pub fn new(key: &str, template: &str, enabled: bool) -> Self {
        Self {
            key: key.to_string(),
            template: template.to_string(),
            enabled,
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the statistics server
    pub server_url: String,
    /// Bearer token for the statistics server
    pub token: String,
    /// API key for the analysis generator
    pub openai_api_key: String,
    /// Chat model used for analysis generation
    pub analysis_model: String,
    /// Poker room identifier sent with every stats lookup
    pub room: String,
    /// Nickname region, in pixels from the table window's top-left corner
    pub ocr_region: CaptureRegion,
    /// Click the nickname region before capturing it
    pub reveal_click: bool,
    /// Tesseract language(s) for the primary recognition pass
    pub primary_language: String,
    /// Tesseract language(s) for the secondary recognition pass
    pub secondary_language: String,
    /// Ordered summary fields
    pub stats_fields: Vec<StatField>,
    /// Separator placed between rendered summary fields
    pub summary_separator: String,
    /// Include the stats summary in the delivered text
    pub include_summary: bool,
    /// Include the generated analysis in the delivered text
    pub include_analysis: bool,
    /// Paste into the table chat instead of only copying to the clipboard
    pub paste_to_table: bool,
    /// How long a resolved nickname is trusted for a table (seconds)
    pub nick_cache_ttl_secs: u64,
    /// Maximum number of history records kept on disk
    pub max_history: usize,
    /// Stats server request timeout (seconds)
    pub stats_timeout_secs: u64,
    /// Analysis generator request timeout (seconds)
    pub analysis_timeout_secs: u64,
    /// Attempts made by the analysis generator before giving up
    pub analysis_max_attempts: u32,
    /// Wait between automatic sweep cycles (seconds)
    pub auto_check_interval_secs: u64,
    /// Pause between tables within one sweep cycle (milliseconds)
    pub table_pause_ms: u64,
    /// Window titles matching this pattern are treated as poker tables
    pub table_title_pattern: String,
    /// Save every nickname capture under `captures/` for debugging
    pub save_captures: bool,
}

fn default_true() -> bool {
    true
}

/// Stats the server knows about, in the default display order.
pub fn default_stat_fields() -> Vec<StatField> {
    vec![
        StatField::new("vpip", "VPIP:{value}", true),
        StatField::new("pfr", "PFR:{value}", true),
        StatField::new("three_bet", "3B:{value}", true),
        StatField::new("fold_to_3bet_pct", "F3B:{value}", true),
        StatField::new("wtsd", "WTSD:{value}", true),
        StatField::new("wsd", "WSD:{value}", true),
        StatField::new("cbet_flop", "CBF:{value}", true),
        StatField::new("cbet_turn", "CBT:{value}", true),
        StatField::new("fold_to_flop_cbet_pct", "FCBF:{value}", false),
        StatField::new("fold_to_turn_cbet_pct", "FCBT:{value}", false),
        StatField::new("limp_pct", "LIMP:{value}", false),
        StatField::new("limp_raise_pct", "LR:{value}", false),
        StatField::new("four_bet_preflop_pct", "4B:{value}", false),
        StatField::new("fold_to_4bet_pct", "F4B:{value}", false),
        StatField::new("probe_bet_turn_pct", "PROBE:{value}", false),
        StatField::new("bet_river_pct", "BR:{value}", false),
        StatField::new("fold_to_river_bet_pct", "FRB:{value}", false),
        StatField::new("overbet_turn_pct", "OBT:{value}", false),
        StatField::new("overbet_river_pct", "OBR:{value}", false),
        StatField::new("wsdwbr_pct", "WSDBR:{value}", false),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            token: String::new(),
            openai_api_key: String::new(),
            analysis_model: "gpt-3.5-turbo".to_string(),
            room: "XPK".to_string(),
            ocr_region: CaptureRegion {
                x: 95,
                y: 110,
                width: 95,
                height: 22,
            },
            reveal_click: true,
            primary_language: "eng".to_string(),
            secondary_language: "chi_sim+jpn+kor".to_string(),
            stats_fields: default_stat_fields(),
            summary_separator: " ".to_string(),
            include_summary: true,
            include_analysis: true,
            paste_to_table: true,
            nick_cache_ttl_secs: 60,
            max_history: 100,
            stats_timeout_secs: 10,
            analysis_timeout_secs: 30,
            analysis_max_attempts: 3,
            auto_check_interval_secs: 30,
            table_pause_ms: 1000,
            table_title_pattern: r"\d+ *\/ *\d+|\d+bb".to_string(),
            save_captures: false,
        }
    }
}

impl AppConfig {
    pub fn nick_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.nick_cache_ttl_secs)
    }

    pub fn stats_timeout(&self) -> Duration {
        Duration::from_secs(self.stats_timeout_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }
}

/// Loads configuration from `path`, or returns defaults.
///
/// A missing or unparsable file is logged and replaced by the defaults; it is
/// never a startup failure.
pub fn load_config(path: &Path) -> AppConfig {
    log::info!("Looking for config at: {}", path.display());

    if !path.exists() {
        log::info!("config.json not found. Using default config.");
        return AppConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                log::info!("Config loaded from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to parse config.json: {}. Using defaults.", e);
                AppConfig::default()
            }
        },
        Err(e) => {
            log::warn!("Failed to read config.json: {}. Using defaults.", e);
            AppConfig::default()
        }
    }
}

/// Writes the configuration as pretty-printed JSON.
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let serialized = serde_json::to_string_pretty(config)?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write config to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("config.json"));
        assert_eq!(config.room, "XPK");
        assert_eq!(config.nick_cache_ttl_secs, 60);
        assert_eq!(config.max_history, 100);
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "room": "PS", "include_analysis": false }"#).unwrap();

        let config = load_config(&path);
        assert_eq!(config.room, "PS");
        assert!(!config.include_analysis);
        assert!(config.include_summary);
        assert_eq!(config.stats_fields, default_stat_fields());
    }

    #[test]
    fn test_invalid_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = load_config(&path);
        assert_eq!(config.server_url, "http://localhost:3000");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.token = "secret".to_string();
        config.stats_fields.truncate(2);
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path);
        assert_eq!(loaded.token, "secret");
        assert_eq!(loaded.stats_fields.len(), 2);
    }

    #[test]
    fn test_stat_field_enabled_defaults_to_true() {
        let field: StatField =
            serde_json::from_str(r#"{ "key": "vpip", "template": "V{value}" }"#).unwrap();
        assert!(field.enabled);
    }
}
