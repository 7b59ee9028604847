//! Written player analysis.
//!
//! This module provides:
//! - The `AnalysisPort` capability the pipeline calls on a dedup miss
//! - Prompt construction from a stats record (`prompt`)
//! - A chat-completion client with bounded retry (`client`)

pub mod client;
pub mod prompt;

pub use client::OpenAiAnalyzer;

use anyhow::Result;

use crate::stats::StatsRecord;

/// Generates a short written read on a player from their statistics.
pub trait AnalysisPort: Send + Sync {
    fn generate(&self, stats: &StatsRecord, display_name: &str) -> Result<String>;
}
