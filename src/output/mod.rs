//! Delivery of the composed analysis text.

#[cfg(windows)]
pub mod clipboard;

#[cfg(windows)]
pub use clipboard::ClipboardPasteSink;

use anyhow::Result;

use crate::capture::TableSurface;

/// Receives the text a pipeline run produced for a table.
pub trait OutputSink: Send + Sync {
    fn deliver(&self, surface: TableSurface, text: &str) -> Result<()>;
}

/// Prints the payload to stdout.
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn deliver(&self, surface: TableSurface, text: &str) -> Result<()> {
        println!("[{}]\n{}\n", surface, text);
        Ok(())
    }
}
