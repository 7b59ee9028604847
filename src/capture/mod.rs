//! Table surfaces and the capture capability the pipeline consumes.
//!
//! This module provides:
//! - `TableSurface`, the identity of one table window
//! - `SurfaceCapture`, region capture plus the reveal click before a capture
//! - `TableFinder`, discovery of open tables for the automatic sweep
//! - Windows implementations of all of the above (`window`, `region`)

#[cfg(windows)]
pub mod region;
#[cfg(windows)]
pub mod window;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use image::RgbaImage;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Opaque identity of one capture target (a window handle on Windows).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableSurface(pub isize);

impl fmt::Display for TableSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl FromStr for TableSurface {
    type Err = anyhow::Error;

    /// Accepts decimal (`1234`) or hex (`0x4D2`) handles.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => isize::from_str_radix(hex, 16),
            None => s.parse::<isize>(),
        }
        .with_context(|| format!("Invalid window handle: {}", s))?;
        Ok(TableSurface(value))
    }
}

/// A rectangle in window pixels, measured from the window's top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl CaptureRegion {
    /// Point inside the region used for the reveal click.
    pub fn click_point(&self) -> (i32, i32) {
        (self.x + 10.min(self.width / 2), self.y + 10.min(self.height / 2))
    }
}

/// An open table window.
#[derive(Clone, Debug, PartialEq)]
pub struct TableInfo {
    pub surface: TableSurface,
    pub title: String,
}

/// Captures pixels from a table surface.
pub trait SurfaceCapture: Send + Sync {
    /// Captures `region` of `surface` without interacting with it.
    fn capture(&self, surface: TableSurface, region: &CaptureRegion) -> Result<RgbaImage>;

    /// Issues the interaction that makes the table display the player's
    /// nickname in `region` (a click on the seat).
    fn reveal(&self, surface: TableSurface, region: &CaptureRegion) -> Result<()>;
}

/// Lists the table surfaces currently open.
pub trait TableFinder: Send + Sync {
    fn find_tables(&self) -> Result<Vec<TableInfo>>;
}

/// Returns true if a window title looks like a cash-game table ("0.25/0.50", "100bb").
pub fn is_poker_table(title: &str, pattern: &Regex) -> bool {
    pattern.is_match(&title.to_lowercase())
}

/// Saves a nickname capture as `captures/capture_HHMMSS.png` for debugging.
pub fn save_debug_capture(img: &RgbaImage) -> Result<PathBuf> {
    let path = crate::paths::get_captures_dir().join(format!(
        "capture_{}.png",
        Local::now().format("%H%M%S")
    ));
    img.save(&path)
        .with_context(|| format!("Failed to save capture to {}", path.display()))?;
    Ok(path)
}

/// Capture backend for platforms without window capture support.
///
/// Every call fails, so only runs with an explicit nickname can succeed.
pub struct UnsupportedCapture;

impl SurfaceCapture for UnsupportedCapture {
    fn capture(&self, surface: TableSurface, _region: &CaptureRegion) -> Result<RgbaImage> {
        Err(anyhow!(
            "Window capture is not supported on this platform (surface {})",
            surface
        ))
    }

    fn reveal(&self, _surface: TableSurface, _region: &CaptureRegion) -> Result<()> {
        Ok(())
    }
}

impl TableFinder for UnsupportedCapture {
    fn find_tables(&self) -> Result<Vec<TableInfo>> {
        Err(anyhow!("Table discovery is not supported on this platform"))
    }
}
