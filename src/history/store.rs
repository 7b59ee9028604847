use anyhow::{anyhow, Context, Result};
use chrono::Local;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::record::HistoryRecord;

/// What `upsert` did with a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertResult {
    /// No record for the player existed; appended.
    Inserted,
    /// The player's record had a different summary; replaced in place.
    Replaced,
    /// The player's record already had this summary; nothing written.
    Unchanged,
}

/// JSON-file history of delivered analyses, capped at `max_records`.
///
/// Every read-modify-write runs under one writer lock, so concurrent
/// pipeline runs cannot lose each other's updates.
pub struct HistoryStore {
    path: PathBuf,
    max_records: usize,
    lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, max_records: usize) -> Self {
        Self {
            path: path.into(),
            max_records,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Loads all records, oldest first.
    ///
    /// Never fails: a file that cannot be read logs the error and loads as an
    /// empty history, leaving the file untouched.
    pub fn load(&self) -> Vec<HistoryRecord> {
        let _guard = self.lock();
        self.read_records().unwrap_or_else(|e| {
            log::error!("{:#}", e);
            Vec::new()
        })
    }

    /// Persists `records`, keeping only the newest `max_records`.
    pub fn save(&self, records: &[HistoryRecord]) -> Result<()> {
        let _guard = self.lock();
        self.write_records(records)
    }

    /// Inserts or refreshes the record for `record`'s player.
    pub fn upsert(&self, record: HistoryRecord) -> Result<UpsertResult> {
        self.upsert_returning(record).map(|(result, _)| result)
    }

    /// Like `upsert`, also returning the record as it now sits in history.
    ///
    /// For `Unchanged` that is the earlier record with its original timestamp.
    /// Fails without writing when the file cannot be read.
    pub fn upsert_returning(
        &self,
        record: HistoryRecord,
    ) -> Result<(UpsertResult, HistoryRecord)> {
        let _guard = self.lock();
        let mut records = self.read_records()?;

        let existing = records
            .iter()
            .rposition(|r| r.is_same_player(&record.identifier, &record.room));

        let (result, stored) = match existing {
            Some(i) if records[i].summary == record.summary => {
                log::debug!(
                    "History for '{}' ({}) unchanged",
                    record.identifier,
                    record.room
                );
                return Ok((UpsertResult::Unchanged, records.swap_remove(i)));
            }
            Some(i) => {
                let notes = records[i].notes.take();
                records[i] = HistoryRecord {
                    notes: record.notes.or(notes),
                    ..record
                };
                (UpsertResult::Replaced, records[i].clone())
            }
            None => {
                records.push(record.clone());
                (UpsertResult::Inserted, record)
            }
        };

        self.write_records(&records)?;
        Ok((result, stored))
    }

    pub fn clear_all(&self) -> Result<()> {
        let _guard = self.lock();
        self.write_records(&[])?;
        log::info!("History cleared");
        Ok(())
    }

    /// Stored analysis for exactly this player and summary, if any.
    pub fn find_existing(&self, identifier: &str, room: &str, summary: &str) -> Option<String> {
        self.load()
            .into_iter()
            .rev()
            .find(|r| {
                r.is_same_player(identifier, room)
                    && r.summary == summary
                    && !r.analysis.trim().is_empty()
            })
            .map(|r| r.analysis)
    }

    /// Sets the notes of the player's live record.
    ///
    /// Returns `false` when no record exists for the player.
    pub fn annotate(&self, identifier: &str, room: &str, notes: &str) -> Result<bool> {
        let _guard = self.lock();
        let mut records = self.read_records()?;

        let Some(record) = records
            .iter_mut()
            .rev()
            .find(|r| r.is_same_player(identifier, room))
        else {
            return Ok(false);
        };

        let notes = notes.trim();
        record.notes = if notes.is_empty() {
            None
        } else {
            Some(notes.to_string())
        };
        self.write_records(&records)?;
        Ok(true)
    }

    /// Records containing `text` (case-insensitive), newest first.
    /// An empty query returns everything.
    pub fn search(&self, text: &str) -> Vec<HistoryRecord> {
        let needle = text.trim().to_lowercase();
        self.load()
            .into_iter()
            .rev()
            .filter(|r| needle.is_empty() || r.matches(&needle))
            .collect()
    }

    /// Reads the file without taking the lock.
    ///
    /// A missing file is created empty. An empty file is an empty history.
    /// A file that is not a JSON array is backed up under a timestamped name
    /// and reset. Entries that do not parse as records are skipped; the file
    /// is then backed up and rewritten with the rest. Any other read error is
    /// returned and the file is left alone.
    fn read_records(&self) -> Result<Vec<HistoryRecord>> {
        if !self.path.exists() {
            log::info!("History file not found, creating {}", self.path.display());
            if let Err(e) = self.write_records(&[]) {
                log::error!("{:#}", e);
            }
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read history {}", self.path.display()))?;

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries = match serde_json::from_str::<Vec<Value>>(&contents) {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("History file is corrupt: {}", e);
                self.back_up_and_rewrite(&[]);
                return Ok(Vec::new());
            }
        };

        let total = entries.len();
        let records: Vec<HistoryRecord> = entries
            .into_iter()
            .enumerate()
            .filter_map(|(i, entry)| match serde_json::from_value(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("Skipping malformed history entry {}: {}", i, e);
                    None
                }
            })
            .collect();

        if records.len() < total {
            self.back_up_and_rewrite(&records);
        }
        Ok(records)
    }

    /// Copies the current file aside, then replaces it with `records`.
    /// The file is only rewritten once the backup exists.
    fn back_up_and_rewrite(&self, records: &[HistoryRecord]) {
        let backup = match backup_path(&self.path) {
            Ok(path) => path,
            Err(e) => {
                log::error!("{:#}", e);
                return;
            }
        };

        if let Err(e) = fs::copy(&self.path, &backup) {
            log::error!("Failed to back up history: {}", e);
            return;
        }
        log::warn!("History backed up to {}", backup.display());

        if let Err(e) = self.write_records(records) {
            log::error!("{:#}", e);
        }
    }

    /// Writes the newest `max_records` of `records` without taking the lock.
    fn write_records(&self, records: &[HistoryRecord]) -> Result<()> {
        let start = records.len().saturating_sub(self.max_records);
        let kept = &records[start..];

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let json = serde_json::to_string_pretty(kept)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.path)
            .map_err(|e| anyhow!("Failed to write history {}: {}", self.path.display(), e))?;

        log::debug!("History saved: {} record(s)", kept.len());
        Ok(())
    }
}

/// `<stem>_backup_YYYYmmdd_HHMMSS.json` next to `path`, with a counter
/// appended if that name is taken.
fn backup_path(path: &Path) -> Result<PathBuf> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("Invalid history path: {}", path.display()))?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S");

    let mut candidate = dir.join(format!("{}_backup_{}.json", stem, stamp));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}_backup_{}_{}.json", stem, stamp, n));
        n += 1;
    }
    Ok(candidate)
}
