//! Persisted analysis history.
//!
//! `HistoryStore` owns the JSON file under `config/`. It doubles as the
//! analysis dedup layer: `find_existing` returns a stored analysis when the
//! player's rendered summary has not changed since it was generated.

pub mod record;
pub mod store;

pub use record::HistoryRecord;
pub use store::{HistoryStore, UpsertResult};
