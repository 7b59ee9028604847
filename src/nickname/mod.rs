//! Player nickname resolution.
//!
//! `NicknameResolver` turns a table surface into the nickname of the player
//! shown in the configured seat region; `NicknameCache` keeps the last result
//! per surface so repeated requests skip recognition.

pub mod cache;
pub mod resolver;

pub use cache::{NicknameCache, NicknameCacheEntry};
pub use resolver::{NicknameResolver, ResolveError};
