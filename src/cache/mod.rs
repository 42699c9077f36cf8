//! Local durable tier: a small synchronous key-value contract.

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use crate::core::{Result, StoreError};

/// Fast, always-available key-value storage for serialized snapshots.
///
/// Implementations own their synchronization; callers share them behind `Arc`.
pub trait LocalCache: Send + Sync {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// `Ok(None)` when nothing is stored under `key`.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Removing a missing key is not an error.
    fn erase(&self, key: &str) -> Result<()>;
}

/// Keys become file names, so only `[A-Za-z0-9_-]` is allowed.
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
