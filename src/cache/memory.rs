use super::{LocalCache, validate_key};
use crate::core::{Result, StoreError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-process cache with write accounting and an injectable write failure.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    writes: Mutex<HashMap<String, usize>>,
    fail_writes: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `write` fail as if the device were full.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes to `key`.
    pub fn write_count(&self, key: &str) -> usize {
        self.writes
            .lock()
            .map(|writes| writes.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Stores bytes directly, bypassing accounting and fault injection.
    pub fn seed(&self, key: &str, bytes: &[u8]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), bytes.to_vec());
        }
    }
}

impl LocalCache for MemoryCache {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        validate_key(key)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::CacheWrite("storage full".to_string()));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::CacheWrite(e.to_string()))?;
        entries.insert(key.to_string(), bytes.to_vec());
        drop(entries);

        let mut writes = self
            .writes
            .lock()
            .map_err(|e| StoreError::CacheWrite(e.to_string()))?;
        *writes.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::CacheRead(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn erase(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::CacheWrite(e.to_string()))?;
        entries.remove(key);
        Ok(())
    }
}
