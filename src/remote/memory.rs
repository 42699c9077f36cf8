use super::RemoteApi;
use crate::core::{Bounds, MutationKind, Result, StoreError, ValueSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// In-process system of record with switchable failures and call accounting.
///
/// Every successful `save` or `mutate` bumps the stored version by one.
#[derive(Debug)]
pub struct InMemoryRemote {
    bounds: Bounds,
    current: Mutex<Option<ValueSnapshot>>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    fetches: AtomicUsize,
    saves: AtomicUsize,
    mutations: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            current: Mutex::new(None),
            failing: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            fetches: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
            mutations: AtomicUsize::new(0),
        }
    }

    pub fn with_snapshot(bounds: Bounds, snapshot: ValueSnapshot) -> Self {
        let remote = Self::new(bounds);
        remote.set_current(Some(snapshot));
        remote
    }

    /// Replaces the stored snapshot, as another client writing would.
    pub fn set_current(&self, snapshot: Option<ValueSnapshot>) {
        if let Ok(mut current) = self.current.lock() {
            *current = snapshot;
        }
    }

    pub fn current(&self) -> Option<ValueSnapshot> {
        self.current.lock().ok().and_then(|current| current.clone())
    }

    /// Every call fails with `RemoteUnavailable` while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Latency added before every call.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn mutate_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Total calls of every kind except `health`.
    pub fn call_count(&self) -> usize {
        self.fetch_count() + self.save_count() + self.mutate_count()
    }

    async fn enter(&self) -> Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::RemoteUnavailable(
                "in-memory remote is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn store_next(&self, value: i64, timestamp: chrono::DateTime<Utc>) -> Result<ValueSnapshot> {
        self.bounds.check(value)?;
        let mut current = self
            .current
            .lock()
            .map_err(|e| StoreError::RemoteUnavailable(e.to_string()))?;
        let version = current.as_ref().map(|c| c.version).unwrap_or(0) + 1;
        let next = ValueSnapshot {
            value,
            timestamp,
            version,
        };
        *current = Some(next.clone());
        Ok(next)
    }
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn fetch_current(&self) -> Result<Option<ValueSnapshot>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        Ok(self.current())
    }

    async fn save(&self, snapshot: &ValueSnapshot) -> Result<ValueSnapshot> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.store_next(snapshot.value, snapshot.timestamp)
    }

    async fn mutate(&self, kind: MutationKind) -> Result<ValueSnapshot> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        let value = self.current().map(|c| c.value).unwrap_or(0);
        let next = match kind {
            MutationKind::Increment => value.saturating_add(1),
            MutationKind::Decrement => value.saturating_sub(1),
            MutationKind::Reset => 0,
        };
        self.store_next(next, Utc::now())
    }

    async fn health(&self) -> Result<()> {
        self.enter().await
    }
}
