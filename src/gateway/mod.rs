//! Dual-tier persistence: a local cache that is always written, and a remote
//! system of record that is written when reachable.

mod connectivity;
mod notice;
mod probe;

pub use connectivity::Connectivity;
pub use notice::{Notice, Tier};
pub use probe::{ConnectivityProbe, spawn_connectivity_probe};

use crate::cache::LocalCache;
use crate::config::StoreConfig;
use crate::core::{
    Result, SessionSnapshot, StoreError, ValueSnapshot, decode_session, decode_snapshot,
    encode_session, encode_snapshot,
};
use crate::remote::RemoteApi;
use crate::store::ValueStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Why a snapshot only reached the local cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingReason {
    Offline,
    Remote(StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The remote accepted the write; carries the resulting in-memory state.
    Synced(ValueSnapshot),
    /// Saved locally only, pending sync.
    PendingSync {
        snapshot: ValueSnapshot,
        reason: PendingReason,
    },
}

impl PersistOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced(_))
    }

    pub fn snapshot(&self) -> &ValueSnapshot {
        match self {
            Self::Synced(snapshot) | Self::PendingSync { snapshot, .. } => snapshot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Remote,
    Cache,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub snapshot: ValueSnapshot,
    pub source: LoadSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Still offline; nothing attempted.
    Skipped,
    /// The remote snapshot replaced local state.
    RemoteAdopted(ValueSnapshot),
    /// Local edits were pending and have been pushed.
    LocalPushed(PersistOutcome),
    /// Nothing to do.
    UpToDate,
    /// The remote could not be read.
    Failed(StoreError),
}

pub struct PersistenceGateway {
    config: StoreConfig,
    remote: Arc<dyn RemoteApi>,
    cache: Arc<dyn LocalCache>,
    connectivity: Connectivity,
    store: OnceLock<Arc<ValueStore>>,
    notices: broadcast::Sender<Notice>,
    durability_warned: AtomicBool,
    pending_sync: AtomicBool,
    /// Serializes remote writes and reconciliation.
    write_lock: Mutex<()>,
}

impl PersistenceGateway {
    pub fn new(
        config: StoreConfig,
        remote: Arc<dyn RemoteApi>,
        cache: Arc<dyn LocalCache>,
        connectivity: Connectivity,
    ) -> Self {
        let (notices, _) = broadcast::channel(config.notice_capacity.max(1));
        Self {
            config,
            remote,
            cache,
            connectivity,
            store: OnceLock::new(),
            notices,
            durability_warned: AtomicBool::new(false),
            pending_sync: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }

    /// Attaches the store that remote results are applied to. Only the first call wins.
    pub fn bind_store(&self, store: Arc<ValueStore>) -> bool {
        self.store.set(store).is_ok()
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn remote(&self) -> &Arc<dyn RemoteApi> {
        &self.remote
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// True while some local state has not reached the remote.
    pub fn is_pending_sync(&self) -> bool {
        self.pending_sync.load(Ordering::SeqCst)
    }

    /// Records a local change that has been queued but not yet persisted.
    pub fn mark_pending(&self) {
        self.pending_sync.store(true, Ordering::SeqCst);
    }

    /// True once any local cache write has failed.
    pub fn is_durability_degraded(&self) -> bool {
        self.durability_warned.load(Ordering::SeqCst)
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    fn write_cache(&self, key: &str, encoded: Result<Vec<u8>>) -> bool {
        let result = encoded.and_then(|bytes| self.cache.write(key, &bytes));
        match result {
            Ok(()) => true,
            Err(err) => {
                if !self.durability_warned.swap(true, Ordering::SeqCst) {
                    warn!(key = %key, error = %err, "local cache write failed, durability degraded");
                    self.notify(Notice::DurabilityDegraded {
                        reason: err.to_string(),
                    });
                } else {
                    debug!(key = %key, error = %err, "local cache write failed again");
                }
                false
            }
        }
    }

    fn write_cached_snapshot(&self, snapshot: &ValueSnapshot) -> bool {
        self.write_cache(&self.config.counter_key, encode_snapshot(snapshot))
    }

    /// Reads the cached snapshot. Malformed data counts as absent.
    pub fn read_cached_snapshot(&self) -> Option<ValueSnapshot> {
        let bytes = match self.cache.read(&self.config.counter_key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "local cache read failed");
                return None;
            }
        };
        match decode_snapshot(&bytes, &self.config.bounds) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(error = %err, "discarding malformed cached snapshot");
                self.notify(Notice::DiscardedMalformed {
                    source: Tier::Cache,
                });
                None
            }
        }
    }

    /// Writes to the cache first, then to the remote when online. Never fails.
    pub async fn persist(&self, snapshot: ValueSnapshot) -> PersistOutcome {
        let _guard = self.write_lock.lock().await;
        self.persist_locked(snapshot).await
    }

    /// Like `persist`, but skips the write when nothing is pending any more.
    ///
    /// A reconciliation that adopted the remote while `snapshot` was queued
    /// clears the pending flag, which makes `snapshot` stale.
    pub async fn persist_if_pending(&self, snapshot: ValueSnapshot) -> Option<PersistOutcome> {
        let _guard = self.write_lock.lock().await;
        if !self.is_pending_sync() {
            debug!(value = snapshot.value, "queued snapshot superseded, skipping persist");
            return None;
        }
        Some(self.persist_locked(snapshot).await)
    }

    async fn persist_locked(&self, snapshot: ValueSnapshot) -> PersistOutcome {
        self.write_cached_snapshot(&snapshot);

        if !self.connectivity.is_online() {
            debug!(value = snapshot.value, "offline, skipping remote save");
            return self.pending(snapshot, PendingReason::Offline);
        }

        let saved = match timeout(self.config.remote_timeout, self.remote.save(&snapshot)).await {
            Ok(Ok(returned)) => returned
                .validate(&self.config.bounds)
                .map(|_| returned),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(StoreError::RemoteUnavailable(format!(
                "save timed out after {:?}",
                self.config.remote_timeout
            ))),
        };

        match saved {
            Ok(returned) => {
                let current = match self.store.get() {
                    Some(store) => store.adopt_persisted(&snapshot, &returned),
                    None => returned.clone(),
                };
                // If this write fails, memory stays authoritative for the run.
                self.write_cached_snapshot(&current);
                if current == returned {
                    self.pending_sync.store(false, Ordering::SeqCst);
                }
                debug!(value = current.value, version = current.version, "counter synced");
                self.notify(Notice::Synced {
                    version: current.version,
                });
                PersistOutcome::Synced(current)
            }
            Err(err) => {
                warn!(error = %err, value = snapshot.value, "remote save failed, kept local copy");
                self.pending(snapshot, PendingReason::Remote(err))
            }
        }
    }

    fn pending(&self, snapshot: ValueSnapshot, reason: PendingReason) -> PersistOutcome {
        self.pending_sync.store(true, Ordering::SeqCst);
        self.notify(Notice::PendingSync {
            value: snapshot.value,
        });
        PersistOutcome::PendingSync { snapshot, reason }
    }

    /// Remote read with per-attempt timeout and backoff between attempts.
    async fn fetch_remote(&self) -> Result<Option<ValueSnapshot>> {
        let policy = &self.config.read_retry;
        let attempts = policy.max_attempts.max(1);
        let mut last_err = StoreError::RemoteUnavailable("no attempt made".to_string());

        for attempt in 1..=attempts {
            match timeout(self.config.remote_timeout, self.remote.fetch_current()).await {
                Ok(Ok(Some(snapshot))) => {
                    // Implementations may check against other bounds, or not at all.
                    snapshot.validate(&self.config.bounds)?;
                    return Ok(Some(snapshot));
                }
                Ok(Ok(None)) => return Ok(None),
                Ok(Err(err @ StoreError::MalformedSnapshot(_))) => return Err(err),
                Ok(Err(err)) => last_err = err,
                Err(_) => {
                    last_err = StoreError::RemoteUnavailable(format!(
                        "fetch timed out after {:?}",
                        self.config.remote_timeout
                    ))
                }
            }
            if attempt < attempts {
                debug!(attempt, error = %last_err, "remote read failed, retrying");
                sleep(policy.backoff_after(attempt)).await;
            }
        }
        Err(last_err)
    }

    /// Remote first when online, then the cache, then the zero default.
    pub async fn load(&self) -> LoadOutcome {
        if self.connectivity.is_online() {
            match self.fetch_remote().await {
                Ok(Some(snapshot)) => {
                    self.write_cached_snapshot(&snapshot);
                    return LoadOutcome {
                        snapshot,
                        source: LoadSource::Remote,
                    };
                }
                Ok(None) => debug!("remote holds no counter yet"),
                Err(err @ StoreError::MalformedSnapshot(_)) => {
                    warn!(error = %err, "discarding malformed remote snapshot");
                    self.notify(Notice::DiscardedMalformed {
                        source: Tier::Remote,
                    });
                }
                Err(err) => {
                    warn!(error = %err, "remote load failed, falling back to local cache");
                    self.notify(Notice::WorkingOffline);
                }
            }
        }

        match self.read_cached_snapshot() {
            Some(snapshot) => {
                // Cached state may hold edits that never reached the remote.
                self.mark_pending();
                LoadOutcome {
                    snapshot,
                    source: LoadSource::Cache,
                }
            }
            None => LoadOutcome {
                snapshot: ValueSnapshot::zero(),
                source: LoadSource::Default,
            },
        }
    }

    fn local_snapshot(&self) -> Option<ValueSnapshot> {
        match self.store.get() {
            Some(store) => Some(store.snapshot()),
            None => self.read_cached_snapshot(),
        }
    }

    /// Resolves divergence after a connectivity gap.
    ///
    /// A strictly higher remote version always wins. On a version tie the
    /// remote wins only when no local edits are pending; pending local edits
    /// at an equal or lower remote version (or with an empty remote) are
    /// pushed instead. Holds the write lock, so it never overlaps `persist`.
    pub async fn reconcile(&self) -> ReconcileOutcome {
        if !self.connectivity.is_online() {
            return ReconcileOutcome::Skipped;
        }
        let _guard = self.write_lock.lock().await;

        let remote = match self.fetch_remote().await {
            Ok(remote) => remote,
            Err(err) => {
                if matches!(err, StoreError::MalformedSnapshot(_)) {
                    self.notify(Notice::DiscardedMalformed {
                        source: Tier::Remote,
                    });
                }
                warn!(error = %err, "reconciliation could not read remote");
                return ReconcileOutcome::Failed(err);
            }
        };
        let local = self.local_snapshot();
        let pending = self.is_pending_sync();

        match (remote, local) {
            (Some(remote), Some(local)) if remote == local && !pending => {
                ReconcileOutcome::UpToDate
            }
            (Some(remote), Some(local))
                if remote.version > local.version
                    || (remote.version == local.version && !pending) =>
            {
                self.adopt_remote(remote)
            }
            (Some(remote), None) => self.adopt_remote(remote),
            (_, Some(local)) if pending => {
                info!(value = local.value, version = local.version, "pushing pending local state");
                ReconcileOutcome::LocalPushed(self.persist_locked(local).await)
            }
            _ => ReconcileOutcome::UpToDate,
        }
    }

    fn adopt_remote(&self, remote: ValueSnapshot) -> ReconcileOutcome {
        if let Some(store) = self.store.get() {
            if let Err(err) = store.load(remote.clone()) {
                warn!(error = %err, "remote snapshot rejected by store");
                return ReconcileOutcome::Failed(err);
            }
        }
        self.write_cached_snapshot(&remote);
        self.pending_sync.store(false, Ordering::SeqCst);
        info!(value = remote.value, version = remote.version, "reconciled with remote");
        self.notify(Notice::Reconciled {
            version: remote.version,
        });
        ReconcileOutcome::RemoteAdopted(remote)
    }

    /// Runs `reconcile` on every offline to online transition.
    pub fn spawn_reconnect_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        let mut rx = self.connectivity.subscribe();
        tokio::spawn(async move {
            let mut was_online = *rx.borrow_and_update();
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if online && !was_online {
                    info!("connectivity restored, reconciling");
                    gateway.reconcile().await;
                } else if !online && was_online {
                    gateway.notify(Notice::WorkingOffline);
                }
                was_online = online;
            }
        })
    }

    /// Session statistics only live in the local tier.
    pub fn persist_session(&self, session: &SessionSnapshot) -> bool {
        self.write_cache(&self.config.session_key, encode_session(session))
    }

    pub fn load_session(&self) -> Option<SessionSnapshot> {
        match self.cache.read(&self.config.session_key) {
            Ok(Some(bytes)) => match decode_session(&bytes) {
                Ok(session) => Some(session),
                Err(err) => {
                    warn!(error = %err, "discarding malformed cached session");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "local cache read failed");
                None
            }
        }
    }
}
