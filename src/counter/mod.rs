//! `AutoSaveCounter`: the store, the debounce scheduler and the gateway wired
//! together behind one handle.

mod backup;

pub use backup::{BACKUP_FORMAT_VERSION, BackupDocument, backup_file_name};

use crate::cache::LocalCache;
use crate::config::StoreConfig;
use crate::core::{MutationKind, Result, SessionSnapshot, ValueSnapshot};
use crate::gateway::{
    Connectivity, LoadSource, Notice, PersistOutcome, PersistenceGateway, ReconcileOutcome,
};
use crate::remote::RemoteApi;
use crate::scheduler::{DebounceScheduler, PersistAction};
use crate::store::ValueStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Runs on every closed quiet window: counter first, then the session.
struct CounterPersister {
    gateway: Arc<PersistenceGateway>,
    store: Arc<ValueStore>,
    last_outcome: watch::Sender<Option<PersistOutcome>>,
}

#[async_trait]
impl PersistAction<ValueSnapshot> for CounterPersister {
    async fn persist(&self, payload: ValueSnapshot) {
        if let Some(outcome) = self.gateway.persist_if_pending(payload).await {
            self.last_outcome.send_replace(Some(outcome));
        }
        self.gateway.persist_session(&self.store.session());
    }
}

/// A bounded counter that saves itself.
///
/// Mutations apply to memory at once; persistence runs after the input goes
/// quiet for `StoreConfig::quiet_period`.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tallystore::{AutoSaveCounter, Connectivity, FileCache, InMemoryRemote, StoreConfig};
///
/// # async fn demo() -> tallystore::Result<()> {
/// let config = StoreConfig::new();
/// let remote = Arc::new(InMemoryRemote::new(config.bounds));
/// let cache = Arc::new(FileCache::open("./data")?);
/// let counter = AutoSaveCounter::open(config, remote, cache, Connectivity::online()).await?;
///
/// counter.increment();
/// counter.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct AutoSaveCounter {
    config: StoreConfig,
    store: Arc<ValueStore>,
    gateway: Arc<PersistenceGateway>,
    scheduler: Option<DebounceScheduler<ValueSnapshot>>,
    watcher: Option<JoinHandle<()>>,
    last_outcome: watch::Receiver<Option<PersistOutcome>>,
    previous_session: Option<SessionSnapshot>,
    load_source: LoadSource,
}

impl AutoSaveCounter {
    /// Loads the last known state and starts a fresh session.
    pub async fn open(
        config: StoreConfig,
        remote: Arc<dyn RemoteApi>,
        cache: Arc<dyn LocalCache>,
        connectivity: Connectivity,
    ) -> Result<Self> {
        config.validate()?;
        let gateway = Arc::new(PersistenceGateway::new(
            config.clone(),
            remote,
            cache,
            connectivity,
        ));

        let loaded = gateway.load().await;
        let previous_session = gateway.load_session();
        let store = Arc::new(ValueStore::new(config.bounds, loaded.snapshot)?);
        gateway.bind_store(Arc::clone(&store));

        let (outcome_tx, last_outcome) = watch::channel(None);
        let persister = Arc::new(CounterPersister {
            gateway: Arc::clone(&gateway),
            store: Arc::clone(&store),
            last_outcome: outcome_tx,
        });
        let scheduler = DebounceScheduler::spawn(config.quiet_period, persister);
        let watcher = gateway.spawn_reconnect_watcher();

        info!(
            value = store.snapshot().value,
            version = store.snapshot().version,
            source = ?loaded.source,
            "counter opened"
        );

        Ok(Self {
            config,
            store,
            gateway,
            scheduler: Some(scheduler),
            watcher: Some(watcher),
            last_outcome,
            previous_session,
            load_source: loaded.source,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn current_snapshot(&self) -> ValueSnapshot {
        self.store.snapshot()
    }

    pub fn value(&self) -> i64 {
        self.store.snapshot().value
    }

    pub fn session(&self) -> SessionSnapshot {
        self.store.session()
    }

    /// Session statistics left in the cache by the previous run.
    pub fn previous_session(&self) -> Option<&SessionSnapshot> {
        self.previous_session.as_ref()
    }

    /// Where the startup state came from.
    pub fn load_source(&self) -> LoadSource {
        self.load_source
    }

    pub fn connectivity(&self) -> &Connectivity {
        self.gateway.connectivity()
    }

    pub fn is_pending_sync(&self) -> bool {
        self.gateway.is_pending_sync()
    }

    /// Outcome of the most recent persist, if one has run.
    pub fn last_outcome(&self) -> Option<PersistOutcome> {
        self.last_outcome.borrow().clone()
    }

    pub fn increment(&self) -> bool {
        self.mutate(MutationKind::Increment)
    }

    pub fn decrement(&self) -> bool {
        self.mutate(MutationKind::Decrement)
    }

    pub fn reset(&self) -> bool {
        self.mutate(MutationKind::Reset)
    }

    fn mutate(&self, kind: MutationKind) -> bool {
        match self.store.apply(kind) {
            Ok(snapshot) => {
                self.schedule(snapshot);
                true
            }
            Err(err) => {
                debug!(kind = %kind, error = %err, "mutation rejected");
                false
            }
        }
    }

    fn schedule(&self, snapshot: ValueSnapshot) {
        let Some(scheduler) = self.scheduler.as_ref() else {
            return;
        };
        self.gateway.mark_pending();
        if let Err(err) = scheduler.schedule(snapshot) {
            warn!(error = %err, "could not schedule persist");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ValueSnapshot> {
        self.store.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.gateway.notices()
    }

    /// Persists any pending change now and waits for it to settle.
    pub async fn flush(&self) -> Result<()> {
        match self.scheduler.as_ref() {
            Some(scheduler) => scheduler.flush().await,
            None => Ok(()),
        }
    }

    /// Runs reconciliation against the remote on demand.
    pub async fn sync_now(&self) -> ReconcileOutcome {
        if let Err(err) = self.flush().await {
            warn!(error = %err, "flush before sync failed");
        }
        self.gateway.reconcile().await
    }

    /// Backup of the current counter and session as pretty JSON.
    pub fn export_backup(&self) -> Result<String> {
        BackupDocument::new(self.store.snapshot(), self.store.session()).encode()
    }

    /// Restores a backup. Both parts are validated before anything changes.
    pub fn import_backup(&self, raw: &str) -> Result<()> {
        let document = BackupDocument::decode(raw, &self.config.bounds)?;
        let counter = document.counter.clone();
        self.store.load(document.counter)?;
        self.store.replace_session(document.session);
        info!(value = counter.value, "backup imported");
        self.schedule(counter);
        Ok(())
    }

    /// Flushes, then stops the scheduler and the reconnect watcher.
    pub async fn close(mut self) -> Result<()> {
        self.flush().await?;
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await?;
        }
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.gateway.persist_session(&self.store.session());
        debug!("counter closed");
        Ok(())
    }
}

impl Drop for AutoSaveCounter {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.cancel();
        }
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}
