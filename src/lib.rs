// ============================================================================
// TallyStore Library
// ============================================================================

pub mod cache;
pub mod config;
pub mod core;
pub mod counter;
pub mod gateway;
pub mod remote;
pub mod scheduler;
pub mod store;

// Re-export main types for convenience
pub use crate::core::{Bounds, MutationKind, Result, SessionSnapshot, StoreError, ValueSnapshot};
pub use config::{RetryPolicy, StoreConfig};
pub use counter::{AutoSaveCounter, BackupDocument, backup_file_name};
pub use store::ValueStore;
pub use scheduler::{DebounceScheduler, PersistAction, ScheduleHandle};

// Re-export persistence tiers
pub use cache::{FileCache, LocalCache, MemoryCache};
pub use remote::{HttpRemote, InMemoryRemote, RemoteApi};
pub use gateway::{
    Connectivity,
    ConnectivityProbe,
    LoadOutcome,
    LoadSource,
    Notice,
    PendingReason,
    PersistOutcome,
    PersistenceGateway,
    ReconcileOutcome,
    spawn_connectivity_probe,
};
