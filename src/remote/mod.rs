//! Remote system of record.

mod http;
mod memory;

pub use http::HttpRemote;
pub use memory::InMemoryRemote;

use crate::core::{MutationKind, Result, ValueSnapshot};
use async_trait::async_trait;

/// Contract of the remote counter API.
///
/// Each write has its own side effect, so callers must not retry `save` or
/// `mutate`. Only `fetch_current` is safe to repeat.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// `Ok(None)` when the remote holds no counter yet.
    async fn fetch_current(&self) -> Result<Option<ValueSnapshot>>;

    /// Stores `snapshot` and returns the remote copy with its assigned version.
    async fn save(&self, snapshot: &ValueSnapshot) -> Result<ValueSnapshot>;

    async fn mutate(&self, kind: MutationKind) -> Result<ValueSnapshot>;

    async fn health(&self) -> Result<()>;
}
