use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Value {attempted} is outside bounds [{min}, {max}]")]
    BoundsViolation { attempted: i64, min: i64, max: i64 },

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Local cache write failed: {0}")]
    CacheWrite(String),

    #[error("Local cache read failed: {0}")]
    CacheRead(String),

    #[error("Invalid cache key '{0}'")]
    InvalidKey(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Debounce scheduler is closed")]
    SchedulerClosed,
}

impl StoreError {
    /// True for failures of the remote tier, which always fall back to the cache.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedSnapshot(err.to_string())
    }
}
