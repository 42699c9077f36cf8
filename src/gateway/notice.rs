use serde::Serialize;
use std::fmt;

/// Which tier a piece of data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Remote,
    Cache,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => f.write_str("remote"),
            Self::Cache => f.write_str("local cache"),
        }
    }
}

/// Non-blocking, user-facing status updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    WorkingOffline,
    PendingSync { value: i64 },
    Synced { version: u64 },
    Reconciled { version: u64 },
    /// Sent at most once per gateway.
    DurabilityDegraded { reason: String },
    DiscardedMalformed { source: Tier },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkingOffline => f.write_str("working offline"),
            Self::PendingSync { value } => write!(f, "saved {} locally, pending sync", value),
            Self::Synced { version } => write!(f, "synced (version {})", version),
            Self::Reconciled { version } => {
                write!(f, "reconciled with remote (version {})", version)
            }
            Self::DurabilityDegraded { reason } => {
                write!(f, "local saves are failing, changes may not survive a restart: {}", reason)
            }
            Self::DiscardedMalformed { source } => {
                write!(f, "discarded malformed data from {}", source)
            }
        }
    }
}
