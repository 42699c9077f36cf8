use crate::core::{
    Bounds, Result, SessionSnapshot, StoreError, ValueSnapshot, parse_timestamp,
    session_from_json, snapshot_from_json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Current backup format version.
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// Portable copy of the counter and its session statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupDocument {
    pub counter: ValueSnapshot,
    pub session: SessionSnapshot,
    pub export_timestamp: DateTime<Utc>,
    pub version: u32,
}

impl BackupDocument {
    pub fn new(counter: ValueSnapshot, session: SessionSnapshot) -> Self {
        Self {
            counter,
            session,
            export_timestamp: Utc::now(),
            version: BACKUP_FORMAT_VERSION,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses and validates every part; nothing is returned half-checked.
    pub fn decode(raw: &str, bounds: &Bounds) -> Result<Self> {
        let mut root: Value = serde_json::from_str(raw)?;
        let object = root
            .as_object_mut()
            .ok_or_else(|| malformed("backup must be a JSON object"))?;

        let version = object
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| malformed("backup version missing or not a number"))?;
        if version == 0 || version > u64::from(BACKUP_FORMAT_VERSION) {
            return Err(malformed(&format!("unsupported backup version {}", version)));
        }

        let counter = object
            .remove("counter")
            .ok_or_else(|| malformed("backup has no counter"))?;
        let session = object
            .remove("session")
            .ok_or_else(|| malformed("backup has no session"))?;
        let export_timestamp = object
            .get("export_timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("backup has no export_timestamp"))?;

        Ok(Self {
            counter: snapshot_from_json(counter, bounds)?,
            session: session_from_json(session)?,
            export_timestamp: parse_timestamp(export_timestamp)?,
            version: BACKUP_FORMAT_VERSION,
        })
    }
}

fn malformed(reason: &str) -> StoreError {
    StoreError::MalformedSnapshot(reason.to_string())
}

/// `counter_backup_YYYYMMDD_HHMMSS.json`
pub fn backup_file_name(at: DateTime<Utc>) -> String {
    format!("counter_backup_{}.json", at.format("%Y%m%d_%H%M%S"))
}
