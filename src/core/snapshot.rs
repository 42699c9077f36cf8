//! Snapshot types and their schema-checked JSON codec.
//!
//! Loaded bytes never become a partially trusted object: decoding yields a
//! fully validated snapshot or `StoreError::MalformedSnapshot`.

use super::error::{Result, StoreError};
use super::types::{Bounds, MutationKind};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable copy of a counter at a point in time.
///
/// Serialize only. Incoming JSON goes through `decode_snapshot` or
/// `snapshot_from_json`, which check bounds and accept naive timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueSnapshot {
    pub value: i64,
    pub timestamp: DateTime<Utc>,
    pub version: u64,
}

impl ValueSnapshot {
    pub fn new(value: i64, version: u64) -> Self {
        Self {
            value,
            timestamp: Utc::now(),
            version,
        }
    }

    /// Zero value, never persisted remotely.
    pub fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Same version, new value, fresh timestamp.
    pub fn with_value(&self, value: i64) -> Self {
        Self {
            value,
            timestamp: Utc::now(),
            version: self.version,
        }
    }

    pub fn validate(&self, bounds: &Bounds) -> Result<()> {
        bounds.check(self.value).map(|_| ()).map_err(|err| {
            StoreError::MalformedSnapshot(format!("value out of range: {}", err))
        })
    }
}

impl Default for ValueSnapshot {
    fn default() -> Self {
        Self::zero()
    }
}

/// Per-run usage statistics tracked next to the counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub operations_count: u64,
    pub increments: u64,
    pub decrements: u64,
    pub resets: u64,
}

impl SessionSnapshot {
    pub fn start() -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            start_time: now,
            last_activity: now,
            operations_count: 0,
            increments: 0,
            decrements: 0,
            resets: 0,
        }
    }

    pub fn record(&mut self, kind: MutationKind) {
        match kind {
            MutationKind::Increment => self.increments += 1,
            MutationKind::Decrement => self.decrements += 1,
            MutationKind::Reset => self.resets += 1,
        }
        self.operations_count += 1;
        self.last_activity = Utc::now();
    }
}

// Wire shapes. Timestamps stay strings here so that naive ISO-8601 values
// written by older clients can be accepted as UTC.

#[derive(Deserialize)]
struct WireValueSnapshot {
    value: i64,
    timestamp: String,
    version: u64,
}

#[derive(Deserialize)]
struct WireSessionSnapshot {
    session_id: String,
    start_time: String,
    last_activity: String,
    #[serde(default)]
    operations_count: u64,
    #[serde(default)]
    increments: u64,
    #[serde(default)]
    decrements: u64,
    #[serde(default)]
    resets: u64,
}

/// Parses RFC 3339 (`Z` or numeric offset) or a naive ISO-8601 timestamp taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|err| StoreError::MalformedSnapshot(format!("bad timestamp '{}': {}", raw, err)))
}

impl TryFrom<WireValueSnapshot> for ValueSnapshot {
    type Error = StoreError;

    fn try_from(wire: WireValueSnapshot) -> Result<Self> {
        Ok(Self {
            value: wire.value,
            timestamp: parse_timestamp(&wire.timestamp)?,
            version: wire.version,
        })
    }
}

impl TryFrom<WireSessionSnapshot> for SessionSnapshot {
    type Error = StoreError;

    fn try_from(wire: WireSessionSnapshot) -> Result<Self> {
        if wire.session_id.trim().is_empty() {
            return Err(StoreError::MalformedSnapshot(
                "session_id must not be empty".to_string(),
            ));
        }
        Ok(Self {
            session_id: wire.session_id,
            start_time: parse_timestamp(&wire.start_time)?,
            last_activity: parse_timestamp(&wire.last_activity)?,
            operations_count: wire.operations_count,
            increments: wire.increments,
            decrements: wire.decrements,
            resets: wire.resets,
        })
    }
}

/// Decodes and validates a counter snapshot from a JSON value.
pub fn snapshot_from_json(value: serde_json::Value, bounds: &Bounds) -> Result<ValueSnapshot> {
    let wire: WireValueSnapshot = serde_json::from_value(value)?;
    let snapshot = ValueSnapshot::try_from(wire)?;
    snapshot.validate(bounds)?;
    Ok(snapshot)
}

/// Decodes and validates a counter snapshot from raw JSON bytes.
pub fn decode_snapshot(bytes: &[u8], bounds: &Bounds) -> Result<ValueSnapshot> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    snapshot_from_json(value, bounds)
}

pub fn encode_snapshot(snapshot: &ValueSnapshot) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(snapshot)?)
}

pub fn session_from_json(value: serde_json::Value) -> Result<SessionSnapshot> {
    let wire: WireSessionSnapshot = serde_json::from_value(value)?;
    SessionSnapshot::try_from(wire)
}

pub fn decode_session(bytes: &[u8]) -> Result<SessionSnapshot> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    session_from_json(value)
}

pub fn encode_session(session: &SessionSnapshot) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(session)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_accepts_zulu_and_offset_timestamps() {
        let bounds = Bounds::default();
        let zulu = json!({"value": 5, "timestamp": "2024-03-01T10:00:00Z", "version": 2});
        let offset = json!({"value": 5, "timestamp": "2024-03-01T10:00:00+00:00", "version": 2});
        let a = snapshot_from_json(zulu, &bounds).unwrap();
        let b = snapshot_from_json(offset, &bounds).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.version, 2);
    }

    #[test]
    fn decode_accepts_naive_timestamp_as_utc() {
        let snapshot = snapshot_from_json(
            json!({"value": 1, "timestamp": "2024-03-01T10:00:00.123456", "version": 1}),
            &Bounds::default(),
        )
        .unwrap();
        assert_eq!(snapshot.timestamp.timestamp(), 1_709_287_200);
    }

    #[test]
    fn decode_rejects_out_of_bounds_value() {
        let raw = br#"{"value": 2000000, "timestamp": "2024-03-01T10:00:00Z", "version": 1}"#;
        let err = decode_snapshot(raw, &Bounds::default()).unwrap_err();
        assert!(matches!(err, StoreError::MalformedSnapshot(_)));
    }

    #[test]
    fn decode_rejects_non_numeric_version_and_bad_timestamp() {
        let bounds = Bounds::default();
        let bad_version =
            json!({"value": 1, "timestamp": "2024-03-01T10:00:00Z", "version": "three"});
        let negative_version =
            json!({"value": 1, "timestamp": "2024-03-01T10:00:00Z", "version": -1});
        let bad_timestamp = json!({"value": 1, "timestamp": "yesterday", "version": 1});
        let float_value = json!({"value": 1.5, "timestamp": "2024-03-01T10:00:00Z", "version": 1});

        for raw in [bad_version, negative_version, bad_timestamp, float_value] {
            assert!(matches!(
                snapshot_from_json(raw, &bounds),
                Err(StoreError::MalformedSnapshot(_))
            ));
        }
    }

    #[test]
    fn encoded_snapshot_is_revalidated_on_decode() {
        let wide = ValueSnapshot::new(50, 2);
        let bytes = encode_snapshot(&wide).unwrap();
        let narrow = Bounds::new(-3, 3).unwrap();
        assert!(matches!(
            decode_snapshot(&bytes, &narrow),
            Err(StoreError::MalformedSnapshot(_))
        ));
        assert_eq!(decode_snapshot(&bytes, &Bounds::default()).unwrap(), wide);
    }

    #[test]
    fn decode_rejects_garbage_bytes() {
        assert!(decode_snapshot(b"not json", &Bounds::default()).is_err());
        assert!(decode_snapshot(b"[1,2,3]", &Bounds::default()).is_err());
    }

    #[test]
    fn encoded_snapshot_is_readable_back() {
        let snapshot = ValueSnapshot::new(-42, 7);
        let bytes = encode_snapshot(&snapshot).unwrap();
        assert_eq!(decode_snapshot(&bytes, &Bounds::default()).unwrap(), snapshot);
    }

    #[test]
    fn session_record_counts_each_kind() {
        let mut session = SessionSnapshot::start();
        session.record(MutationKind::Increment);
        session.record(MutationKind::Increment);
        session.record(MutationKind::Reset);
        assert_eq!(session.operations_count, 3);
        assert_eq!(session.increments, 2);
        assert_eq!(session.decrements, 0);
        assert_eq!(session.resets, 1);
        assert!(session.last_activity >= session.start_time);
    }

    #[test]
    fn session_decode_requires_id() {
        let raw = json!({
            "session_id": " ",
            "start_time": "2024-03-01T10:00:00Z",
            "last_activity": "2024-03-01T10:00:00Z"
        });
        assert!(session_from_json(raw).is_err());
    }
}
