pub mod error;
pub mod snapshot;
pub mod types;

pub use error::{Result, StoreError};
pub use snapshot::{
    SessionSnapshot, ValueSnapshot, decode_session, decode_snapshot, encode_session,
    encode_snapshot, parse_timestamp, session_from_json, snapshot_from_json,
};
pub use types::{Bounds, DEFAULT_MAX, DEFAULT_MIN, MutationKind};
