//! Bounded in-memory counter state.
//!
//! The current snapshot lives in a `watch` channel: reads are cheap clones,
//! every accepted change notifies subscribers, and writers never wait on I/O.

use crate::core::{Bounds, MutationKind, Result, SessionSnapshot, StoreError, ValueSnapshot};
use tokio::sync::watch;

pub struct ValueStore {
    bounds: Bounds,
    state: watch::Sender<ValueSnapshot>,
    session: watch::Sender<SessionSnapshot>,
}

impl ValueStore {
    /// Creates a store holding `initial`, which must already be within `bounds`.
    pub fn new(bounds: Bounds, initial: ValueSnapshot) -> Result<Self> {
        initial.validate(&bounds)?;
        let (state, _) = watch::channel(initial);
        let (session, _) = watch::channel(SessionSnapshot::start());
        Ok(Self {
            bounds,
            state,
            session,
        })
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn snapshot(&self) -> ValueSnapshot {
        self.state.borrow().clone()
    }

    pub fn session(&self) -> SessionSnapshot {
        self.session.borrow().clone()
    }

    /// Receiver notified after every accepted change.
    pub fn subscribe(&self) -> watch::Receiver<ValueSnapshot> {
        self.state.subscribe()
    }

    pub fn increment(&self) -> Result<ValueSnapshot> {
        self.apply(MutationKind::Increment)
    }

    pub fn decrement(&self) -> Result<ValueSnapshot> {
        self.apply(MutationKind::Decrement)
    }

    pub fn reset(&self) -> ValueSnapshot {
        // Zero is inside every valid `Bounds`.
        self.apply(MutationKind::Reset)
            .unwrap_or_else(|_| self.snapshot())
    }

    pub fn apply(&self, kind: MutationKind) -> Result<ValueSnapshot> {
        let bounds = self.bounds;
        let mut outcome = None;

        self.state.send_if_modified(|current| {
            let next = match kind {
                MutationKind::Increment => current.value.checked_add(1),
                MutationKind::Decrement => current.value.checked_sub(1),
                MutationKind::Reset => Some(0),
            };
            let checked = match next {
                Some(value) if kind == MutationKind::Reset => Ok(value),
                Some(value) => bounds.check(value),
                None => Err(StoreError::BoundsViolation {
                    attempted: current.value,
                    min: bounds.min(),
                    max: bounds.max(),
                }),
            };
            match checked {
                Ok(value) => {
                    *current = current.with_value(value);
                    outcome = Some(Ok(current.clone()));
                    true
                }
                Err(err) => {
                    outcome = Some(Err(err));
                    false
                }
            }
        });

        let outcome = outcome.unwrap_or_else(|| Ok(self.snapshot()));
        if outcome.is_ok() {
            self.session.send_modify(|session| session.record(kind));
        }
        outcome
    }

    /// Replaces the state wholesale. Invalid snapshots leave the prior state in place.
    pub fn load(&self, snapshot: ValueSnapshot) -> Result<()> {
        snapshot.validate(&self.bounds)?;
        self.state.send_replace(snapshot);
        Ok(())
    }

    /// Decodes raw JSON and loads it.
    pub fn load_encoded(&self, bytes: &[u8]) -> Result<()> {
        let snapshot = crate::core::decode_snapshot(bytes, &self.bounds)?;
        self.load(snapshot)
    }

    /// Applies the snapshot a remote returned for `sent`.
    ///
    /// If nothing changed locally since `sent` was captured, `returned` becomes
    /// the state. Otherwise only the version moves forward and the newer local
    /// value is kept for the next persist.
    pub fn adopt_persisted(&self, sent: &ValueSnapshot, returned: &ValueSnapshot) -> ValueSnapshot {
        if returned.validate(&self.bounds).is_err() {
            return self.snapshot();
        }
        self.state.send_if_modified(|current| {
            if current == sent {
                *current = returned.clone();
                true
            } else if returned.version > current.version {
                current.version = returned.version;
                true
            } else {
                false
            }
        });
        self.snapshot()
    }

    pub fn replace_session(&self, session: SessionSnapshot) {
        self.session.send_replace(session);
    }
}
