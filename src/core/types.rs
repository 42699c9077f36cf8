use super::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_MIN: i64 = -999_999;
pub const DEFAULT_MAX: i64 = 999_999;

/// Inclusive `[min, max]` range a counter value must stay inside.
///
/// Zero is always in range so that `reset` can never fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    min: i64,
    max: i64,
}

impl Bounds {
    pub fn new(min: i64, max: i64) -> Result<Self> {
        if min > 0 || max < 0 {
            return Err(StoreError::InvalidConfig(format!(
                "bounds [{}, {}] must contain zero",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// Skips the zero check; `StoreConfig::validate` reports it later.
    pub(crate) fn unchecked(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Returns `value` unchanged if in range, otherwise a `BoundsViolation`.
    pub fn check(&self, value: i64) -> Result<i64> {
        if self.contains(value) {
            Ok(value)
        } else {
            Err(StoreError::BoundsViolation {
                attempted: value,
                min: self.min,
                max: self.max,
            })
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN,
            max: DEFAULT_MAX,
        }
    }
}

/// The three user operations a counter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Increment,
    Decrement,
    Reset,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increment => "increment",
            Self::Decrement => "decrement",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
