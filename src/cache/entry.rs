//! Cached Entry Module
//!
//! Defines the envelope stored for every cached value, the expiration policy
//! attached to writes, and the verdicts a validator can return.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version carried by entries that were returned to the caller but never stored.
pub const UNPERSISTED_VERSION: i64 = -1;

// == Cached Entry ==
/// A value together with the metadata the strategy engine reasons about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry<V> {
    /// The cached payload
    pub value: V,
    /// When the value was first written
    pub cached_at: DateTime<Utc>,
    /// When the value was last confirmed valid (or last written)
    pub last_validated_at: DateTime<Utc>,
    /// Write counter: 0 on insert, +1 on every update of the same key.
    /// [`UNPERSISTED_VERSION`] marks a value that never reached a backend.
    pub version: i64,
}

impl<V> CachedEntry<V> {
    // == Constructor ==
    /// Creates an entry describing a value held by a backend.
    pub fn new(
        value: V,
        cached_at: DateTime<Utc>,
        last_validated_at: DateTime<Utc>,
        version: i64,
    ) -> Self {
        Self {
            value,
            cached_at,
            last_validated_at,
            version,
        }
    }

    /// Wraps a freshly computed value whose write to the backend failed.
    ///
    /// The entry reports `version == -1` and `is_persisted() == false`.
    pub fn unpersisted(value: V) -> Self {
        let now = Utc::now();
        Self {
            value,
            cached_at: now,
            last_validated_at: now,
            version: UNPERSISTED_VERSION,
        }
    }

    /// Returns true when the entry reflects state actually held by the backend.
    ///
    /// Derived from the version, so it survives serialization.
    pub fn is_persisted(&self) -> bool {
        self.version != UNPERSISTED_VERSION
    }

    /// Consumes the entry, returning the payload.
    pub fn into_value(self) -> V {
        self.value
    }
}

// == Expiration Policy ==
/// How long an entry may stay in a backend without being touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiration {
    /// Sliding window; `None` means the entry never expires by policy
    pub sliding: Option<Duration>,
}

impl Expiration {
    /// An expiration policy that never expires entries.
    pub fn never() -> Self {
        Self { sliding: None }
    }

    /// Expires entries left unaccessed for longer than `window`.
    pub fn sliding(window: Duration) -> Self {
        Self {
            sliding: Some(window),
        }
    }

    /// Returns true if an entry last accessed at `last_access` is stale at `now`.
    pub fn is_expired_at(&self, last_access: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.sliding {
            Some(window) => match (now - last_access).to_std() {
                Ok(idle) => idle > window,
                // Clock moved backwards; the entry was touched "in the future".
                Err(_) => false,
            },
            None => false,
        }
    }
}

// == Validation Result ==
/// Verdict of a validation callback on an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    /// The entry is still good; its validation timestamp gets refreshed
    Valid,
    /// The entry must not be used
    Invalid,
    /// No opinion; an existing entry is trusted as-is
    Unknown,
}
