//! Core types for the DeltaChain storage engine.
//!
//! This crate is the leaf of the workspace: identifiers, key values, chain
//! entries, relation configuration, and group statistics. It carries no
//! engine logic beyond construction-time validation of the individual
//! types; cross-type validation (configuration against a column list, tag
//! bounds against a chain) lives in `dchain-engine`.

pub mod config;
pub mod entry;
pub mod stats;
pub mod value;

pub use config::{ColumnKind, ColumnSpec, RelationConfig};
pub use entry::ChainEntry;
pub use stats::{GroupStats, StatsDelta};
pub use value::Value;

use std::fmt;
use std::num::NonZeroU64;

/// Host-assigned identity of a managed relation.
///
/// The value space is opaque to the engine; it participates in lock-id
/// derivation and keys the configuration registry, but is never
/// interpreted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct RelationId(u64);

impl RelationId {
    /// Wrap a raw host relation identity.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw u64 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 1-based position of a revision within a group's chain.
///
/// Sequence numbers are assigned at append time and form a contiguous
/// range `1..=N` while the group has any rows; position 0 does not exist.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct SeqNo(NonZeroU64);

impl SeqNo {
    /// The first position in any chain. Always a keyframe.
    pub const FIRST: Self = Self(NonZeroU64::MIN);

    /// Create a sequence number from a raw u64.
    ///
    /// Returns `None` if `n` is 0.
    #[inline]
    #[must_use]
    pub const fn new(n: u64) -> Option<Self> {
        match NonZeroU64::new(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// The raw u64 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// The next position in the chain.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        // A chain would need 2^64 - 1 appends to overflow; saturate rather
        // than panic in release builds.
        match NonZeroU64::new(self.0.get().saturating_add(1)) {
            Some(v) => Self(v),
            None => Self(NonZeroU64::MAX),
        }
    }

    /// The position `distance` hops back, or `None` if that would leave
    /// the chain (reach 0 or below).
    #[inline]
    #[must_use]
    pub const fn back(self, distance: u64) -> Option<Self> {
        match self.0.get().checked_sub(distance) {
            Some(n) => Self::new(n),
            None => None,
        }
    }
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for SeqNo {
    type Error = InvalidSeqNo;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidSeqNo)
    }
}

/// Error returned when attempting to create a `SeqNo` from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSeqNo;

impl fmt::Display for InvalidSeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sequence number cannot be zero")
    }
}

impl std::error::Error for InvalidSeqNo {}

/// Raw value of the persisted tag field reserved for keyframes.
///
/// The tag is persisted as a fixed-width little-endian `u16`; the maximum
/// representable value is the keyframe sentinel, so delta distances may
/// only use `1..=MAX_COMPRESS_DEPTH`.
pub const KEYFRAME_SENTINEL: u16 = u16::MAX;

/// Largest configurable compression depth (one below the sentinel).
pub const MAX_COMPRESS_DEPTH: u16 = KEYFRAME_SENTINEL - 1;

/// How a revision's payload relates to the rest of its chain.
///
/// `Delta(t)` means the payload is a diff whose base revision lies `t`
/// chain positions back, at `seq - t`. The base must exist whenever the
/// entry does; cascade deletion preserves this by only truncating tails.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum DeltaTag {
    /// Full raw content; no dependency on another revision.
    Keyframe,
    /// Diff against the revision `distance` positions back (1-based).
    Delta(u16),
}

impl DeltaTag {
    /// Build a delta tag, rejecting 0 and the keyframe sentinel.
    #[inline]
    #[must_use]
    pub const fn delta(distance: u16) -> Option<Self> {
        if distance == 0 || distance == KEYFRAME_SENTINEL {
            None
        } else {
            Some(Self::Delta(distance))
        }
    }

    /// The raw persisted field value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        match self {
            Self::Keyframe => KEYFRAME_SENTINEL,
            Self::Delta(d) => d,
        }
    }

    /// Whether this entry is a keyframe.
    #[inline]
    #[must_use]
    pub const fn is_keyframe(self) -> bool {
        matches!(self, Self::Keyframe)
    }

    /// The base position for `self` at position `seq`, if any.
    #[inline]
    #[must_use]
    pub const fn base_of(self, seq: SeqNo) -> Option<SeqNo> {
        match self {
            Self::Keyframe => None,
            Self::Delta(d) => seq.back(d as u64),
        }
    }
}

impl fmt::Display for DeltaTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyframe => f.write_str("keyframe"),
            Self::Delta(d) => write!(f, "delta-{d}"),
        }
    }
}

/// Derived 64-bit serialization token for one `(relation, group)` pair.
///
/// Never persisted; recomputed per acquisition. Only meaningful as an
/// opaque key for the host's advisory-lock primitive, and only comparable
/// within the relation it was derived for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct LockId(u64);

impl LockId {
    /// Wrap a derived lock value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw u64 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
