//! Per-group aggregate statistics and their additive deltas.

use std::ops::{Add, AddAssign};

/// Cached aggregate counters for one `(relation, group)` pair.
///
/// Derived state: eventually consistent while a transaction's accumulator
/// is open, exact after flush. A group's row disappears when `row_count`
/// reaches zero.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize,
)]
pub struct GroupStats {
    /// Number of live revisions in the chain.
    pub row_count: u64,
    /// Number of keyframe revisions.
    pub keyframe_count: u64,
    /// Total uncompressed content bytes across all revisions.
    pub raw_size_bytes: u64,
    /// Total stored (framed) bytes across all revisions.
    pub compressed_size_bytes: u64,
}

impl GroupStats {
    /// Apply an additive delta, clamping at zero.
    ///
    /// Counters going negative would mean a delta was recorded against
    /// state it never observed; clamping keeps the cache well formed and
    /// the discrepancy is repairable via a stats rebuild.
    #[must_use]
    pub fn applying(self, delta: StatsDelta) -> Self {
        fn shift(base: u64, d: i64) -> u64 {
            if d >= 0 {
                base.saturating_add(d as u64)
            } else {
                base.saturating_sub(d.unsigned_abs())
            }
        }
        Self {
            row_count: shift(self.row_count, delta.rows),
            keyframe_count: shift(self.keyframe_count, delta.keyframes),
            raw_size_bytes: shift(self.raw_size_bytes, delta.raw_bytes),
            compressed_size_bytes: shift(self.compressed_size_bytes, delta.compressed_bytes),
        }
    }

    /// Whether the group has no rows left.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

impl Add for GroupStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            row_count: self.row_count + rhs.row_count,
            keyframe_count: self.keyframe_count + rhs.keyframe_count,
            raw_size_bytes: self.raw_size_bytes + rhs.raw_size_bytes,
            compressed_size_bytes: self.compressed_size_bytes + rhs.compressed_size_bytes,
        }
    }
}

/// Signed counter adjustments accumulated per group within one
/// transaction and applied additively at flush time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize,
)]
pub struct StatsDelta {
    /// Row count adjustment.
    pub rows: i64,
    /// Keyframe count adjustment.
    pub keyframes: i64,
    /// Uncompressed byte adjustment.
    pub raw_bytes: i64,
    /// Stored byte adjustment.
    pub compressed_bytes: i64,
}

impl StatsDelta {
    /// Delta for appending one revision.
    #[must_use]
    pub fn append(is_keyframe: bool, raw_len: u64, stored_len: u64) -> Self {
        Self {
            rows: 1,
            keyframes: i64::from(is_keyframe),
            raw_bytes: raw_len as i64,
            compressed_bytes: stored_len as i64,
        }
    }

    /// Delta for removing one revision.
    #[must_use]
    pub fn remove(is_keyframe: bool, raw_len: u64, stored_len: u64) -> Self {
        Self {
            rows: -1,
            keyframes: -i64::from(is_keyframe),
            raw_bytes: -(raw_len as i64),
            compressed_bytes: -(stored_len as i64),
        }
    }

    /// Whether this delta changes nothing.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.rows == 0 && self.keyframes == 0 && self.raw_bytes == 0 && self.compressed_bytes == 0
    }
}

impl AddAssign for StatsDelta {
    fn add_assign(&mut self, rhs: Self) {
        self.rows += rhs.rows;
        self.keyframes += rhs.keyframes;
        self.raw_bytes += rhs.raw_bytes;
        self.compressed_bytes += rhs.compressed_bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applying_append_then_remove_is_identity() {
        let stats = GroupStats {
            row_count: 3,
            keyframe_count: 1,
            raw_size_bytes: 300,
            compressed_size_bytes: 120,
        };
        let up = StatsDelta::append(true, 50, 20);
        let down = StatsDelta::remove(true, 50, 20);
        assert_eq!(stats.applying(up).applying(down), stats);
    }

    #[test]
    fn deltas_accumulate() {
        let mut d = StatsDelta::default();
        d += StatsDelta::append(true, 10, 10);
        d += StatsDelta::append(false, 10, 4);
        d += StatsDelta::remove(false, 10, 4);
        assert_eq!(d.rows, 1);
        assert_eq!(d.keyframes, 1);
        assert_eq!(d.raw_bytes, 10);
        assert_eq!(d.compressed_bytes, 10);
    }

    #[test]
    fn applying_clamps_at_zero() {
        let stats = GroupStats::default();
        let gone = stats.applying(StatsDelta::remove(true, 100, 100));
        assert!(gone.is_empty());
        assert_eq!(gone.raw_size_bytes, 0);
    }

    #[test]
    fn aggregate_add() {
        let a = GroupStats {
            row_count: 1,
            keyframe_count: 1,
            raw_size_bytes: 10,
            compressed_size_bytes: 10,
        };
        let b = GroupStats {
            row_count: 2,
            keyframe_count: 1,
            raw_size_bytes: 30,
            compressed_size_bytes: 12,
        };
        let sum = a + b;
        assert_eq!(sum.row_count, 3);
        assert_eq!(sum.raw_size_bytes, 40);
    }
}
