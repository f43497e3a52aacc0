//! Batched group statistics.
//!
//! Structural mutations never write `GroupStats` rows directly. They
//! record signed deltas into a per-transaction [`StatsAccumulator`];
//! the host's commit boundary drives one [`StatsAccumulator::flush`],
//! which performs exactly one additive upsert per distinct group
//! touched. A bulk operation of R rows across G groups therefore costs
//! G statistics writes, not R. On abort the accumulator is discarded
//! without flushing.
//!
//! [`rebuild`] is the ground-truth oracle: it recomputes every group's
//! counters from a full chain walk and replaces the stored rows. It is
//! used for repair and, in tests, to check the continuously accumulated
//! values exactly.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use dchain_codec::{frame, DeltaCodec};
use dchain_error::{ChainError, Result};
use dchain_types::{DeltaTag, GroupStats, RelationId, SeqNo, StatsDelta, Value};

use crate::reconstruct::corrupt;
use crate::storage::StorageBackend;

/// Per-transaction accumulator of group statistics deltas.
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    pending: BTreeMap<(RelationId, Value), StatsDelta>,
}

/// What one flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSummary {
    /// Distinct groups whose rows were upserted.
    pub groups_flushed: u64,
}

impl StatsAccumulator {
    /// Empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delta for one group. Deltas for the same group merge in
    /// place; the map stays O(distinct groups).
    pub fn record(&mut self, relation: RelationId, group: &Value, delta: StatsDelta) {
        if delta.is_zero() {
            return;
        }
        *self
            .pending
            .entry((relation, group.clone()))
            .or_default() += delta;
    }

    /// Number of distinct groups with pending deltas.
    #[must_use]
    pub fn pending_groups(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending delta for one relation (truncate path: the
    /// stored rows are gone, so the deltas must not resurrect them).
    pub fn forget_relation(&mut self, relation: RelationId) {
        self.pending.retain(|(rel, _), _| *rel != relation);
    }

    /// Discard everything without flushing (abort path).
    pub fn discard(&mut self) {
        self.pending.clear();
    }

    /// Apply one additive upsert per distinct pending group.
    ///
    /// # Errors
    ///
    /// Propagates backend failures; deltas already applied stay applied,
    /// which is safe because the host aborts the enclosing transaction
    /// on a failed flush.
    pub fn flush<S>(&mut self, storage: &mut S) -> Result<FlushSummary>
    where
        S: StorageBackend + ?Sized,
    {
        let mut groups_flushed = 0u64;
        for ((relation, group), delta) in std::mem::take(&mut self.pending) {
            storage.stats_apply(relation, &group, delta)?;
            groups_flushed += 1;
        }
        if groups_flushed > 0 {
            debug!(groups_flushed, "group statistics flushed");
        }
        Ok(FlushSummary { groups_flushed })
    }
}

/// Full-scan statistics rebuild report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    /// Groups walked.
    pub groups_scanned: u64,
    /// Chain entries walked.
    pub rows_scanned: u64,
}

/// Recompute every group's statistics from the chains themselves and
/// replace the stored rows.
///
/// Each chain is walked from its first entry; contents reconstructed so
/// far are kept in memory so delta bases resolve without refetching.
///
/// # Errors
///
/// Returns [`ChainError::ChainCorrupt`] when a chain cannot be walked
/// (missing entry, malformed frame, failed decode); the stored rows are
/// untouched in that case.
pub fn rebuild<S, C>(storage: &mut S, codec: &C, relation: RelationId) -> Result<RebuildReport>
where
    S: StorageBackend + ?Sized,
    C: DeltaCodec + ?Sized,
{
    let groups = storage.groups(relation)?;
    let mut rows_scanned = 0u64;
    let mut computed: Vec<(Value, GroupStats)> = Vec::with_capacity(groups.len());

    for group in groups {
        let Some(max) = storage.max_seq(relation, &group)? else {
            continue;
        };

        let mut stats = GroupStats::default();
        // Reconstructed contents indexed by seq - 1; bases always point
        // backward so each entry decodes against an already-walked one.
        let mut contents: Vec<Vec<u8>> = Vec::with_capacity(max.get() as usize);

        for raw_seq in 1..=max.get() {
            let seq = SeqNo::new(raw_seq).ok_or_else(|| ChainError::internal("seq 0 in walk"))?;
            let Some(entry) = storage.fetch_entry(relation, &group, seq)? else {
                return Err(corrupt(
                    relation,
                    &group,
                    seq,
                    "missing",
                    "gap inside chain during rebuild",
                ));
            };
            let (tag, payload) = frame::decode_entry(&entry.image)
                .map_err(|e| corrupt(relation, &group, seq, "unreadable", &e))?;

            let content = match tag {
                DeltaTag::Keyframe => payload.to_vec(),
                DeltaTag::Delta(_) => {
                    let base_seq = tag.base_of(seq).ok_or_else(|| {
                        corrupt(relation, &group, seq, &tag.to_string(), "base leaves chain")
                    })?;
                    let base = &contents[(base_seq.get() - 1) as usize];
                    codec
                        .decode(base, payload)
                        .map_err(|e| corrupt(relation, &group, seq, &tag.to_string(), &e))?
                }
            };

            if content.len() as u64 != u64::from(entry.raw_len) {
                warn!(
                    relation = relation.get(),
                    group = %group,
                    seq = raw_seq,
                    stored_raw_len = entry.raw_len,
                    actual = content.len(),
                    "stored raw length disagrees with reconstructed content"
                );
            }

            stats = stats.applying(StatsDelta::append(
                tag.is_keyframe(),
                content.len() as u64,
                entry.image.len() as u64,
            ));
            contents.push(content);
            rows_scanned += 1;
        }

        if !stats.is_empty() {
            computed.push((group, stats));
        }
    }

    // Replace the stored rows only after the whole scan succeeded.
    storage.clear_stats(relation)?;
    let groups_scanned = computed.len() as u64;
    for (group, stats) in computed {
        storage.stats_put(relation, &group, stats)?;
    }

    debug!(
        relation = relation.get(),
        groups_scanned, rows_scanned, "statistics rebuilt from full scan"
    );
    Ok(RebuildReport {
        groups_scanned,
        rows_scanned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_deltas_are_not_recorded() {
        let mut acc = StatsAccumulator::new();
        acc.record(RelationId::new(1), &Value::Integer(1), StatsDelta::default());
        assert!(acc.is_empty());
    }

    #[test]
    fn deltas_merge_per_group() {
        let mut acc = StatsAccumulator::new();
        let rel = RelationId::new(1);
        for i in 0..200 {
            acc.record(
                rel,
                &Value::Integer(i % 2),
                StatsDelta::append(i % 10 == 0, 100, 40),
            );
        }
        assert_eq!(acc.pending_groups(), 2);
    }

    #[test]
    fn forget_relation_is_scoped() {
        let mut acc = StatsAccumulator::new();
        acc.record(
            RelationId::new(1),
            &Value::Integer(1),
            StatsDelta::append(true, 1, 1),
        );
        acc.record(
            RelationId::new(2),
            &Value::Integer(1),
            StatsDelta::append(true, 1, 1),
        );
        acc.forget_relation(RelationId::new(1));
        assert_eq!(acc.pending_groups(), 1);
    }

    #[test]
    fn discard_drops_everything() {
        let mut acc = StatsAccumulator::new();
        acc.record(
            RelationId::new(1),
            &Value::Integer(1),
            StatsDelta::append(true, 1, 1),
        );
        acc.discard();
        assert!(acc.is_empty());
    }
}
