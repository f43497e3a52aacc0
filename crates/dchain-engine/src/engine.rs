//! The engine facade.
//!
//! [`Engine`] ties the components together behind the operation surface
//! the host binds: configure, insert, read, delete, truncate, stats,
//! refresh, and introspection. It owns the configuration registry and
//! the codec; storage and transaction lifetime stay with the host and
//! come in per call.
//!
//! Mutations run inside a [`WriteTxn`], which couples the host's
//! transaction-scoped capabilities with the statistics accumulator for
//! that transaction. The host flushes the accumulator at commit and
//! discards it at abort.

use std::sync::Arc;

use tracing::debug;

use dchain_codec::{content, frame, BlockDelta, DeltaCodec};
use dchain_error::{ChainError, Result};
use dchain_types::{
    ChainEntry, ColumnSpec, DeltaTag, GroupStats, RelationConfig, RelationId, SeqNo, StatsDelta,
    Value,
};

use crate::config::{self, ConfigRegistry, ConfigRequest};
use crate::delete::cascade_delete;
use crate::lock;
use crate::planner;
use crate::reconstruct::{self, reconstruct};
use crate::stats::{self, FlushSummary, RebuildReport, StatsAccumulator};
use crate::storage::{StorageBackend, TransactionContext};

/// One transaction's view of the engine: the host's capabilities plus
/// the statistics batch scoped to this transaction.
pub struct WriteTxn<'a, H: ?Sized> {
    host: &'a mut H,
    stats: StatsAccumulator,
}

impl<'a, H> WriteTxn<'a, H>
where
    H: StorageBackend + TransactionContext + ?Sized,
{
    /// Wrap a host transaction.
    pub fn new(host: &'a mut H) -> Self {
        Self {
            host,
            stats: StatsAccumulator::new(),
        }
    }

    /// Read access to the underlying host view (sees this transaction's
    /// own staged writes).
    pub fn storage(&self) -> &H {
        self.host
    }

    /// Distinct groups with pending statistics deltas.
    #[must_use]
    pub fn pending_stats_groups(&self) -> usize {
        self.stats.pending_groups()
    }

    /// Flush the statistics batch into the host's staged state. The
    /// host calls this exactly once, immediately before commit.
    ///
    /// # Errors
    ///
    /// Propagates backend failures; the host must abort on error.
    pub fn flush_stats(&mut self) -> Result<FlushSummary> {
        self.stats.flush(&mut *self.host)
    }

    /// Discard the statistics batch (abort path).
    pub fn discard_stats(&mut self) {
        self.stats.discard();
    }
}

/// Aggregate statistics over one relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelationStats {
    /// Number of groups with at least one revision.
    pub group_count: u64,
    /// Counter totals across all groups.
    pub totals: GroupStats,
}

/// Introspection: configuration plus shape summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescription {
    /// The relation's configuration.
    pub config: RelationConfig,
    /// Number of groups with at least one revision.
    pub group_count: u64,
    /// Codec the engine applies to this relation's deltas.
    pub codec: &'static str,
}

/// Introspection: one chain entry as the planner placed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Chain position.
    pub seq: u64,
    /// Order key the revision was inserted under.
    pub order_key: Value,
    /// Keyframe or delta distance.
    pub tag: DeltaTag,
    /// Base position for deltas.
    pub base_seq: Option<u64>,
    /// Uncompressed content length.
    pub raw_len: u32,
    /// Stored (framed) length.
    pub stored_len: u64,
}

/// Introspection: one entry's physical representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalEntry {
    /// Chain position.
    pub seq: u64,
    /// Raw persisted tag field value (the keyframe sentinel included).
    pub tag_raw: u16,
    /// Full frame length in bytes.
    pub frame_len: u64,
    /// Payload length in bytes (frame minus header).
    pub payload_len: u64,
    /// Uncompressed content length recorded at append time.
    pub raw_len: u32,
}

/// The DeltaChain engine core.
///
/// Stateless apart from the configuration registry; safe to share
/// across host connections.
#[derive(Debug)]
pub struct Engine<C = BlockDelta> {
    registry: ConfigRegistry,
    codec: C,
}

impl Engine<BlockDelta> {
    /// Engine with the built-in block-delta codec.
    #[must_use]
    pub fn new() -> Self {
        Self::with_codec(BlockDelta::INSTANCE)
    }
}

impl Default for Engine<BlockDelta> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: DeltaCodec> Engine<C> {
    /// Engine with a caller-supplied codec.
    pub fn with_codec(codec: C) -> Self {
        Self {
            registry: ConfigRegistry::new(),
            codec,
        }
    }

    /// The codec in use.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The configuration registry.
    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Place a relation under management (or reconfigure it), validating
    /// the request against the host's column list.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid column references,
    /// nullable or non-byte-like delta columns, or out-of-range numeric
    /// parameters.
    pub fn configure<S>(
        &self,
        storage: &mut S,
        request: &ConfigRequest,
        columns: &[ColumnSpec],
    ) -> Result<Arc<RelationConfig>>
    where
        S: StorageBackend + ?Sized,
    {
        let config = config::validate(request, columns)?;
        self.registry.install(storage, config)
    }

    fn config<S>(&self, storage: &S, relation: RelationId) -> Result<Arc<RelationConfig>>
    where
        S: StorageBackend + ?Sized,
    {
        self.registry.get(storage, relation)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Append one revision to a group's chain.
    ///
    /// Validation happens before the group lock is taken and before any
    /// physical append, so a rejected insert leaves zero partial state.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NullGroupKey`] for a null group key,
    /// [`ChainError::ColumnCountMismatch`] when the payload count does
    /// not match the configured delta columns,
    /// [`ChainError::OrderConflict`] when the order key does not advance
    /// the group, [`ChainError::LockNotAvailable`] when the group lock
    /// times out, and [`ChainError::ChainCorrupt`] when a delta base
    /// cannot be reconstructed.
    pub fn insert<H>(
        &self,
        txn: &mut WriteTxn<'_, H>,
        relation: RelationId,
        group: &Value,
        order_key: &Value,
        column_payloads: &[&[u8]],
    ) -> Result<SeqNo>
    where
        H: StorageBackend + TransactionContext + ?Sized,
    {
        let config = self.config(&*txn.host, relation)?;

        if group.is_null() {
            return Err(ChainError::NullGroupKey);
        }
        if column_payloads.len() != config.delta_columns.len() {
            return Err(ChainError::ColumnCountMismatch {
                expected: config.delta_columns.len(),
                actual: column_payloads.len(),
            });
        }
        let record = content::encode_columns(column_payloads).map_err(|e| match e {
            dchain_codec::CodecError::PayloadTooLarge { len } => {
                ChainError::PayloadTooLarge { len }
            }
            other => ChainError::internal(other.to_string()),
        })?;
        let raw_len = u32::try_from(record.len())
            .map_err(|_| ChainError::PayloadTooLarge { len: record.len() })?;

        // Everything beyond this point mutates the group, so serialize.
        txn.host.acquire_group_lock(lock::derive(relation, group))?;

        let prior_max = txn.host.max_seq(relation, group)?;
        if let Some(prior) = prior_max {
            let Some(last) = txn.host.fetch_entry(relation, group, prior)? else {
                return Err(reconstruct::corrupt(
                    relation,
                    group,
                    prior,
                    "missing",
                    "maximum seq has no entry",
                ));
            };
            if *order_key <= last.order_key {
                return Err(ChainError::OrderConflict {
                    group: group.to_string(),
                    order_key: order_key.to_string(),
                    current_max: last.order_key.to_string(),
                });
            }
        }

        let plan = planner::plan(prior_max, &config);
        let payload = match plan.base_seq {
            None => record.clone(),
            Some(base_seq) => {
                let base = reconstruct(&*txn.host, &self.codec, relation, group, base_seq)?;
                self.codec.encode(&base, &record)
            }
        };
        let image = frame::encode_entry(plan.tag, &payload);
        let stored_len = image.len() as u64;

        txn.host.append_entry(
            relation,
            group,
            ChainEntry {
                seq: plan.new_seq,
                order_key: order_key.clone(),
                raw_len,
                image,
            },
        )?;
        txn.stats.record(
            relation,
            group,
            StatsDelta::append(plan.tag.is_keyframe(), u64::from(raw_len), stored_len),
        );

        debug!(
            relation = relation.get(),
            group = %group,
            seq = plan.new_seq.get(),
            tag = %plan.tag,
            raw_len,
            stored_len,
            "revision appended"
        );
        Ok(plan.new_seq)
    }

    /// Cascade-delete a group's tail starting at `order_key`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::RevisionNotFound`] when the order key does
    /// not exist in the group and [`ChainError::LockNotAvailable`] when
    /// the group lock times out.
    pub fn delete<H>(
        &self,
        txn: &mut WriteTxn<'_, H>,
        relation: RelationId,
        group: &Value,
        order_key: &Value,
    ) -> Result<u64>
    where
        H: StorageBackend + TransactionContext + ?Sized,
    {
        self.config(&*txn.host, relation)?;
        txn.host.acquire_group_lock(lock::derive(relation, group))?;
        cascade_delete(&mut *txn.host, &mut txn.stats, relation, group, order_key)
    }

    /// Clear every chain and statistics row of the relation and reset
    /// its sequence domain. The next insert into any group starts at
    /// seq 1. The host serializes truncation at relation scope.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn truncate<H>(&self, txn: &mut WriteTxn<'_, H>, relation: RelationId) -> Result<()>
    where
        H: StorageBackend + TransactionContext + ?Sized,
    {
        self.config(&*txn.host, relation)?;
        txn.host.clear_chains(relation)?;
        txn.host.clear_stats(relation)?;
        // Deltas recorded earlier in this transaction refer to rows that
        // no longer exist.
        txn.stats.forget_relation(relation);
        debug!(relation = relation.get(), "relation truncated");
        Ok(())
    }

    /// `UPDATE` is rejected unconditionally: historical revisions are
    /// immutable.
    ///
    /// # Errors
    ///
    /// Always returns [`ChainError::Unsupported`].
    pub fn update(&self, _relation: RelationId) -> Result<()> {
        Err(ChainError::unsupported("UPDATE"))
    }

    /// `CLUSTER` is rejected unconditionally: chains are physically
    /// ordered by their sequence numbers already.
    ///
    /// # Errors
    ///
    /// Always returns [`ChainError::Unsupported`].
    pub fn cluster(&self, _relation: RelationId) -> Result<()> {
        Err(ChainError::unsupported("CLUSTER"))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Reconstruct the revision at `order_key` and return its per-column
    /// payloads.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::GroupNotFound`] for an empty group,
    /// [`ChainError::RevisionNotFound`] for an unknown order key, and
    /// [`ChainError::ChainCorrupt`] when the chain cannot be decoded.
    pub fn read<S>(
        &self,
        storage: &S,
        relation: RelationId,
        group: &Value,
        order_key: &Value,
    ) -> Result<Vec<Vec<u8>>>
    where
        S: StorageBackend + ?Sized,
    {
        self.config(storage, relation)?;
        let Some(seq) = storage.find_seq_by_order(relation, group, order_key)? else {
            if storage.max_seq(relation, group)?.is_none() {
                return Err(ChainError::GroupNotFound {
                    group: group.to_string(),
                });
            }
            return Err(ChainError::RevisionNotFound {
                group: group.to_string(),
                at: format!("order_key={order_key}"),
            });
        };

        let record = reconstruct(storage, &self.codec, relation, group, seq)?;
        content::decode_columns(&record)
            .map_err(|e| reconstruct::corrupt(relation, group, seq, "record", &e))
    }

    /// Reconstruct the raw content record at a chain position.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::RevisionNotFound`] when the position does
    /// not exist and [`ChainError::ChainCorrupt`] when the chain cannot
    /// be decoded.
    pub fn reconstruct_at<S>(
        &self,
        storage: &S,
        relation: RelationId,
        group: &Value,
        seq: SeqNo,
    ) -> Result<Vec<u8>>
    where
        S: StorageBackend + ?Sized,
    {
        self.config(storage, relation)?;
        reconstruct(storage, &self.codec, relation, group, seq)
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    /// Aggregate the cached statistics rows of the relation.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NotManaged`] for an unconfigured relation.
    pub fn stats<S>(&self, storage: &S, relation: RelationId) -> Result<RelationStats>
    where
        S: StorageBackend + ?Sized,
    {
        self.config(storage, relation)?;
        let rows = storage.stats_scan(relation)?;
        let mut aggregate = RelationStats::default();
        for (_, group_stats) in rows {
            aggregate.group_count += 1;
            aggregate.totals = aggregate.totals + group_stats;
        }
        Ok(aggregate)
    }

    /// Recompute the relation's statistics from a full chain scan.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NotManaged`] for an unconfigured relation
    /// and [`ChainError::ChainCorrupt`] when a chain cannot be walked.
    pub fn refresh_stats<S>(&self, storage: &mut S, relation: RelationId) -> Result<RebuildReport>
    where
        S: StorageBackend + ?Sized,
    {
        self.config(storage, relation)?;
        stats::rebuild(storage, &self.codec, relation)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Describe the relation: configuration plus shape summary.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NotManaged`] for an unconfigured relation.
    pub fn describe<S>(&self, storage: &S, relation: RelationId) -> Result<RelationDescription>
    where
        S: StorageBackend + ?Sized,
    {
        let config = self.config(storage, relation)?;
        let group_count = storage.groups(relation)?.len() as u64;
        Ok(RelationDescription {
            config: (*config).clone(),
            group_count,
            codec: self.codec.name(),
        })
    }

    /// List one group's chain entries with their placement.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::GroupNotFound`] for an empty group and
    /// [`ChainError::ChainCorrupt`] for unreadable frames.
    pub fn inspect<S>(
        &self,
        storage: &S,
        relation: RelationId,
        group: &Value,
    ) -> Result<Vec<EntryInfo>>
    where
        S: StorageBackend + ?Sized,
    {
        self.config(storage, relation)?;
        let Some(max) = storage.max_seq(relation, group)? else {
            return Err(ChainError::GroupNotFound {
                group: group.to_string(),
            });
        };

        let mut entries = Vec::with_capacity(max.get() as usize);
        for raw_seq in 1..=max.get() {
            let seq =
                SeqNo::new(raw_seq).ok_or_else(|| ChainError::internal("seq 0 in inspect"))?;
            let Some(entry) = storage.fetch_entry(relation, group, seq)? else {
                return Err(reconstruct::corrupt(
                    relation,
                    group,
                    seq,
                    "missing",
                    "gap inside chain",
                ));
            };
            let (tag, _payload) = frame::decode_entry(&entry.image)
                .map_err(|e| reconstruct::corrupt(relation, group, seq, "unreadable", &e))?;
            entries.push(EntryInfo {
                seq: raw_seq,
                order_key: entry.order_key.clone(),
                tag,
                base_seq: tag.base_of(seq).map(SeqNo::get),
                raw_len: entry.raw_len,
                stored_len: entry.image.len() as u64,
            });
        }
        Ok(entries)
    }

    /// One entry's physical representation, addressed by order key.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::RevisionNotFound`] for an unknown order key
    /// and [`ChainError::ChainCorrupt`] for an unreadable frame.
    pub fn physical<S>(
        &self,
        storage: &S,
        relation: RelationId,
        group: &Value,
        order_key: &Value,
    ) -> Result<PhysicalEntry>
    where
        S: StorageBackend + ?Sized,
    {
        self.config(storage, relation)?;
        let seq = crate::delete::resolve_target(storage, relation, group, order_key)?;
        let Some(entry) = storage.fetch_entry(relation, group, seq)? else {
            return Err(ChainError::RevisionNotFound {
                group: group.to_string(),
                at: format!("seq={seq}"),
            });
        };
        let (tag, payload) = frame::decode_entry(&entry.image)
            .map_err(|e| reconstruct::corrupt(relation, group, seq, "unreadable", &e))?;
        Ok(PhysicalEntry {
            seq: seq.get(),
            tag_raw: tag.raw(),
            frame_len: entry.image.len() as u64,
            payload_len: payload.len() as u64,
            raw_len: entry.raw_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_and_cluster_are_rejected_by_name() {
        let engine = Engine::new();
        let rel = RelationId::new(1);
        assert!(matches!(
            engine.update(rel),
            Err(ChainError::Unsupported { operation: "UPDATE" })
        ));
        assert!(matches!(
            engine.cluster(rel),
            Err(ChainError::Unsupported { operation: "CLUSTER" })
        ));
    }
}
