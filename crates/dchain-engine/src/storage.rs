//! Capability traits the host injects into the engine.
//!
//! The engine never touches durable state or transaction lifetime
//! directly. A host hands it a [`StorageBackend`] view (scoped to the
//! host's current transaction, so reads observe the transaction's own
//! writes) and a [`TransactionContext`] for advisory locking. Commit and
//! abort remain host events: on commit the host flushes the pending
//! statistics batch first, on abort it discards the batch and the
//! staged writes together.

use dchain_error::Result;
use dchain_types::{ChainEntry, GroupStats, LockId, RelationId, SeqNo, StatsDelta, Value};

use dchain_types::RelationConfig;

/// Host storage capabilities: chain entries, group statistics, and
/// relation configuration, all keyed by relation and group.
pub trait StorageBackend {
    // --- chain entries ---

    /// Append one entry to a group's chain. The caller guarantees
    /// `entry.seq` is the next contiguous position; the backend stores
    /// it verbatim.
    fn append_entry(&mut self, relation: RelationId, group: &Value, entry: ChainEntry)
        -> Result<()>;

    /// Fetch the entry at `(relation, group, seq)`, if present.
    fn fetch_entry(
        &self,
        relation: RelationId,
        group: &Value,
        seq: SeqNo,
    ) -> Result<Option<ChainEntry>>;

    /// The maximum sequence number currently present in a group, or
    /// `None` if the group has no rows.
    fn max_seq(&self, relation: RelationId, group: &Value) -> Result<Option<SeqNo>>;

    /// Resolve the sequence number holding the given order key.
    fn find_seq_by_order(
        &self,
        relation: RelationId,
        group: &Value,
        order_key: &Value,
    ) -> Result<Option<SeqNo>>;

    /// Remove every entry with `seq >= from` in the group, returning the
    /// removed entries (ascending by seq) for statistics accounting.
    fn remove_tail(
        &mut self,
        relation: RelationId,
        group: &Value,
        from: SeqNo,
    ) -> Result<Vec<ChainEntry>>;

    /// Every group of the relation that currently has rows.
    fn groups(&self, relation: RelationId) -> Result<Vec<Value>>;

    /// Drop every chain of the relation.
    fn clear_chains(&mut self, relation: RelationId) -> Result<()>;

    // --- group statistics ---

    /// Fetch the cached statistics row for a group, if present.
    fn stats_get(&self, relation: RelationId, group: &Value) -> Result<Option<GroupStats>>;

    /// Additively upsert one group's statistics row: create it if
    /// absent, adjust existing counters otherwise, and remove the row if
    /// the adjusted `row_count` reaches zero.
    fn stats_apply(&mut self, relation: RelationId, group: &Value, delta: StatsDelta)
        -> Result<()>;

    /// Replace one group's statistics row wholesale (rebuild path).
    fn stats_put(&mut self, relation: RelationId, group: &Value, stats: GroupStats) -> Result<()>;

    /// All statistics rows of the relation.
    fn stats_scan(&self, relation: RelationId) -> Result<Vec<(Value, GroupStats)>>;

    /// Drop every statistics row of the relation.
    fn clear_stats(&mut self, relation: RelationId) -> Result<()>;

    // --- relation configuration ---

    /// Load the persisted configuration for a relation, if any.
    fn config_load(&self, relation: RelationId) -> Result<Option<RelationConfig>>;

    /// Persist a relation configuration, replacing any previous one.
    fn config_store(&mut self, config: &RelationConfig) -> Result<()>;
}

/// Host transaction capabilities the engine needs: advisory locking
/// scoped to the transaction.
pub trait TransactionContext {
    /// Acquire the exclusive advisory lock for one group, blocking per
    /// the host's timeout policy. Re-acquiring a lock this transaction
    /// already holds is a no-op. The host releases all held locks at
    /// commit or abort; the engine never releases them.
    ///
    /// # Errors
    ///
    /// Returns [`dchain_error::ChainError::LockNotAvailable`] when the
    /// host's lock timeout elapses. No state has been mutated when that
    /// happens.
    fn acquire_group_lock(&mut self, lock: LockId) -> Result<()>;
}
