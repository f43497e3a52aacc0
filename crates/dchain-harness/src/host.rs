//! In-memory transactional host.
//!
//! [`MemoryHost`] keeps committed ("durable") state behind a mutex and
//! hands out [`MemoryTxn`] transaction views. A transaction stages its
//! writes in a copy-on-write overlay at group granularity: the group
//! lock guarantees a single writer per group, so merging a staged group
//! back wholesale at commit cannot lose concurrent updates. Statistics
//! rows are staged the same way but are only written through
//! `stats_apply`, which the engine's accumulator drives at flush time.
//!
//! Relation configurations write through to durable state immediately
//! (configuration is a DDL-like step outside the data transaction).
//!
//! The advisory lock table follows the transaction-scoped discipline the
//! engine expects: `acquire_group_lock` blocks up to the host timeout,
//! re-acquisition by the holder is a no-op, and all locks drop together
//! at commit or abort (or when the transaction is dropped).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use dchain_engine::{StorageBackend, TransactionContext};
use dchain_error::{ChainError, Result};
use dchain_types::{
    ChainEntry, GroupStats, LockId, RelationConfig, RelationId, SeqNo, StatsDelta, Value,
};

/// Default lock timeout. Long enough that healthy same-group contention
/// serializes, short enough that tests for the retryable path finish
/// quickly.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
struct GroupState {
    /// Entries indexed by `seq - 1`; the vector is the chain.
    entries: Vec<ChainEntry>,
}

#[derive(Debug, Clone, Default)]
struct RelationState {
    groups: BTreeMap<Value, GroupState>,
    stats: BTreeMap<Value, GroupStats>,
}

#[derive(Debug, Default)]
struct DurableState {
    relations: BTreeMap<u64, RelationState>,
    /// Configurations persisted as JSON blobs, the way a host would
    /// store them in its own catalog.
    configs: BTreeMap<u64, String>,
}

#[derive(Debug, Default)]
struct LockTable {
    /// Lock id -> owning transaction.
    held: BTreeMap<u64, u64>,
}

#[derive(Debug)]
struct HostInner {
    durable: Mutex<DurableState>,
    locks: Mutex<LockTable>,
    lock_released: Condvar,
    lock_timeout: Duration,
    next_txn_id: AtomicU64,
    /// Instrumentation: total additive statistics upserts ever applied.
    stats_upserts: AtomicU64,
}

/// Shared in-memory host. Cloning shares the same durable state and
/// lock table, so one host can serve many threads.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    inner: Arc<HostInner>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// Host with the default lock timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Host with an explicit lock timeout.
    #[must_use]
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(HostInner {
                durable: Mutex::new(DurableState::default()),
                locks: Mutex::new(LockTable::default()),
                lock_released: Condvar::new(),
                lock_timeout,
                next_txn_id: AtomicU64::new(1),
                stats_upserts: AtomicU64::new(0),
            }),
        }
    }

    /// Begin a transaction.
    #[must_use]
    pub fn begin(&self) -> MemoryTxn {
        let txn_id = self.inner.next_txn_id.fetch_add(1, Ordering::Relaxed);
        MemoryTxn {
            host: self.clone(),
            txn_id,
            staged: BTreeMap::new(),
            held_locks: Vec::new(),
            finished: false,
        }
    }

    /// Total additive statistics upserts applied since the host was
    /// created. Tests use this to assert flush batching is
    /// O(distinct groups).
    #[must_use]
    pub fn stats_upsert_count(&self) -> u64 {
        self.inner.stats_upserts.load(Ordering::Relaxed)
    }

    /// Simulate a crash and restart: a fresh host carrying only the
    /// committed state. Transactions still open against the old host
    /// are simply never committed, exactly like a process that died
    /// mid-transaction.
    #[must_use]
    pub fn restart(&self) -> Self {
        let durable = self.inner.durable.lock();
        let copied = DurableState {
            relations: durable.relations.clone(),
            configs: durable.configs.clone(),
        };
        Self {
            inner: Arc::new(HostInner {
                durable: Mutex::new(copied),
                locks: Mutex::new(LockTable::default()),
                lock_released: Condvar::new(),
                lock_timeout: self.inner.lock_timeout,
                next_txn_id: AtomicU64::new(1),
                stats_upserts: AtomicU64::new(0),
            }),
        }
    }

    fn release_locks(&self, txn_id: u64, held: &[u64]) {
        if held.is_empty() {
            return;
        }
        let mut table = self.inner.locks.lock();
        for lock in held {
            if table.held.get(lock) == Some(&txn_id) {
                table.held.remove(lock);
            }
        }
        drop(table);
        self.inner.lock_released.notify_all();
    }
}

/// Copy-on-write overlay for one relation inside one transaction.
#[derive(Debug, Default)]
struct StagedRelation {
    /// Set by truncate: durable groups/stats below are dead for this
    /// transaction's view and get wiped at commit.
    cleared: bool,
    /// Staged group chains (whole-group snapshots).
    groups: BTreeMap<Value, GroupState>,
    /// Staged statistics rows; `None` marks a removed row.
    stats: BTreeMap<Value, Option<GroupStats>>,
}

/// One transaction's view of a [`MemoryHost`].
///
/// Reads observe the transaction's own staged writes over the durable
/// state; writes stage. [`MemoryTxn::commit`] publishes, dropping or
/// [`MemoryTxn::abort`]ing discards. Locks release either way.
#[derive(Debug)]
pub struct MemoryTxn {
    host: MemoryHost,
    txn_id: u64,
    staged: BTreeMap<u64, StagedRelation>,
    held_locks: Vec<u64>,
    finished: bool,
}

impl MemoryTxn {
    /// This transaction's id (diagnostics).
    #[must_use]
    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    /// Publish staged writes and release locks.
    pub fn commit(mut self) {
        {
            let mut durable = self.host.inner.durable.lock();
            for (rel, staged) in std::mem::take(&mut self.staged) {
                let state = durable.relations.entry(rel).or_default();
                if staged.cleared {
                    state.groups.clear();
                    state.stats.clear();
                }
                for (group, group_state) in staged.groups {
                    if group_state.entries.is_empty() {
                        state.groups.remove(&group);
                    } else {
                        state.groups.insert(group, group_state);
                    }
                }
                for (group, stats) in staged.stats {
                    match stats {
                        Some(s) => {
                            state.stats.insert(group, s);
                        }
                        None => {
                            state.stats.remove(&group);
                        }
                    }
                }
            }
        }
        debug!(txn_id = self.txn_id, "transaction committed");
        self.finish();
    }

    /// Discard staged writes and release locks.
    pub fn abort(mut self) {
        self.staged.clear();
        debug!(txn_id = self.txn_id, "transaction aborted");
        self.finish();
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            let held = std::mem::take(&mut self.held_locks);
            self.host.release_locks(self.txn_id, &held);
        }
    }

    /// Staged group snapshot if present, otherwise a copy-on-write view
    /// decision against durable state.
    fn group_view<'a>(
        durable: &'a DurableState,
        staged: Option<&'a StagedRelation>,
        relation: u64,
        group: &Value,
    ) -> Option<&'a GroupState> {
        if let Some(staged) = staged {
            if let Some(state) = staged.groups.get(group) {
                return Some(state);
            }
            if staged.cleared {
                return None;
            }
        }
        durable
            .relations
            .get(&relation)
            .and_then(|r| r.groups.get(group))
    }

    /// Mutable staged copy of one group, cloned from durable state on
    /// first touch.
    fn staged_group_mut(&mut self, relation: u64, group: &Value) -> &mut GroupState {
        let durable = self.host.inner.durable.lock();
        let staged = self.staged.entry(relation).or_default();
        if !staged.groups.contains_key(group) {
            let snapshot = if staged.cleared {
                GroupState::default()
            } else {
                durable
                    .relations
                    .get(&relation)
                    .and_then(|r| r.groups.get(group))
                    .cloned()
                    .unwrap_or_default()
            };
            staged.groups.insert(group.clone(), snapshot);
        }
        drop(durable);
        self.staged
            .get_mut(&relation)
            .and_then(|s| s.groups.get_mut(group))
            .unwrap_or_else(|| unreachable!("staged group inserted above"))
    }

    fn staged_stats_value(&self, relation: u64, group: &Value) -> Option<GroupStats> {
        let durable = self.host.inner.durable.lock();
        let staged = self.staged.get(&relation);
        if let Some(staged) = staged {
            if let Some(row) = staged.stats.get(group) {
                return *row;
            }
            if staged.cleared {
                return None;
            }
        }
        durable
            .relations
            .get(&relation)
            .and_then(|r| r.stats.get(group).copied())
    }
}

impl Drop for MemoryTxn {
    fn drop(&mut self) {
        // A dropped, uncommitted transaction behaves like an abort.
        self.finish();
    }
}

impl StorageBackend for MemoryTxn {
    fn append_entry(
        &mut self,
        relation: RelationId,
        group: &Value,
        entry: ChainEntry,
    ) -> Result<()> {
        let state = self.staged_group_mut(relation.get(), group);
        let expected = state.entries.len() as u64 + 1;
        if entry.seq.get() != expected {
            return Err(ChainError::internal(format!(
                "append out of order: seq {} where {expected} expected",
                entry.seq
            )));
        }
        state.entries.push(entry);
        Ok(())
    }

    fn fetch_entry(
        &self,
        relation: RelationId,
        group: &Value,
        seq: SeqNo,
    ) -> Result<Option<ChainEntry>> {
        let durable = self.host.inner.durable.lock();
        let state = Self::group_view(
            &durable,
            self.staged.get(&relation.get()),
            relation.get(),
            group,
        );
        Ok(state.and_then(|g| g.entries.get((seq.get() - 1) as usize).cloned()))
    }

    fn max_seq(&self, relation: RelationId, group: &Value) -> Result<Option<SeqNo>> {
        let durable = self.host.inner.durable.lock();
        let state = Self::group_view(
            &durable,
            self.staged.get(&relation.get()),
            relation.get(),
            group,
        );
        Ok(state.and_then(|g| SeqNo::new(g.entries.len() as u64)))
    }

    fn find_seq_by_order(
        &self,
        relation: RelationId,
        group: &Value,
        order_key: &Value,
    ) -> Result<Option<SeqNo>> {
        let durable = self.host.inner.durable.lock();
        let state = Self::group_view(
            &durable,
            self.staged.get(&relation.get()),
            relation.get(),
            group,
        );
        Ok(state.and_then(|g| {
            g.entries
                .iter()
                .position(|e| e.order_key == *order_key)
                .and_then(|idx| SeqNo::new(idx as u64 + 1))
        }))
    }

    fn remove_tail(
        &mut self,
        relation: RelationId,
        group: &Value,
        from: SeqNo,
    ) -> Result<Vec<ChainEntry>> {
        let state = self.staged_group_mut(relation.get(), group);
        let keep = (from.get() - 1) as usize;
        if keep >= state.entries.len() {
            return Ok(Vec::new());
        }
        Ok(state.entries.split_off(keep))
    }

    fn groups(&self, relation: RelationId) -> Result<Vec<Value>> {
        let durable = self.host.inner.durable.lock();
        let staged = self.staged.get(&relation.get());
        let mut merged: BTreeMap<Value, bool> = BTreeMap::new();

        if !staged.map_or(false, |s| s.cleared) {
            if let Some(state) = durable.relations.get(&relation.get()) {
                for (group, g) in &state.groups {
                    merged.insert(group.clone(), !g.entries.is_empty());
                }
            }
        }
        if let Some(staged) = staged {
            for (group, g) in &staged.groups {
                merged.insert(group.clone(), !g.entries.is_empty());
            }
        }

        Ok(merged
            .into_iter()
            .filter_map(|(group, live)| live.then_some(group))
            .collect())
    }

    fn clear_chains(&mut self, relation: RelationId) -> Result<()> {
        let staged = self.staged.entry(relation.get()).or_default();
        staged.cleared = true;
        staged.groups.clear();
        Ok(())
    }

    fn stats_get(&self, relation: RelationId, group: &Value) -> Result<Option<GroupStats>> {
        Ok(self.staged_stats_value(relation.get(), group))
    }

    fn stats_apply(
        &mut self,
        relation: RelationId,
        group: &Value,
        delta: StatsDelta,
    ) -> Result<()> {
        let current = self.staged_stats_value(relation.get(), group).unwrap_or_default();
        let updated = current.applying(delta);
        let staged = self.staged.entry(relation.get()).or_default();
        staged.stats.insert(
            group.clone(),
            if updated.is_empty() { None } else { Some(updated) },
        );
        self.host.inner.stats_upserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn stats_put(&mut self, relation: RelationId, group: &Value, stats: GroupStats) -> Result<()> {
        let staged = self.staged.entry(relation.get()).or_default();
        staged.stats.insert(group.clone(), Some(stats));
        Ok(())
    }

    fn stats_scan(&self, relation: RelationId) -> Result<Vec<(Value, GroupStats)>> {
        let durable = self.host.inner.durable.lock();
        let staged = self.staged.get(&relation.get());
        let mut merged: BTreeMap<Value, Option<GroupStats>> = BTreeMap::new();

        if !staged.map_or(false, |s| s.cleared) {
            if let Some(state) = durable.relations.get(&relation.get()) {
                for (group, stats) in &state.stats {
                    merged.insert(group.clone(), Some(*stats));
                }
            }
        }
        if let Some(staged) = staged {
            for (group, stats) in &staged.stats {
                merged.insert(group.clone(), *stats);
            }
        }

        Ok(merged
            .into_iter()
            .filter_map(|(group, stats)| stats.map(|s| (group, s)))
            .collect())
    }

    fn clear_stats(&mut self, relation: RelationId) -> Result<()> {
        let mut removed: Vec<Value> = Vec::new();
        {
            let durable = self.host.inner.durable.lock();
            if let Some(state) = durable.relations.get(&relation.get()) {
                removed.extend(state.stats.keys().cloned());
            }
        }
        let staged = self.staged.entry(relation.get()).or_default();
        let staged_keys: Vec<Value> = staged.stats.keys().cloned().collect();
        for group in staged_keys.into_iter().chain(removed) {
            staged.stats.insert(group, None);
        }
        Ok(())
    }

    fn config_load(&self, relation: RelationId) -> Result<Option<RelationConfig>> {
        let durable = self.host.inner.durable.lock();
        match durable.configs.get(&relation.get()) {
            None => Ok(None),
            Some(blob) => serde_json::from_str(blob)
                .map(Some)
                .map_err(|e| ChainError::internal(format!("stored configuration unreadable: {e}"))),
        }
    }

    fn config_store(&mut self, config: &RelationConfig) -> Result<()> {
        let blob = serde_json::to_string(config)
            .map_err(|e| ChainError::internal(format!("configuration serialization: {e}")))?;
        let mut durable = self.host.inner.durable.lock();
        durable.configs.insert(config.relation.get(), blob);
        Ok(())
    }
}

impl TransactionContext for MemoryTxn {
    fn acquire_group_lock(&mut self, lock: LockId) -> Result<()> {
        let raw = lock.get();
        let deadline = Instant::now() + self.host.inner.lock_timeout;
        let mut table = self.host.inner.locks.lock();
        loop {
            match table.held.get(&raw) {
                None => {
                    table.held.insert(raw, self.txn_id);
                    self.held_locks.push(raw);
                    return Ok(());
                }
                Some(&owner) if owner == self.txn_id => return Ok(()),
                Some(_) => {
                    let timed_out = self
                        .host
                        .inner
                        .lock_released
                        .wait_until(&mut table, deadline)
                        .timed_out();
                    if timed_out && table.held.contains_key(&raw) {
                        return Err(ChainError::LockNotAvailable { lock_id: raw });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn entry(seq: u64, order: i64) -> ChainEntry {
        ChainEntry {
            seq: SeqNo::new(seq).unwrap(),
            order_key: Value::Integer(order),
            raw_len: 4,
            image: vec![seq as u8; 8],
        }
    }

    #[test]
    fn staged_writes_are_invisible_until_commit() {
        let host = MemoryHost::new();
        let rel = RelationId::new(1);
        let group = Value::Integer(10);

        let mut txn = host.begin();
        txn.append_entry(rel, &group, entry(1, 100)).unwrap();
        assert!(txn.fetch_entry(rel, &group, SeqNo::FIRST).unwrap().is_some());

        let other = host.begin();
        assert!(other
            .fetch_entry(rel, &group, SeqNo::FIRST)
            .unwrap()
            .is_none());
        drop(other);

        txn.commit();
        let after = host.begin();
        assert!(after
            .fetch_entry(rel, &group, SeqNo::FIRST)
            .unwrap()
            .is_some());
    }

    #[test]
    fn abort_discards_staged_writes() {
        let host = MemoryHost::new();
        let rel = RelationId::new(1);
        let group = Value::Integer(10);

        let mut txn = host.begin();
        txn.append_entry(rel, &group, entry(1, 100)).unwrap();
        txn.abort();

        let after = host.begin();
        assert!(after.max_seq(rel, &group).unwrap().is_none());
    }

    #[test]
    fn out_of_order_append_is_rejected() {
        let host = MemoryHost::new();
        let mut txn = host.begin();
        let err = txn
            .append_entry(RelationId::new(1), &Value::Integer(1), entry(3, 1))
            .unwrap_err();
        assert!(matches!(err, ChainError::Internal(_)));
    }

    #[test]
    fn lock_conflict_times_out_and_release_unblocks() {
        let host = MemoryHost::with_lock_timeout(Duration::from_millis(50));
        let lock = LockId::new(7);

        let mut holder = host.begin();
        holder.acquire_group_lock(lock).unwrap();
        // Re-acquisition by the holder is a no-op.
        holder.acquire_group_lock(lock).unwrap();

        let mut contender = host.begin();
        let err = contender.acquire_group_lock(lock).unwrap_err();
        assert!(matches!(err, ChainError::LockNotAvailable { lock_id: 7 }));

        holder.commit();
        contender.acquire_group_lock(lock).unwrap();
    }

    #[test]
    fn dropped_transaction_releases_its_locks() {
        let host = MemoryHost::with_lock_timeout(Duration::from_millis(200));
        let lock = LockId::new(9);

        {
            let mut holder = host.begin();
            holder.acquire_group_lock(lock).unwrap();
        }

        let mut next = host.begin();
        next.acquire_group_lock(lock).unwrap();
    }

    #[test]
    fn blocked_acquire_succeeds_once_holder_commits() {
        let host = MemoryHost::with_lock_timeout(Duration::from_secs(2));
        let lock = LockId::new(11);

        let mut holder = host.begin();
        holder.acquire_group_lock(lock).unwrap();

        let host2 = host.clone();
        let waiter = thread::spawn(move || {
            let mut txn = host2.begin();
            txn.acquire_group_lock(lock).unwrap();
            txn.commit();
        });

        thread::sleep(Duration::from_millis(30));
        holder.commit();
        waiter.join().unwrap();
    }

    #[test]
    fn restart_keeps_only_committed_state() {
        let host = MemoryHost::new();
        let rel = RelationId::new(1);
        let committed = Value::Integer(1);
        let uncommitted = Value::Integer(2);

        let mut txn = host.begin();
        txn.append_entry(rel, &committed, entry(1, 1)).unwrap();
        txn.commit();

        let mut open = host.begin();
        open.append_entry(rel, &uncommitted, entry(1, 1)).unwrap();

        let revived = host.restart();
        drop(open);
        let view = revived.begin();
        assert!(view.max_seq(rel, &committed).unwrap().is_some());
        assert!(view.max_seq(rel, &uncommitted).unwrap().is_none());
    }

    #[test]
    fn config_round_trips_through_json_blob() {
        let host = MemoryHost::new();
        let config = RelationConfig {
            relation: RelationId::new(4),
            group_column: "g".to_owned(),
            order_column: "o".to_owned(),
            delta_columns: vec!["body".to_owned()],
            keyframe_every: 5,
            compress_depth: 3,
        };
        let mut txn = host.begin();
        txn.config_store(&config).unwrap();
        drop(txn);

        let view = host.begin();
        assert_eq!(
            view.config_load(RelationId::new(4)).unwrap(),
            Some(config)
        );
    }
}
