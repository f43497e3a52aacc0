//! Cascade deletion.
//!
//! Deletion is always "truncate this group's tail from this revision":
//! any later entry may transitively use the removed one as a diff base,
//! so an isolated mid-chain removal would strand dangling deltas. The
//! caller-visible order key is resolved to its chain position first;
//! everything at or after that position goes.

use tracing::debug;

use dchain_codec::frame;
use dchain_error::{ChainError, Result};
use dchain_types::{RelationId, SeqNo, StatsDelta, Value};

use crate::reconstruct::corrupt;
use crate::stats::StatsAccumulator;
use crate::storage::StorageBackend;

/// Remove the group's tail starting at the revision with `order_key`.
///
/// The caller holds the group lock. Removed entries are accounted into
/// `stats` by their exact counters (row, keyframe, raw and stored
/// bytes). Returns the number of entries removed.
///
/// # Errors
///
/// Returns [`ChainError::RevisionNotFound`] when no revision carries the
/// order key, and [`ChainError::ChainCorrupt`] when a removed entry's
/// frame cannot be read back for accounting.
pub fn cascade_delete<S>(
    storage: &mut S,
    stats: &mut StatsAccumulator,
    relation: RelationId,
    group: &Value,
    order_key: &Value,
) -> Result<u64>
where
    S: StorageBackend + ?Sized,
{
    let target = storage
        .find_seq_by_order(relation, group, order_key)?
        .ok_or_else(|| ChainError::RevisionNotFound {
            group: group.to_string(),
            at: format!("order_key={order_key}"),
        })?;

    let removed = storage.remove_tail(relation, group, target)?;
    for entry in &removed {
        let (tag, _) = frame::decode_entry(&entry.image)
            .map_err(|e| corrupt(relation, group, entry.seq, "unreadable", &e))?;
        stats.record(
            relation,
            group,
            StatsDelta::remove(
                tag.is_keyframe(),
                u64::from(entry.raw_len),
                entry.image.len() as u64,
            ),
        );
    }

    let removed_count = removed.len() as u64;
    debug!(
        relation = relation.get(),
        group = %group,
        from_seq = target.get(),
        removed = removed_count,
        "cascade-deleted chain tail"
    );
    Ok(removed_count)
}

/// Resolve where a cascade starting at `order_key` would begin, without
/// mutating anything. Introspection helper.
///
/// # Errors
///
/// Returns [`ChainError::RevisionNotFound`] when no revision carries the
/// order key.
pub fn resolve_target<S>(
    storage: &S,
    relation: RelationId,
    group: &Value,
    order_key: &Value,
) -> Result<SeqNo>
where
    S: StorageBackend + ?Sized,
{
    storage
        .find_seq_by_order(relation, group, order_key)?
        .ok_or_else(|| ChainError::RevisionNotFound {
            group: group.to_string(),
            at: format!("order_key={order_key}"),
        })
}
