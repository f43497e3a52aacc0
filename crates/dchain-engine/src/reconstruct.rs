//! Chain reconstruction.
//!
//! A revision is materialized by walking its base chain down to a
//! keyframe, then folding the codec's `decode` forward. The walk is an
//! explicit loop, not recursion: the hop count is bounded by
//! `ceil((seq - 1) / compress_depth)` but the bound depends on a
//! well-formed chain, and a corrupt tag must surface as an error, not a
//! stack overflow.
//!
//! Any decode failure or missing base is fatal for the read. The chain
//! is malformed at that point and must be reported with enough context
//! (relation, group, seq, tag) to diagnose; it is never silently
//! patched or returned as partial data.

use dchain_codec::{frame, CodecError, DeltaCodec};
use dchain_error::{ChainError, Result};
use dchain_types::{DeltaTag, RelationId, SeqNo, Value};

use crate::storage::StorageBackend;

/// Build the fatal corruption error for one entry.
pub(crate) fn corrupt(
    relation: RelationId,
    group: &Value,
    seq: SeqNo,
    tag: &str,
    detail: impl std::fmt::Display,
) -> ChainError {
    ChainError::ChainCorrupt {
        relation: relation.get(),
        group: group.to_string(),
        seq: seq.get(),
        tag: tag.to_owned(),
        detail: detail.to_string(),
    }
}

fn corrupt_codec(
    relation: RelationId,
    group: &Value,
    seq: SeqNo,
    tag: DeltaTag,
    err: &CodecError,
) -> ChainError {
    corrupt(relation, group, seq, &tag.to_string(), err)
}

/// Reconstruct the full content record of the revision at `seq`.
///
/// # Errors
///
/// Returns [`ChainError::RevisionNotFound`] when the target entry does
/// not exist, and [`ChainError::ChainCorrupt`] when a base entry is
/// missing, a frame is malformed, or a diff fails to decode.
pub fn reconstruct<S, C>(
    storage: &S,
    codec: &C,
    relation: RelationId,
    group: &Value,
    seq: SeqNo,
) -> Result<Vec<u8>>
where
    S: StorageBackend + ?Sized,
    C: DeltaCodec + ?Sized,
{
    // Descend to the keyframe, collecting each frame's tag and payload.
    // The cursor strictly decreases, so the walk always terminates.
    let mut frames: Vec<(SeqNo, DeltaTag, Vec<u8>)> = Vec::new();
    let mut cursor = seq;
    loop {
        let Some(entry) = storage.fetch_entry(relation, group, cursor)? else {
            if cursor == seq {
                return Err(ChainError::RevisionNotFound {
                    group: group.to_string(),
                    at: format!("seq={cursor}"),
                });
            }
            return Err(corrupt(
                relation,
                group,
                cursor,
                "missing",
                "base entry absent from chain",
            ));
        };

        let (tag, payload) = frame::decode_entry(&entry.image)
            .map_err(|e| corrupt(relation, group, cursor, "unreadable", &e))?;
        frames.push((cursor, tag, payload.to_vec()));

        match tag {
            DeltaTag::Keyframe => break,
            DeltaTag::Delta(distance) => {
                cursor = tag.base_of(cursor).ok_or_else(|| {
                    corrupt(
                        relation,
                        group,
                        cursor,
                        &tag.to_string(),
                        format!("base distance {distance} leaves the chain"),
                    )
                })?;
            }
        }
    }

    // Fold forward from the keyframe.
    let mut content: Option<Vec<u8>> = None;
    for (entry_seq, tag, payload) in frames.into_iter().rev() {
        let next = match (tag, content.take()) {
            (DeltaTag::Keyframe, None) => payload,
            (DeltaTag::Delta(_), Some(base)) => codec
                .decode(&base, &payload)
                .map_err(|e| corrupt_codec(relation, group, entry_seq, tag, &e))?,
            _ => {
                return Err(ChainError::internal(
                    "reconstruction fold out of order",
                ))
            }
        };
        content = Some(next);
    }
    content.ok_or_else(|| ChainError::internal("empty reconstruction walk"))
}
