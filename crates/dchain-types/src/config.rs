//! Per-relation configuration.
//!
//! A [`RelationConfig`] is immutable once built: reconfiguration replaces
//! the whole value and invalidates the registry entry in the engine.
//! Validation against the relation's column list happens in
//! `dchain-engine`, where the unified error taxonomy lives; this module
//! only enforces the numeric bounds intrinsic to the types.

use crate::{RelationId, MAX_COMPRESS_DEPTH};

/// Column kinds the engine distinguishes.
///
/// Delta columns must be variable-length byte/text-like; everything else
/// is only ever used as a group or order key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ColumnKind {
    /// 64-bit signed integer.
    Integer,
    /// Variable-length UTF-8 text.
    Text,
    /// Variable-length raw bytes.
    Bytes,
    /// Anything else the host schema may contain.
    Other,
}

impl ColumnKind {
    /// Whether a column of this kind may be declared as a delta column.
    #[must_use]
    pub const fn is_delta_capable(self) -> bool {
        matches!(self, Self::Text | Self::Bytes)
    }

    /// Short name for diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Other => "other",
        }
    }
}

/// Host-supplied description of one relation column, used to validate a
/// configuration request.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ColumnSpec {
    /// Column name as the host knows it.
    pub name: String,
    /// Column kind.
    pub kind: ColumnKind,
    /// Whether the column admits nulls.
    pub nullable: bool,
}

impl ColumnSpec {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ColumnKind, nullable: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable,
        }
    }
}

/// Immutable per-relation configuration.
///
/// Loaded once per relation and cached in the engine's registry;
/// invalidated only by explicit reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RelationConfig {
    /// The relation this configuration belongs to.
    pub relation: RelationId,
    /// Name of the group-by column; each distinct value defines an
    /// independent chain.
    pub group_column: String,
    /// Name of the order-by column; strictly increasing within a group.
    pub order_column: String,
    /// Delta-compressed content columns, in declaration order.
    pub delta_columns: Vec<String>,
    /// Keyframe interval K: every entry at `(seq - 1) % K == 0` is forced
    /// to be a keyframe. `K = 1` stores every revision in full.
    pub keyframe_every: u32,
    /// Compression depth D: maximum delta tag distance. Bounded above by
    /// the persisted tag field's keyframe sentinel.
    pub compress_depth: u16,
}

impl RelationConfig {
    /// Whether the entry at `seq_raw` (1-based) must be a keyframe under
    /// this configuration.
    #[inline]
    #[must_use]
    pub const fn forces_keyframe(&self, seq_raw: u64) -> bool {
        (seq_raw.saturating_sub(1)) % (self.keyframe_every as u64) == 0
    }

    /// Whether the numeric parameters are within their intrinsic bounds.
    ///
    /// Column-level validation needs the host's column list and lives in
    /// the engine's configuration module.
    #[must_use]
    pub const fn bounds_ok(&self) -> bool {
        self.keyframe_every >= 1
            && self.compress_depth >= 1
            && self.compress_depth <= MAX_COMPRESS_DEPTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(keyframe_every: u32, compress_depth: u16) -> RelationConfig {
        RelationConfig {
            relation: RelationId::new(1),
            group_column: "doc_id".to_owned(),
            order_column: "version".to_owned(),
            delta_columns: vec!["body".to_owned()],
            keyframe_every,
            compress_depth,
        }
    }

    #[test]
    fn keyframe_interval_one_forces_everything() {
        let cfg = config(1, 8);
        for seq in 1..=32u64 {
            assert!(cfg.forces_keyframe(seq), "seq {seq}");
        }
    }

    #[test]
    fn keyframe_interval_five_forces_1_6_11() {
        let cfg = config(5, 8);
        let forced: Vec<u64> = (1..=25).filter(|&s| cfg.forces_keyframe(s)).collect();
        assert_eq!(forced, vec![1, 6, 11, 16, 21]);
    }

    #[test]
    fn bounds_checks() {
        assert!(config(1, 1).bounds_ok());
        assert!(config(1, MAX_COMPRESS_DEPTH).bounds_ok());
        assert!(!config(0, 1).bounds_ok());
        assert!(!config(1, 0).bounds_ok());
        assert!(!config(1, MAX_COMPRESS_DEPTH + 1).bounds_ok());
    }

    #[test]
    fn serde_round_trip() {
        let cfg = config(5, 8);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: RelationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
