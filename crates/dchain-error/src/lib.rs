//! Unified error taxonomy for DeltaChain operations.
//!
//! Structured variants for every caller-distinguishable failure, grouped
//! by concern, with classification helpers so hosts can decide between
//! retrying, surfacing, and repairing. Subsystems with a closed internal
//! error set (the codec) keep their own error enums and are folded into
//! this taxonomy at the engine boundary with full context attached.

use thiserror::Error;

/// Primary error type for DeltaChain operations.
#[derive(Error, Debug)]
pub enum ChainError {
    // === Configuration errors ===
    /// A configured column does not exist in the relation.
    #[error("no such column in relation {relation}: {column}")]
    UnknownColumn { relation: u64, column: String },

    /// A delta column admits nulls; delta content must always be present.
    #[error("delta column must be declared NOT NULL: {column}")]
    NullableDeltaColumn { column: String },

    /// A delta column is not a variable-length byte/text-like type.
    #[error("delta column {column} has unsupported type {kind}")]
    UnsupportedColumnKind { column: String, kind: String },

    /// The same column plays two configured roles.
    #[error("column {column} appears more than once in the configuration")]
    DuplicateColumn { column: String },

    /// No delta columns were configured.
    #[error("configuration declares no delta columns")]
    NoDeltaColumns,

    /// Keyframe interval outside `1..`.
    #[error("keyframe interval out of range: {value} (must be >= 1)")]
    KeyframeIntervalOutOfRange { value: u64 },

    /// Compression depth outside `1..=max` (the persisted tag field
    /// reserves its maximum value as the keyframe sentinel).
    #[error("compression depth out of range: {value} (must be in 1..={max})")]
    CompressDepthOutOfRange { value: u64, max: u16 },

    // === Constraint violations ===
    /// Insert with a null group key. Rejected before any physical append.
    #[error("group key must not be NULL")]
    NullGroupKey,

    /// Order key is not strictly greater than the group's current
    /// maximum. Revisions are append-only in order-key order.
    #[error("order key {order_key} does not advance group {group} (current maximum {current_max})")]
    OrderConflict {
        group: String,
        order_key: String,
        current_max: String,
    },

    /// The number of content payloads does not match the configured
    /// delta columns.
    #[error("expected {expected} delta column payloads, got {actual}")]
    ColumnCountMismatch { expected: usize, actual: usize },

    /// A content payload exceeds the storable size limit.
    #[error("content payload too large: {len} bytes")]
    PayloadTooLarge { len: usize },

    // === Unsupported operations ===
    /// An operation the engine rejects unconditionally, named.
    #[error("operation not supported on delta-chain relations: {operation}")]
    Unsupported { operation: &'static str },

    // === Relation management ===
    /// A call against a relation without a configuration.
    #[error("relation {relation} is not managed by the delta-chain engine")]
    NotManaged { relation: u64 },

    // === Chain reads ===
    /// The requested revision does not exist.
    #[error("no revision at {at} in group {group}")]
    RevisionNotFound { group: String, at: String },

    /// The requested group has no rows.
    #[error("group {group} has no revisions")]
    GroupNotFound { group: String },

    /// The chain is malformed: a decode failed or a base entry is
    /// missing. Fatal, never silently recovered.
    #[error("chain corrupt in relation {relation}, group {group}, seq {seq}, tag {tag}: {detail}")]
    ChainCorrupt {
        relation: u64,
        group: String,
        seq: u64,
        tag: String,
        detail: String,
    },

    // === Concurrency ===
    /// Group lock could not be acquired within the host's timeout.
    /// Transient; the caller may retry. No state was mutated.
    #[error("group lock {lock_id:#018x} not available")]
    LockNotAvailable { lock_id: u64 },

    // === Internal ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChainError {
    /// Whether this is a transient condition that may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::LockNotAvailable { .. })
    }

    /// Whether the user can likely fix this without engine repair.
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownColumn { .. }
                | Self::NullableDeltaColumn { .. }
                | Self::UnsupportedColumnKind { .. }
                | Self::DuplicateColumn { .. }
                | Self::NoDeltaColumns
                | Self::KeyframeIntervalOutOfRange { .. }
                | Self::CompressDepthOutOfRange { .. }
                | Self::NullGroupKey
                | Self::OrderConflict { .. }
                | Self::ColumnCountMismatch { .. }
                | Self::PayloadTooLarge { .. }
                | Self::Unsupported { .. }
                | Self::NotManaged { .. }
                | Self::LockNotAvailable { .. }
        )
    }

    /// Whether this error indicates stored-state damage that needs
    /// repair rather than a caller-side fix.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::ChainCorrupt { .. })
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an unsupported-operation error.
    #[must_use]
    pub const fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }
}

/// Result type alias using `ChainError`.
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unsupported_names_the_operation() {
        let err = ChainError::unsupported("UPDATE");
        assert_eq!(
            err.to_string(),
            "operation not supported on delta-chain relations: UPDATE"
        );
    }

    #[test]
    fn display_chain_corrupt_carries_context() {
        let err = ChainError::ChainCorrupt {
            relation: 7,
            group: "42".to_owned(),
            seq: 9,
            tag: "delta-3".to_owned(),
            detail: "diff checksum mismatch".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("relation 7"));
        assert!(msg.contains("group 42"));
        assert!(msg.contains("seq 9"));
        assert!(msg.contains("delta-3"));
        assert!(msg.contains("checksum"));
    }

    #[test]
    fn lock_not_available_is_transient() {
        let err = ChainError::LockNotAvailable { lock_id: 0xbeef };
        assert!(err.is_transient());
        assert!(err.is_user_recoverable());
        assert!(!err.is_corruption());
    }

    #[test]
    fn corruption_is_not_transient() {
        let err = ChainError::ChainCorrupt {
            relation: 1,
            group: "g".to_owned(),
            seq: 2,
            tag: "delta-1".to_owned(),
            detail: "truncated".to_owned(),
        };
        assert!(err.is_corruption());
        assert!(!err.is_transient());
        assert!(!err.is_user_recoverable());
    }

    #[test]
    fn config_errors_are_user_recoverable() {
        assert!(ChainError::NullableDeltaColumn {
            column: "body".to_owned()
        }
        .is_user_recoverable());
        assert!(ChainError::CompressDepthOutOfRange {
            value: 100_000,
            max: u16::MAX - 1,
        }
        .is_user_recoverable());
        assert!(!ChainError::internal("bug").is_user_recoverable());
    }

    #[test]
    fn null_group_key_display() {
        assert_eq!(
            ChainError::NullGroupKey.to_string(),
            "group key must not be NULL"
        );
    }
}
