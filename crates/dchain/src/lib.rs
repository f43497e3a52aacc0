//! DeltaChain: a versioned, delta-compressed storage engine core.
//!
//! Each logical record (a *group*) owns a chronological chain of
//! revisions ordered by an *order key*. Early revisions are stored as
//! full keyframes, later ones as binary diffs against an earlier
//! revision; any revision reconstructs on demand. Writers serialize per
//! group through advisory locks derived from a content fingerprint, and
//! per-group statistics accumulate in batches that flush once per
//! distinct group at commit.
//!
//! This crate is the public facade: it re-exports the engine surface,
//! the capability traits a host implements, and the core types.
//!
//! ```
//! use dchain::{ColumnKind, ColumnSpec, ConfigRequest, Engine, RelationId, Value, WriteTxn};
//! use dchain_harness::MemoryHost;
//!
//! let engine = Engine::new();
//! let host = MemoryHost::new();
//! let relation = RelationId::new(1);
//!
//! let columns = [
//!     ColumnSpec::new("doc_id", ColumnKind::Integer, false),
//!     ColumnSpec::new("version", ColumnKind::Integer, false),
//!     ColumnSpec::new("body", ColumnKind::Text, false),
//! ];
//! let request = ConfigRequest {
//!     relation,
//!     group_by: "doc_id".into(),
//!     order_by: "version".into(),
//!     delta_columns: vec!["body".into()],
//!     keyframe_every: 10,
//!     compress_depth: 4,
//! };
//!
//! let mut setup = host.begin();
//! engine.configure(&mut setup, &request, &columns).unwrap();
//! setup.commit();
//!
//! let mut txn = host.begin();
//! let mut write = WriteTxn::new(&mut txn);
//! let group = Value::Integer(7);
//! engine
//!     .insert(&mut write, relation, &group, &Value::Integer(1), &[b"first draft"])
//!     .unwrap();
//! write.flush_stats().unwrap();
//! drop(write);
//! txn.commit();
//!
//! let reader = host.begin();
//! let columns = engine
//!     .read(&reader, relation, &group, &Value::Integer(1))
//!     .unwrap();
//! assert_eq!(columns, vec![b"first draft".to_vec()]);
//! ```

pub use dchain_codec::{block, content, frame, BlockDelta, CodecError, DeltaCodec};
pub use dchain_engine::{
    lock, ChainPlan, ConfigRegistry, ConfigRequest, Engine, EntryInfo, FlushSummary,
    PhysicalEntry, RebuildReport, RelationDescription, RelationStats, StatsAccumulator,
    StorageBackend, TransactionContext, WriteTxn,
};
pub use dchain_error::{ChainError, Result};
pub use dchain_types::{
    ChainEntry, ColumnKind, ColumnSpec, DeltaTag, GroupStats, LockId, RelationConfig, RelationId,
    SeqNo, StatsDelta, Value, KEYFRAME_SENTINEL, MAX_COMPRESS_DEPTH,
};
