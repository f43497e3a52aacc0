//! Chain planning, reconstruction, deletion, locking, and statistics for
//! DeltaChain.
//!
//! This crate is the engine core. It owns no storage and spawns no
//! threads: physical persistence and transaction lifetime belong to the
//! host and reach the engine through the [`StorageBackend`] and
//! [`TransactionContext`] capability traits. All concurrency control the
//! engine requires is expressed as advisory group locks derived by
//! [`lock::derive`] and acquired through the host before any structural
//! mutation.

pub mod config;
pub mod delete;
pub mod engine;
pub mod lock;
pub mod planner;
pub mod reconstruct;
pub mod stats;
pub mod storage;

pub use config::{ConfigRegistry, ConfigRequest};
pub use engine::{
    Engine, EntryInfo, PhysicalEntry, RelationDescription, RelationStats, WriteTxn,
};
pub use planner::ChainPlan;
pub use stats::{FlushSummary, RebuildReport, StatsAccumulator};
pub use storage::{StorageBackend, TransactionContext};
