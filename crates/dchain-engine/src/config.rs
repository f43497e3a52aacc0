//! Relation configuration: validation and the registry cache.
//!
//! Configurations are validated once, against the host's column list,
//! when the relation is placed under management. The registry is an
//! explicit lifecycle-managed cache from relation identity to immutable
//! [`RelationConfig`]; it is populated on configure or first use and
//! invalidated only by explicit reconfiguration.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use dchain_error::{ChainError, Result};
use dchain_types::{ColumnSpec, RelationConfig, RelationId, MAX_COMPRESS_DEPTH};

use crate::storage::StorageBackend;

/// A configuration request as the host surface hands it over, before
/// validation against the relation's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRequest {
    /// Relation to manage.
    pub relation: RelationId,
    /// Group-by column name.
    pub group_by: String,
    /// Order-by column name.
    pub order_by: String,
    /// Delta-compressed content columns.
    pub delta_columns: Vec<String>,
    /// Keyframe interval K.
    pub keyframe_every: u32,
    /// Compression depth D.
    pub compress_depth: u16,
}

/// Validate a request against the relation's columns and produce the
/// immutable configuration.
///
/// # Errors
///
/// Returns a configuration error for an unknown or duplicated column, a
/// nullable or non-byte-like delta column, an empty delta column list,
/// or numeric parameters outside their bounds (the compression depth
/// must stay below the persisted tag field's keyframe sentinel).
pub fn validate(request: &ConfigRequest, columns: &[ColumnSpec]) -> Result<RelationConfig> {
    if request.keyframe_every < 1 {
        return Err(ChainError::KeyframeIntervalOutOfRange {
            value: u64::from(request.keyframe_every),
        });
    }
    if request.compress_depth < 1 || request.compress_depth > MAX_COMPRESS_DEPTH {
        return Err(ChainError::CompressDepthOutOfRange {
            value: u64::from(request.compress_depth),
            max: MAX_COMPRESS_DEPTH,
        });
    }
    if request.delta_columns.is_empty() {
        return Err(ChainError::NoDeltaColumns);
    }

    let lookup = |name: &str| -> Result<&ColumnSpec> {
        columns.iter().find(|c| c.name == name).ok_or_else(|| {
            ChainError::UnknownColumn {
                relation: request.relation.get(),
                column: name.to_owned(),
            }
        })
    };

    lookup(&request.group_by)?;
    lookup(&request.order_by)?;

    let mut seen: Vec<&str> = vec![&request.group_by, &request.order_by];
    for name in &request.delta_columns {
        let spec = lookup(name)?;
        if seen.contains(&name.as_str()) {
            return Err(ChainError::DuplicateColumn {
                column: name.clone(),
            });
        }
        seen.push(name);
        if spec.nullable {
            return Err(ChainError::NullableDeltaColumn {
                column: name.clone(),
            });
        }
        if !spec.kind.is_delta_capable() {
            return Err(ChainError::UnsupportedColumnKind {
                column: name.clone(),
                kind: spec.kind.name().to_owned(),
            });
        }
    }

    Ok(RelationConfig {
        relation: request.relation,
        group_column: request.group_by.clone(),
        order_column: request.order_by.clone(),
        delta_columns: request.delta_columns.clone(),
        keyframe_every: request.keyframe_every,
        compress_depth: request.compress_depth,
    })
}

/// Process-local cache of relation configurations.
///
/// Shared-read, rare-write: lookups take the read lock, configure and
/// invalidate take the write lock.
#[derive(Debug, Default)]
pub struct ConfigRegistry {
    cached: RwLock<HashMap<RelationId, Arc<RelationConfig>>>,
}

impl ConfigRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a relation's configuration, consulting the cache first and
    /// falling back to the backend's persisted copy.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NotManaged`] when the relation has no
    /// configuration anywhere.
    pub fn get<S>(&self, storage: &S, relation: RelationId) -> Result<Arc<RelationConfig>>
    where
        S: StorageBackend + ?Sized,
    {
        if let Some(config) = self.cached.read().get(&relation) {
            return Ok(Arc::clone(config));
        }
        let loaded = storage
            .config_load(relation)?
            .ok_or(ChainError::NotManaged {
                relation: relation.get(),
            })?;
        debug!(relation = relation.get(), "configuration loaded into registry");
        let config = Arc::new(loaded);
        self.cached
            .write()
            .insert(relation, Arc::clone(&config));
        Ok(config)
    }

    /// Install a new configuration, persisting it and replacing any
    /// cached entry.
    ///
    /// # Errors
    ///
    /// Propagates backend persistence failures.
    pub fn install<S>(&self, storage: &mut S, config: RelationConfig) -> Result<Arc<RelationConfig>>
    where
        S: StorageBackend + ?Sized,
    {
        storage.config_store(&config)?;
        let relation = config.relation;
        let config = Arc::new(config);
        self.cached
            .write()
            .insert(relation, Arc::clone(&config));
        info!(
            relation = relation.get(),
            keyframe_every = config.keyframe_every,
            compress_depth = config.compress_depth,
            "relation placed under delta-chain management"
        );
        Ok(config)
    }

    /// Drop a cached entry (explicit reconfiguration/invalidations only).
    pub fn invalidate(&self, relation: RelationId) {
        self.cached.write().remove(&relation);
    }
}
