//! Pool manager error types.

use thiserror::Error;

/// Failure of a single resource group operation.
///
/// During target distribution these are isolated per group: counted,
/// logged, and skipped.
#[derive(Debug, Error)]
pub enum ResourceGroupError {
    #[error("resource group {group_id}: {message}")]
    Failed { group_id: String, message: String },

    #[error("resource group {0} cannot be marked stale")]
    MarkStaleUnsupported(String),

    #[error("invalid resource group config: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors that can occur during pool management.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no resource groups available")]
    NoResourceGroups,

    #[error("all resource groups are stale")]
    AllResourceGroupsAreStale,

    #[error("invalid pool configuration: {0}")]
    Config(String),

    #[error("invalid target capacity {0:?}: expected \"min\", \"max\" or a number")]
    InvalidTargetCapacity(String),

    #[error("failed to load {kind} resource groups: {source}")]
    LoadResourceGroups {
        kind: String,
        #[source]
        source: ResourceGroupError,
    },

    #[error("resource group {group_id}: {source}")]
    ResourceGroup {
        group_id: String,
        #[source]
        source: ResourceGroupError,
    },

    #[error("draining client error: {0}")]
    Draining(#[source] anyhow::Error),

    #[error("cluster connector error: {0}")]
    Connector(#[from] anyhow::Error),
}

pub type PoolResult<T> = Result<T, PoolError>;
