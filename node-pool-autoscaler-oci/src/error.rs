use crate::client::ApiError;

#[derive(thiserror::Error, Debug)]
pub enum OciError {
    /// The instance belongs to a node pool this autoscaler does not manage.
    #[error("node pool not found for instance")]
    InstanceNodePoolNotFound,
    #[error("node pool {0} not found in cache")]
    NodePoolNotInCache(String),
    #[error("target size not found in cache for node pool {0}")]
    TargetSizeNotFound(String),
    #[error("no node pool in cache contains instance {0}")]
    NodePoolNotInCacheForInstance(String),
    #[error("node {0:?} has no instance id")]
    MissingInstanceId(String),
    #[error("failed to delete instance {instance_id} from node pool {node_pool_id}")]
    DeleteRejected {
        node_pool_id: String,
        instance_id: String,
        #[source]
        source: ApiError,
    },
}

/// True when `err` is the "not managed by this autoscaler" sentinel.
pub fn is_not_managed(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<OciError>(),
        Some(OciError::InstanceNodePoolNotFound)
    )
}
