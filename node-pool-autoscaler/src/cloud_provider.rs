use crate::model::Instance;
use anyhow::Error;
use k8s_openapi::api::core::v1::Node;

/// Sentinel errors shared by every provider.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ProviderError {
    #[error("not implemented")]
    NotImplemented,
    #[error("invalid node group spec {spec:?}: {reason}")]
    InvalidNodeGroupSpec { spec: String, reason: String },
}

/// A set of nodes with the same capacity and labels that the autoscaler
/// can grow or shrink.
#[trait_variant::make(Send)]
pub trait NodeGroup {
    fn id(&self) -> &str;
    fn min_size(&self) -> u32;
    fn max_size(&self) -> u32;
    fn debug(&self) -> String;
    /// Whether the group exists on the provider side.
    fn exist(&self) -> bool;

    /// Size the provider is converging toward. May differ from the number of
    /// registered nodes while nodes start up or shut down.
    async fn target_size(&self) -> Result<u32, Error>;
    /// Grows the group by `delta` (must be positive).
    async fn increase_size(&self, delta: i32) -> Result<(), Error>;
    /// Deletes the given nodes, shrinking the group by one for each.
    async fn delete_nodes(&self, nodes: &[Node]) -> Result<(), Error>;
    /// Lowers the target size by `delta` (must be negative) without deleting
    /// any existing node.
    async fn decrease_target_size(&self, delta: i32) -> Result<(), Error>;
    async fn nodes(&self) -> Result<Vec<Instance>, Error>;
    /// A node as it would look right after a scale-up, for simulation.
    async fn template_node(&self) -> Result<Node, Error>;
}

/// Entry point the autoscaler core talks to.
#[trait_variant::make(Send)]
pub trait CloudProvider {
    type NodeGroup: NodeGroup + Sync;

    fn name(&self) -> &str;
    async fn node_groups(&self) -> Vec<Self::NodeGroup>;
    /// Resolves the group owning `node`. `Ok(None)` means the node is not
    /// managed by this provider and should be left alone.
    async fn node_group_for_node(&self, node: &Node) -> Result<Option<Self::NodeGroup>, Error>;
    async fn refresh(&self) -> Result<(), Error>;
    async fn cleanup(&self) -> Result<(), Error>;
}

/// Logs the target size and instances of every group. A group that cannot be
/// read is logged as an error and skipped. Returns how many groups were logged.
pub async fn log_node_groups<G: NodeGroup>(groups: &[G]) -> usize {
    let mut logged = 0;
    for group in groups {
        let target = match group.target_size().await {
            Ok(target) => target,
            Err(e) => {
                tracing::error!("Failed to read target size of {}: {:#}", group.debug(), e);
                continue;
            }
        };
        let nodes = match group.nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::error!("Failed to list nodes of {}: {:#}", group.debug(), e);
                continue;
            }
        };
        tracing::info!(
            node_group = %group.debug(),
            target_size = target,
            instances = ?nodes.iter().map(|i| (i.id.as_str(), i.state())).collect::<Vec<_>>(),
            "Node group"
        );
        logged += 1;
    }
    logged
}
