use std::sync::Arc;

use anyhow::{anyhow, Error};
use k8s_openapi::api::core::v1::Node;
use node_pool_autoscaler::{
    client::KubeClient,
    cloud_provider::NodeGroup,
    coordinator::SizeCoordinator,
    model::{Instance, NodeGroupSpec},
};
use tracing::info;

use crate::{
    client::{ComputeClient, OkeClient},
    manager::NodePoolManager,
    reference::OciRef,
};

/// An OKE node pool seen as an autoscaler node group.
pub struct OciNodeGroup<O, C, K> {
    spec: NodeGroupSpec,
    manager: Arc<NodePoolManager<O, C, K>>,
    coordinator: SizeCoordinator,
}

impl<O, C, K> OciNodeGroup<O, C, K>
where
    O: OkeClient + Send + Sync,
    C: ComputeClient + Send + Sync,
    K: KubeClient + Send + Sync,
{
    pub fn new(
        spec: NodeGroupSpec,
        manager: Arc<NodePoolManager<O, C, K>>,
        coordinator: SizeCoordinator,
    ) -> Self {
        OciNodeGroup {
            spec,
            manager,
            coordinator,
        }
    }

    /// Whether `node` is one of this pool's instances.
    pub async fn belongs(&self, node: &Node) -> Result<bool, Error> {
        let instance = OciRef::from_node(node);
        let pool = self.manager.node_pool_for_instance(&instance).await?;
        Ok(pool.id == self.spec.id)
    }

    async fn live_node_count(&self) -> Result<usize, Error> {
        if self.manager.use_compute_for_node_count() {
            self.manager
                .existing_node_pool_size_via_compute(&self.spec.id)
                .await
        } else {
            Ok(self.manager.node_pool_nodes(&self.spec.id).await?.len())
        }
    }

    async fn delete_nodes_serialized(&self, nodes: &[Node]) -> Result<(), Error> {
        let size = self.manager.node_pool_size(&self.spec.id).await?;
        if size <= self.spec.min_size {
            return Err(anyhow!("min size reached, nodes will not be deleted"));
        }

        let mut refs = Vec::with_capacity(nodes.len());
        for node in nodes {
            let instance = OciRef::from_node(node);
            if instance.instance_id.is_empty() {
                return Err(anyhow!("node {:?} has no provider id", instance.name));
            }

            let pool = self.manager.node_pool_for_instance(&instance).await?;
            if pool.id != self.spec.id {
                return Err(anyhow!(
                    "{} belongs to a different node pool than {}",
                    instance.name,
                    self.spec.id
                ));
            }
            refs.push(instance);
        }

        self.manager
            .taint_to_prevent_further_scheduling_on_restart(nodes)
            .await?;
        self.manager.delete_instances(&self.spec.id, &refs).await
    }
}

impl<O, C, K> NodeGroup for OciNodeGroup<O, C, K>
where
    O: OkeClient + Send + Sync,
    C: ComputeClient + Send + Sync,
    K: KubeClient + Send + Sync,
{
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn min_size(&self) -> u32 {
        self.spec.min_size
    }

    fn max_size(&self) -> u32 {
        self.spec.max_size
    }

    fn debug(&self) -> String {
        format!("{} ({}:{})", self.spec.id, self.spec.min_size, self.spec.max_size)
    }

    fn exist(&self) -> bool {
        true
    }

    async fn target_size(&self) -> Result<u32, Error> {
        self.manager.node_pool_size(&self.spec.id).await
    }

    async fn increase_size(&self, delta: i32) -> Result<(), Error> {
        if delta <= 0 {
            return Err(anyhow!("size increase must be positive"));
        }

        self.coordinator
            .serialize(async {
                let size = self.manager.node_pool_size(&self.spec.id).await?;
                let target = size as i64 + delta as i64;
                if target > self.spec.max_size as i64 {
                    return Err(anyhow!(
                        "size increase too large - desired:{} max:{}",
                        target,
                        self.spec.max_size
                    ));
                }
                info!(node_pool = %self.spec.id, from = size, to = target, "Increasing node pool size");
                self.manager
                    .set_node_pool_size(&self.spec.id, target as u32)
                    .await
            })
            .await
    }

    async fn delete_nodes(&self, nodes: &[Node]) -> Result<(), Error> {
        self.coordinator
            .serialize(self.delete_nodes_serialized(nodes))
            .await
    }

    async fn decrease_target_size(&self, delta: i32) -> Result<(), Error> {
        if delta >= 0 {
            return Err(anyhow!("size decrease must be negative"));
        }

        let size = self.manager.node_pool_size(&self.spec.id).await?;
        let nodes = self.live_node_count().await?;
        let target = size as i64 + delta as i64;
        if target < nodes as i64 {
            return Err(anyhow!(
                "attempt to delete existing nodes targetSize:{} delta:{} existingNodes: {}",
                size,
                delta,
                nodes
            ));
        }

        self.manager
            .set_node_pool_size(&self.spec.id, target as u32)
            .await
    }

    async fn nodes(&self) -> Result<Vec<Instance>, Error> {
        self.manager.node_pool_nodes(&self.spec.id).await
    }

    async fn template_node(&self) -> Result<Node, Error> {
        self.manager.node_pool_template_node(&self.spec.id).await
    }
}
