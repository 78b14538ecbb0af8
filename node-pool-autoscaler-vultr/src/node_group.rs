use std::sync::Arc;

use anyhow::{anyhow, Error};
use k8s_openapi::api::core::v1::Node;
use node_pool_autoscaler::{
    cloud_provider::{NodeGroup, ProviderError},
    coordinator::SizeCoordinator,
    model::{ErrorClass, Instance, InstanceErrorInfo, InstanceState, InstanceStatus},
};
use tracing::info;

use crate::{
    client::VultrClient,
    manager::{SharedNodePool, VultrManager, PROVIDER_ID_PREFIX},
    model,
};

const UNKNOWN_STATUS_CODE: &str = "no-code-vultr";

pub struct VultrNodeGroup<V> {
    id: String,
    min_size: u32,
    max_size: u32,
    pool: SharedNodePool,
    manager: Arc<VultrManager<V>>,
    coordinator: SizeCoordinator,
}

impl<V> VultrNodeGroup<V>
where
    V: VultrClient + Send + Sync,
{
    pub fn new(pool: SharedNodePool, manager: Arc<VultrManager<V>>, coordinator: SizeCoordinator) -> Self {
        let (id, min_size, max_size) = {
            let pool = pool.read();
            (pool.id.clone(), pool.min_nodes, pool.max_nodes)
        };
        VultrNodeGroup {
            id,
            min_size,
            max_size,
            pool,
            manager,
            coordinator,
        }
    }

    fn node_quantity(&self) -> u32 {
        self.pool.read().node_quantity
    }

    /// Applies a new quantity, keeping the pool the API echoes back.
    async fn resize(&self, target: u32, delta: i32) -> Result<(), Error> {
        let updated = self.manager.update_node_pool(&self.id, target).await?;
        if updated.node_quantity != target {
            return Err(anyhow!(
                "couldn't resize to {} (delta: {}). Current size is: {}",
                target,
                delta,
                updated.node_quantity
            ));
        }
        info!(node_pool = %self.id, size = target, "Updated node pool size");
        *self.pool.write() = updated;
        Ok(())
    }
}

fn instance(node: &model::Node) -> Instance {
    let id = format!("{PROVIDER_ID_PREFIX}{}", node.id);
    let state = match node.status.as_str() {
        "pending" => InstanceState::Creating,
        "active" => InstanceState::Running,
        "deleting" => InstanceState::Deleting,
        other => {
            return Instance {
                id,
                status: Some(InstanceStatus {
                    state: None,
                    error_info: Some(InstanceErrorInfo {
                        error_class: ErrorClass::Other,
                        error_code: UNKNOWN_STATUS_CODE.to_string(),
                        error_message: other.to_string(),
                    }),
                }),
            }
        }
    };
    Instance::new(id, state)
}

impl<V> NodeGroup for VultrNodeGroup<V>
where
    V: VultrClient + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn min_size(&self) -> u32 {
        self.min_size
    }

    fn max_size(&self) -> u32 {
        self.max_size
    }

    fn debug(&self) -> String {
        format!("{} ({}:{})", self.id, self.min_size, self.max_size)
    }

    fn exist(&self) -> bool {
        true
    }

    async fn target_size(&self) -> Result<u32, Error> {
        Ok(self.node_quantity())
    }

    async fn increase_size(&self, delta: i32) -> Result<(), Error> {
        if delta <= 0 {
            return Err(anyhow!("delta must be positive, have: {}", delta));
        }

        self.coordinator
            .serialize(async {
                let target = self.node_quantity() as i64 + delta as i64;
                if target > self.max_size as i64 {
                    return Err(anyhow!(
                        "size increase is too large. current: {} desired: {} max: {}",
                        self.node_quantity(),
                        target,
                        self.max_size
                    ));
                }
                self.resize(target as u32, delta).await
            })
            .await
    }

    async fn delete_nodes(&self, nodes: &[Node]) -> Result<(), Error> {
        self.coordinator
            .serialize(async {
                if self.node_quantity() <= self.min_size {
                    return Err(anyhow!("min size reached, nodes will not be deleted"));
                }

                let mut node_ids = Vec::with_capacity(nodes.len());
                for node in nodes {
                    let provider_id = node
                        .spec
                        .as_ref()
                        .and_then(|s| s.provider_id.as_deref())
                        .unwrap_or_default();
                    let node_id = provider_id
                        .strip_prefix(PROVIDER_ID_PREFIX)
                        .ok_or_else(|| anyhow!("node {:?} has no vultr provider id", node.metadata.name))?;
                    node_ids.push(node_id);
                }

                {
                    let pool = self.pool.read();
                    if let Some(foreign) = node_ids
                        .iter()
                        .find(|id| !pool.nodes.iter().any(|n| n.id == **id))
                    {
                        return Err(anyhow!(
                            "{} belongs to a different node pool than {}",
                            foreign,
                            self.id
                        ));
                    }
                }

                for node_id in node_ids {
                    self.manager.delete_node(&self.id, node_id).await?;

                    {
                        let mut pool = self.pool.write();
                        pool.node_quantity = pool.node_quantity.saturating_sub(1);
                        pool.nodes.retain(|n| n.id != node_id);
                    }
                }
                Ok::<_, Error>(())
            })
            .await
    }

    async fn decrease_target_size(&self, delta: i32) -> Result<(), Error> {
        if delta >= 0 {
            return Err(anyhow!("delta must be negative, have: {}", delta));
        }

        let target = self.node_quantity() as i64 + delta as i64;
        if target < self.min_size as i64 {
            return Err(anyhow!(
                "size decrease is too small. current: {} desired: {} min: {}",
                self.node_quantity(),
                target,
                self.min_size
            ));
        }
        self.resize(target as u32, delta).await
    }

    async fn nodes(&self) -> Result<Vec<Instance>, Error> {
        Ok(self.pool.read().nodes.iter().map(instance).collect())
    }

    async fn template_node(&self) -> Result<Node, Error> {
        Err(ProviderError::NotImplemented.into())
    }
}
