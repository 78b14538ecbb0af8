use std::sync::Arc;

use anyhow::Error;
use k8s_openapi::api::core::v1::Node;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::{client::VultrClient, model::NodePool};

pub const PROVIDER_ID_PREFIX: &str = "vultr://";

/// A node pool shared by the manager and the node group built on it.
pub type SharedNodePool = Arc<RwLock<NodePool>>;

/// Keeps the autoscaled node pools of one VKE cluster.
pub struct VultrManager<V> {
    client: Arc<V>,
    cluster_id: String,
    pools: RwLock<Vec<SharedNodePool>>,
}

impl<V> VultrManager<V>
where
    V: VultrClient + Send + Sync,
{
    pub fn new(client: Arc<V>, cluster_id: String) -> Self {
        VultrManager {
            client,
            cluster_id,
            pools: RwLock::new(vec![]),
        }
    }

    /// Replaces the pool list with the cluster's pools that have the
    /// autoscaler enabled.
    pub async fn refresh(&self) -> Result<(), Error> {
        let listed = self.client.list_node_pools(&self.cluster_id).await?;

        let pools: Vec<SharedNodePool> = listed
            .into_iter()
            .filter(|pool| {
                if !pool.auto_scaler {
                    debug!(node_pool = %pool.id, "Skipping node pool without autoscaler");
                }
                pool.auto_scaler
            })
            .map(|pool| Arc::new(RwLock::new(pool)))
            .collect();

        info!(cluster = %self.cluster_id, count = pools.len(), "Refreshed node pools");
        *self.pools.write() = pools;
        Ok(())
    }

    pub fn pools(&self) -> Vec<SharedNodePool> {
        self.pools.read().clone()
    }

    /// The pool listing the node's instance, if any.
    pub fn pool_for_node(&self, node: &Node) -> Option<SharedNodePool> {
        let provider_id = node.spec.as_ref()?.provider_id.as_deref()?;
        let node_id = provider_id.strip_prefix(PROVIDER_ID_PREFIX)?;

        self.pools
            .read()
            .iter()
            .find(|pool| pool.read().nodes.iter().any(|n| n.id == node_id))
            .cloned()
    }

    pub async fn update_node_pool(&self, node_pool_id: &str, node_quantity: u32) -> Result<NodePool, Error> {
        self.client
            .update_node_pool(&self.cluster_id, node_pool_id, node_quantity)
            .await
    }

    pub async fn delete_node(&self, node_pool_id: &str, node_id: &str) -> Result<(), Error> {
        self.client
            .delete_node(&self.cluster_id, node_pool_id, node_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::NodeSpec;
    use mockall::predicate::eq;

    use crate::{client::MockVultrClient, model};

    use super::*;

    fn node_pool(id: &str, auto_scaler: bool, node_ids: &[&str]) -> NodePool {
        NodePool {
            id: id.to_string(),
            node_quantity: node_ids.len() as u32,
            min_nodes: 1,
            max_nodes: 5,
            auto_scaler,
            nodes: node_ids
                .iter()
                .map(|id| model::Node {
                    id: id.to_string(),
                    status: "active".to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn k8s_node(provider_id: &str) -> Node {
        Node {
            spec: Some(NodeSpec {
                provider_id: Some(provider_id.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn keeps_only_autoscaled_pools() {
        let mut client = MockVultrClient::new();
        client
            .expect_list_node_pools()
            .with(eq("cluster"))
            .returning(|_| {
                Box::pin(async {
                    Ok(vec![
                        node_pool("scaled", true, &["n1"]),
                        node_pool("fixed", false, &["n2"]),
                    ])
                })
            })
            .once();

        let manager = VultrManager::new(Arc::new(client), "cluster".to_string());
        manager.refresh().await.unwrap();

        let ids: Vec<String> = manager.pools().iter().map(|p| p.read().id.clone()).collect();
        assert_eq!(ids, vec!["scaled"]);

        assert!(manager.pool_for_node(&k8s_node("vultr://n1")).is_some());
        assert!(manager.pool_for_node(&k8s_node("vultr://n2")).is_none());
        assert!(manager.pool_for_node(&k8s_node("n1")).is_none());
        assert!(manager.pool_for_node(&Node::default()).is_none());
    }
}
