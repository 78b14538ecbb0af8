use std::sync::Arc;

use anyhow::Error;
use k8s_openapi::api::core::v1::Node;
use node_pool_autoscaler::{cloud_provider::CloudProvider, coordinator::SizeCoordinator};

use crate::{client::VultrClient, manager::VultrManager, node_group::VultrNodeGroup};

pub const PROVIDER_NAME: &str = "vultr";

pub struct VultrCloudProvider<V> {
    manager: Arc<VultrManager<V>>,
    coordinator: SizeCoordinator,
}

impl<V> VultrCloudProvider<V>
where
    V: VultrClient + Send + Sync,
{
    pub fn new(manager: Arc<VultrManager<V>>) -> Self {
        VultrCloudProvider {
            manager,
            coordinator: SizeCoordinator::new(),
        }
    }
}

impl<V> CloudProvider for VultrCloudProvider<V>
where
    V: VultrClient + Send + Sync,
{
    type NodeGroup = VultrNodeGroup<V>;

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn node_groups(&self) -> Vec<Self::NodeGroup> {
        self.manager
            .pools()
            .into_iter()
            .map(|pool| VultrNodeGroup::new(pool, self.manager.clone(), self.coordinator.clone()))
            .collect()
    }

    async fn node_group_for_node(&self, node: &Node) -> Result<Option<Self::NodeGroup>, Error> {
        Ok(self
            .manager
            .pool_for_node(node)
            .map(|pool| VultrNodeGroup::new(pool, self.manager.clone(), self.coordinator.clone())))
    }

    async fn refresh(&self) -> Result<(), Error> {
        self.manager.refresh().await
    }

    async fn cleanup(&self) -> Result<(), Error> {
        Ok(())
    }
}
