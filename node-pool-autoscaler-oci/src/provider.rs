use std::{sync::Arc, time::Duration};

use anyhow::Error;
use k8s_openapi::api::core::v1::Node;
use node_pool_autoscaler::{
    client::KubeClient, cloud_provider::CloudProvider, coordinator::SizeCoordinator,
    model::NodeGroupSpec,
};
use tracing::{debug, error};

use crate::{
    client::{ComputeClient, OkeClient},
    error::is_not_managed,
    manager::NodePoolManager,
    node_group::OciNodeGroup,
    reference::OciRef,
};

pub const PROVIDER_NAME: &str = "oci";
const STARTUP_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

pub struct OciCloudProvider<O, C, K> {
    manager: Arc<NodePoolManager<O, C, K>>,
    coordinator: SizeCoordinator,
}

impl<O, C, K> OciCloudProvider<O, C, K>
where
    O: OkeClient + Send + Sync,
    C: ComputeClient + Send + Sync,
    K: KubeClient + Send + Sync,
{
    pub fn new(manager: Arc<NodePoolManager<O, C, K>>) -> Self {
        OciCloudProvider {
            manager,
            coordinator: SizeCoordinator::new(),
        }
    }

    /// Builds the provider once the cache has been filled, retrying until it is.
    pub async fn start(manager: Arc<NodePoolManager<O, C, K>>) -> Self {
        while let Err(e) = manager.refresh().await {
            error!("unable to fill cache on startup. Retrying: {:#}", e);
            tokio::time::sleep(STARTUP_REFRESH_INTERVAL).await;
        }
        Self::new(manager)
    }

    fn node_group(&self, spec: NodeGroupSpec) -> OciNodeGroup<O, C, K> {
        OciNodeGroup::new(spec, self.manager.clone(), self.coordinator.clone())
    }
}

impl<O, C, K> CloudProvider for OciCloudProvider<O, C, K>
where
    O: OkeClient + Send + Sync,
    C: ComputeClient + Send + Sync,
    K: KubeClient + Send + Sync,
{
    type NodeGroup = OciNodeGroup<O, C, K>;

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn node_groups(&self) -> Vec<Self::NodeGroup> {
        self.manager
            .node_pools()
            .await
            .into_iter()
            .map(|spec| self.node_group(spec))
            .collect()
    }

    async fn node_group_for_node(&self, node: &Node) -> Result<Option<Self::NodeGroup>, Error> {
        let instance = OciRef::from_node(node);
        match self.manager.node_pool_for_instance(&instance).await {
            Ok(spec) => Ok(Some(self.node_group(spec))),
            Err(e) if is_not_managed(&e) => {
                debug!("node {:?} is not managed by this autoscaler", instance.name);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self) -> Result<(), Error> {
        self.manager.refresh().await
    }

    async fn cleanup(&self) -> Result<(), Error> {
        self.manager.cleanup()
    }
}
