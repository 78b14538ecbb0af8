use anyhow::{anyhow, Error};
use reqwest::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::{
    config::VultrSettings,
    model::{NodePool, NodePoolResponse, NodePoolUpdate, NodePoolsResponse},
};

const PAGE_SIZE: &str = "100";

/// The VKE node pool operations the provider needs.
#[trait_variant::make(Send)]
#[cfg_attr(test, automock)]
pub trait VultrClient {
    async fn list_node_pools(&self, cluster_id: &str) -> Result<Vec<NodePool>, Error>;
    /// Sets the pool's node quantity and returns the pool as the API echoes it.
    async fn update_node_pool(
        &self,
        cluster_id: &str,
        node_pool_id: &str,
        node_quantity: u32,
    ) -> Result<NodePool, Error>;
    async fn delete_node(&self, cluster_id: &str, node_pool_id: &str, node_id: &str)
        -> Result<(), Error>;
}

pub struct RestClient {
    client: Client,
    base_url: String,
    token: String,
}

impl RestClient {
    pub fn new(settings: &VultrSettings) -> Self {
        RestClient {
            client: Client::new(),
            base_url: settings.api_url().to_string(),
            token: settings.token.clone(),
        }
    }

    fn node_pools_url(&self, cluster_id: &str) -> String {
        format!("{}/kubernetes/clusters/{cluster_id}/node-pools", self.base_url)
    }
}

impl VultrClient for RestClient {
    async fn list_node_pools(&self, cluster_id: &str) -> Result<Vec<NodePool>, Error> {
        let url = self.node_pools_url(cluster_id);
        let mut pools = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("per_page", PAGE_SIZE)])
                .bearer_auth(&self.token);
            if !cursor.is_empty() {
                request = request.query(&[("cursor", &cursor)]);
            }

            let response = request.send().await?.error_for_status()?;
            let page: NodePoolsResponse = response.json().await?;
            debug!(cluster = %cluster_id, count = page.node_pools.len(), "Listed node pools");
            pools.extend(page.node_pools);

            if page.meta.links.next.is_empty() {
                return Ok(pools);
            }
            cursor = page.meta.links.next;
        }
    }

    async fn update_node_pool(
        &self,
        cluster_id: &str,
        node_pool_id: &str,
        node_quantity: u32,
    ) -> Result<NodePool, Error> {
        let url = format!("{}/{node_pool_id}", self.node_pools_url(cluster_id));
        let response = self
            .client
            .patch(url)
            .json(&NodePoolUpdate { node_quantity })
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;

        let result: NodePoolResponse = response.json().await?;
        Ok(result.node_pool)
    }

    async fn delete_node(
        &self,
        cluster_id: &str,
        node_pool_id: &str,
        node_id: &str,
    ) -> Result<(), Error> {
        let url = format!("{}/{node_pool_id}/nodes/{node_id}", self.node_pools_url(cluster_id));
        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!(
                "failed to delete node {node_id} from node pool {node_pool_id}: {}",
                response.status()
            ))
        }
    }
}
