//! Local view of the remote node pools.
//!
//! Every accessor goes through one lock that guards both the descriptors and
//! the target sizes. Mutations hold it across the remote call, so a delete and
//! a refresh attempt never interleave their call-then-update sequences.
//! `rebuild` releases it between pools and between attempts.

use std::{collections::HashMap, sync::Arc};

use anyhow::Error;
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    client::{ApiError, OkeClient},
    error::OciError,
    oke::NodePool,
};

pub const MAX_GET_NODE_POOL_RETRIES: u32 = 3;

#[derive(Default)]
struct CacheState {
    pools: HashMap<String, NodePool>,
    target_sizes: HashMap<String, u32>,
}

impl CacheState {
    fn set(&mut self, pool: NodePool) {
        let size = pool
            .configured_size()
            .unwrap_or(pool.nodes.len() as u32);
        self.target_sizes.insert(pool.id.clone(), size);
        self.pools.insert(pool.id.clone(), pool);
    }
}

pub struct NodePoolCache<O> {
    client: Arc<O>,
    state: Mutex<CacheState>,
}

impl<O> NodePoolCache<O>
where
    O: OkeClient + Sync,
{
    pub fn new(client: Arc<O>) -> Self {
        NodePoolCache {
            client,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Re-fetches every pool in `ids`, trying each up to `max_retries` times.
    /// Stops at the first pool that cannot be fetched and returns its error.
    pub async fn rebuild(&self, ids: &[String], max_retries: u32) -> Result<(), ApiError> {
        for id in ids {
            let mut last_error = None;

            for attempt in 1..=max_retries {
                let mut state = self.state.lock().await;
                match self.client.get_node_pool(id).await {
                    Ok(pool) => {
                        state.set(pool);
                        last_error = None;
                        break;
                    }
                    Err(e) => {
                        warn!(
                            node_pool = %id,
                            attempt = attempt,
                            error = %e,
                            "Failed to fetch node pool"
                        );
                        last_error = Some(e);
                    }
                }
            }

            if let Some(e) = last_error {
                error!(node_pool = %id, error = %e, "Giving up on fetching node pool");
                return Err(e);
            }
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<NodePool, OciError> {
        let state = self.state.lock().await;
        state
            .pools
            .get(id)
            .cloned()
            .ok_or_else(|| OciError::NodePoolNotInCache(id.to_string()))
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.lock().await.pools.contains_key(id)
    }

    /// Finds the cached pool listing `instance_id` among its nodes.
    pub async fn get_by_instance(&self, instance_id: &str) -> Result<NodePool, OciError> {
        let state = self.state.lock().await;
        state
            .pools
            .values()
            .find(|pool| pool.nodes.iter().any(|node| node.id == instance_id))
            .cloned()
            .ok_or_else(|| OciError::NodePoolNotInCacheForInstance(instance_id.to_string()))
    }

    pub async fn set(&self, pool: NodePool) {
        self.state.lock().await.set(pool);
    }

    /// Resizes the pool remotely, then records the new target size.
    /// Does not wait for the pool to converge.
    pub async fn set_size(&self, id: &str, size: u32) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        self.client.update_node_pool(id, size).await?;
        state.target_sizes.insert(id.to_string(), size);
        info!(node_pool = %id, size = size, "Updated node pool size");
        Ok(())
    }

    pub async fn get_size(&self, id: &str) -> Result<u32, OciError> {
        let state = self.state.lock().await;
        state
            .target_sizes
            .get(id)
            .copied()
            .ok_or_else(|| OciError::TargetSizeNotFound(id.to_string()))
    }

    /// Deletes one node from the pool, shrinking the pool with it.
    ///
    /// A node that is already gone (404) or already being deleted (409) counts
    /// as success but leaves the target size alone. The node is dropped from
    /// the cached node list whatever the outcome; it reappears on the next
    /// rebuild if it still exists.
    pub async fn remove_instance(
        &self,
        node_pool_id: &str,
        instance_id: &str,
        name: &str,
    ) -> Result<(), Error> {
        if instance_id.is_empty() {
            return Err(OciError::MissingInstanceId(name.to_string()).into());
        }

        let mut state = self.state.lock().await;
        info!(node_pool = %node_pool_id, instance = %instance_id, node = %name, "Deleting instance");

        let outcome = match self
            .client
            .delete_node(node_pool_id, instance_id, true)
            .await
        {
            Ok(()) => {
                if let Some(size) = state.target_sizes.get_mut(node_pool_id) {
                    *size = size.saturating_sub(1);
                }
                Ok(())
            }
            Err(e) if matches!(e.status(), Some(StatusCode::NOT_FOUND | StatusCode::CONFLICT)) => {
                info!(
                    node_pool = %node_pool_id,
                    instance = %instance_id,
                    status = ?e.status(),
                    "Instance already deleted or being deleted"
                );
                Ok(())
            }
            Err(e) => Err(OciError::DeleteRejected {
                node_pool_id: node_pool_id.to_string(),
                instance_id: instance_id.to_string(),
                source: e,
            }
            .into()),
        };

        if let Some(pool) = state.pools.get_mut(node_pool_id) {
            pool.nodes.retain(|node| node.id != instance_id);
        }

        outcome
    }
}
