use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Error};
use k8s_openapi::{
    api::core::v1::{Node, NodeSpec, NodeStatus},
    apimachinery::pkg::api::resource::Quantity,
};
use kube::api::ObjectMeta;
use node_pool_autoscaler::{
    client::KubeClient,
    model::{ErrorClass, Instance, InstanceErrorInfo, InstanceState, InstanceStatus, NodeGroupSpec},
    taints::taint_nodes_for_deletion,
    template::{generic_labels, gpu_taint, join_labels, ready_conditions, GPU_RESOURCE},
};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use reqwest::StatusCode;
use tracing::{debug, error, info, warn};

use crate::{
    cache::{NodePoolCache, MAX_GET_NODE_POOL_RETRIES},
    client::{ComputeClient, OkeClient},
    discovery::NodeGroupAutoDiscovery,
    error::OciError,
    oke::{self, FreeformTags, InstanceLifecycleState, NodeLifecycleState, NodePool},
    reference::{OciRef, NODE_POOL_ID_ANNOTATION},
    registered_taints::registered_taints,
    shapes::ShapeGetter,
};

const TEMPLATE_NODE_NAME: &str = "ok-555555";
const TEMPLATE_MAX_PODS: &str = "110";
const EPHEMERAL_STORAGE_TAG: &str = "ephemeral-storage";
const ARM_ARCH: &str = "arm64";
const DEFAULT_ARCH: &str = "amd64";

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub refresh_interval: Duration,
    pub use_compute_for_node_count: bool,
}

/// Translates node group operations into node-pool cache operations.
pub struct NodePoolManager<O, C, K> {
    settings: ManagerSettings,
    oke: Arc<O>,
    compute: Arc<C>,
    kube: Arc<K>,
    cache: NodePoolCache<O>,
    shapes: ShapeGetter<C>,
    explicit_pools: Vec<NodeGroupSpec>,
    discovery: Vec<NodeGroupAutoDiscovery>,
    static_pools: RwLock<BTreeMap<String, NodeGroupSpec>>,
    last_refresh: Mutex<Option<Instant>>,
}

impl<O, C, K> NodePoolManager<O, C, K>
where
    O: OkeClient + Send + Sync,
    C: ComputeClient + Send + Sync,
    K: KubeClient + Send + Sync,
{
    pub fn new(
        settings: ManagerSettings,
        oke: Arc<O>,
        compute: Arc<C>,
        kube: Arc<K>,
        explicit_pools: Vec<NodeGroupSpec>,
        discovery: Vec<NodeGroupAutoDiscovery>,
    ) -> Self {
        let static_pools = explicit_pools
            .iter()
            .map(|spec| (spec.id.clone(), spec.clone()))
            .collect();

        NodePoolManager {
            settings,
            cache: NodePoolCache::new(oke.clone()),
            shapes: ShapeGetter::new(compute.clone()),
            oke,
            compute,
            kube,
            explicit_pools,
            discovery,
            static_pools: RwLock::new(static_pools),
            last_refresh: Mutex::new(None),
        }
    }

    pub fn use_compute_for_node_count(&self) -> bool {
        self.settings.use_compute_for_node_count
    }

    /// Rebuilds the cache unless the last rebuild is more recent than the
    /// refresh interval.
    pub async fn refresh(&self) -> Result<(), Error> {
        let due = match *self.last_refresh.lock() {
            Some(last) => last.elapsed() >= self.settings.refresh_interval,
            None => true,
        };
        if !due {
            return Ok(());
        }
        self.force_refresh().await
    }

    pub async fn invalidate_and_refresh_cache(&self) -> Result<(), Error> {
        *self.last_refresh.lock() = None;
        self.refresh().await
    }

    async fn force_refresh(&self) -> Result<(), Error> {
        if !self.discovery.is_empty() {
            self.discover_node_pools().await;
        }

        let ids: Vec<String> = self.static_pools.read().keys().cloned().collect();
        match self.cache.rebuild(&ids, MAX_GET_NODE_POOL_RETRIES).await {
            Ok(()) => {
                *self.last_refresh.lock() = Some(Instant::now());
                info!(
                    "Refreshed NodePool list, next refresh after {:?}",
                    self.settings.refresh_interval
                );
                Ok(())
            }
            // Missing pools wait for the next interval.
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => {
                *self.last_refresh.lock() = Some(Instant::now());
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces the static pool map with the discovered pools plus the pools
    /// given explicitly. Keeps the previous map if any listing fails.
    async fn discover_node_pools(&self) {
        let mut pools = BTreeMap::new();
        for group in &self.discovery {
            match group.discover(self.oke.as_ref()).await {
                Ok(specs) => pools.extend(specs.into_iter().map(|s| (s.id.clone(), s))),
                Err(_) => {
                    warn!("node group auto discovery failed, keeping the previous node pools");
                    return;
                }
            }
        }
        for spec in &self.explicit_pools {
            pools.insert(spec.id.clone(), spec.clone());
        }
        *self.static_pools.write() = pools;
    }

    pub async fn taint_to_prevent_further_scheduling_on_restart(
        &self,
        nodes: &[Node],
    ) -> Result<(), Error> {
        taint_nodes_for_deletion(self.kube.as_ref(), nodes).await
    }

    pub fn cleanup(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Registered node pools that made it into the cache.
    pub async fn node_pools(&self) -> Vec<NodeGroupSpec> {
        let specs: Vec<NodeGroupSpec> = self.static_pools.read().values().cloned().collect();
        let mut cached = Vec::with_capacity(specs.len());
        for spec in specs {
            if self.cache.contains(&spec.id).await {
                cached.push(spec);
            }
        }
        cached
    }

    /// Counts the pool's live instances straight from the compute API, so the
    /// answer does not depend on how fresh the cache is.
    pub async fn existing_node_pool_size_via_compute(&self, id: &str) -> Result<usize, Error> {
        let pool = self.cache.get(id).await?;
        let prefix = display_name_prefix(&pool.cluster_id, &pool.id);
        debug!("Filter used is prefix {:?}", prefix);

        let mut count = 0;
        let mut page = None;
        loop {
            let result = self.compute.list_instances(&pool.compartment_id, page).await?;

            for item in result.items {
                if !item.display_name.starts_with(&prefix) {
                    continue;
                }
                match item.lifecycle_state {
                    InstanceLifecycleState::Stopped | InstanceLifecycleState::Terminated => {
                        debug!("skipping instance is in stopped/terminated state: {:?}", item.id)
                    }
                    InstanceLifecycleState::Unknown => {
                        warn!("instance found in unhandled state: {:?}", item.id)
                    }
                    _ => count += 1,
                }
            }

            match result.next_page {
                Some(next) => page = Some(next),
                None => return Ok(count),
            }
        }
    }

    /// Nodes of the pool that are not deleted yet.
    pub async fn node_pool_nodes(&self, id: &str) -> Result<Vec<Instance>, Error> {
        debug!("getting nodes for node pool: {:?}", id);
        let pool = self.cache.get(id).await?;
        Ok(pool.nodes.iter().filter_map(instance_from_node).collect())
    }

    /// Resolves the pool owning `instance`. Fails with
    /// [`OciError::InstanceNodePoolNotFound`] for pools this autoscaler does not manage.
    pub async fn node_pool_for_instance(&self, instance: &OciRef) -> Result<NodeGroupSpec, Error> {
        let node_pool_id = if instance.node_pool_id.is_empty() {
            debug!("node pool id missing from reference: {:?}", instance);
            self.cache.get_by_instance(&instance.instance_id).await?.id
        } else {
            instance.node_pool_id.clone()
        };

        self.static_pools
            .read()
            .get(&node_pool_id)
            .cloned()
            .ok_or_else(|| {
                debug!("did not find node pool for reference: {:?}", instance);
                OciError::InstanceNodePoolNotFound.into()
            })
    }

    pub async fn node_pool_template_node(&self, id: &str) -> Result<Node, Error> {
        let pool = self.cache.get(id).await?;
        self.build_node_from_template(&pool).await
    }

    pub async fn node_pool_size(&self, id: &str) -> Result<u32, Error> {
        Ok(self.cache.get_size(id).await?)
    }

    /// Returns as soon as the resize is accepted; new nodes show up as
    /// unregistered until they join.
    pub async fn set_node_pool_size(&self, id: &str, size: u32) -> Result<(), Error> {
        self.cache.set_size(id, size).await
    }

    pub async fn delete_instances(&self, id: &str, instances: &[OciRef]) -> Result<(), Error> {
        info!("DeleteInstances called");
        for instance in instances {
            self.cache
                .remove_instance(id, &instance.instance_id, &instance.name)
                .await?;
        }
        Ok(())
    }

    async fn build_node_from_template(&self, pool: &NodePool) -> Result<Node, Error> {
        let labels: BTreeMap<String, String> = pool
            .initial_node_labels
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone()))
            .collect();

        let ephemeral_storage = ephemeral_storage(&pool.freeform_tags).unwrap_or_else(|e| {
            error!("{}", e);
            None
        });
        let shape = self.shapes.node_pool_shape(pool).await?;

        let mut taints = registered_taints(pool).unwrap_or_else(|e| {
            warn!(
                "could not extract taints from the nodepool: {}. Continuing on with empty taint list",
                e
            );
            vec![]
        });
        if shape.gpu > 0 {
            taints.push(gpu_taint());
        }

        let mut capacity = BTreeMap::from([
            ("pods".to_string(), Quantity(TEMPLATE_MAX_PODS.to_string())),
            ("cpu".to_string(), Quantity(shape.cpu.to_string())),
            ("memory".to_string(), Quantity(shape.memory_in_bytes.to_string())),
            (GPU_RESOURCE.to_string(), Quantity(shape.gpu.to_string())),
        ]);
        if let Some(storage) = ephemeral_storage {
            capacity.insert("ephemeral-storage".to_string(), storage);
        }

        let availability_domain = availability_domain(pool)?;
        let labels = join_labels(
            labels,
            &generic_labels(
                TEMPLATE_NODE_NAME,
                arch(&shape.name),
                &shape.name,
                region(&pool.id),
                Some(availability_domain.as_str()),
            ),
        );

        Ok(Node {
            metadata: ObjectMeta {
                name: Some(TEMPLATE_NODE_NAME.to_string()),
                labels: Some(labels),
                annotations: Some(BTreeMap::from([(
                    NODE_POOL_ID_ANNOTATION.to_string(),
                    pool.id.clone(),
                )])),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                taints: Some(taints),
                ..Default::default()
            }),
            status: Some(NodeStatus {
                allocatable: Some(capacity.clone()),
                capacity: Some(capacity),
                conditions: Some(ready_conditions()),
                ..Default::default()
            }),
        })
    }
}

fn instance_from_node(node: &oke::Node) -> Option<Instance> {
    if let Some(node_error) = &node.node_error {
        let out_of_resources = node_error.code == "LimitExceeded"
            || (node_error.code == "InternalServerError" && node_error.message.contains("quota"));
        let error_class = if out_of_resources {
            ErrorClass::OutOfResources
        } else {
            ErrorClass::Other
        };

        return Some(Instance {
            id: node.id.clone(),
            status: Some(InstanceStatus {
                state: Some(InstanceState::Creating),
                error_info: Some(InstanceErrorInfo {
                    error_class,
                    error_code: node_error.code.clone(),
                    error_message: node_error.message.clone(),
                }),
            }),
        });
    }

    let state = match node.lifecycle_state {
        NodeLifecycleState::Deleted => {
            debug!("skipping instance is in deleted state: {:?}", node.id);
            return None;
        }
        NodeLifecycleState::Deleting => InstanceState::Deleting,
        NodeLifecycleState::Creating | NodeLifecycleState::Updating => InstanceState::Creating,
        NodeLifecycleState::Active => InstanceState::Running,
        other => {
            warn!("instance found in unhandled state: ({:?} = {:?})", node.id, other);
            return None;
        }
    };
    Some(Instance::new(node.id.clone(), state))
}

/// Display name prefix OKE gives the compute instances of a pool.
fn display_name_prefix(cluster_id: &str, node_pool_id: &str) -> String {
    let tail = |id: &str| id.get(id.len().saturating_sub(11)..).unwrap_or(id).to_string();
    format!("oke-{}-{}", tail(cluster_id), tail(node_pool_id))
}

/// Availability domain of the pool's first placement config, without the
/// tenancy prefix (`Uocm:PHX-AD-1` becomes `PHX-AD-1`).
pub fn availability_domain(pool: &NodePool) -> Result<String, Error> {
    let configs = pool.placement_configs();
    let first = configs
        .first()
        .ok_or_else(|| anyhow!("node pool {:?} has no placement configurations", pool.id))?;

    if configs.len() > 1 {
        warn!(
            "node pool {:?} has more than 1 placement config so picking first availability domain",
            pool.id
        );
    }

    let ad = &first.availability_domain;
    Ok(ad.split(':').nth(1).unwrap_or(ad).to_string())
}

fn arch(shape: &str) -> &'static str {
    if shape.split('.').any(|part| part == "A1" || part == "A2") {
        ARM_ARCH
    } else {
        DEFAULT_ARCH
    }
}

/// Region key embedded in an OCID, e.g. `iad` in `ocid1.nodepool.oc1.iad.aaaa`.
fn region(ocid: &str) -> &str {
    ocid.split('.').nth(3).unwrap_or_default()
}

fn ephemeral_storage(tags: &FreeformTags) -> Result<Option<Quantity>, Error> {
    let Some(value) = tags.get(EPHEMERAL_STORAGE_TAG) else {
        debug!("ephemeral-storage size not set as part of the nodepool's freeform tags");
        return Ok(None);
    };

    let value = value.replace(' ', "");
    let quantity = Regex::new(r"^[0-9]+(\.[0-9]+)?([KMGTPE]i|[kMGTPE]|e[0-9]+)?$")?;
    if !quantity.is_match(&value) {
        return Err(anyhow!("invalid ephemeral-storage size {value:?}"));
    }
    debug!("ephemeral-storage size set with value: {}", value);
    Ok(Some(Quantity(value)))
}
