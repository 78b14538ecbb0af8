//! Wire model of the OKE (Container Engine) and Compute APIs, limited to the
//! fields the autoscaler reads or writes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type FreeformTags = HashMap<String, String>;
pub type DefinedTags = HashMap<String, HashMap<String, serde_json::Value>>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePool {
    pub id: String,
    #[serde(default)]
    pub compartment_id: String,
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub name: String,
    pub kubernetes_version: Option<String>,
    #[serde(default)]
    pub node_metadata: HashMap<String, String>,
    #[serde(default)]
    pub node_shape: String,
    pub node_shape_config: Option<NodeShapeConfig>,
    pub node_source_details: Option<NodeSourceDetails>,
    #[serde(default)]
    pub initial_node_labels: Vec<KeyValue>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    pub node_config_details: Option<NodeConfigDetails>,
    #[serde(default)]
    pub freeform_tags: FreeformTags,
    #[serde(default)]
    pub defined_tags: DefinedTags,
    pub lifecycle_state: Option<String>,
}

impl NodePool {
    /// Size the pool is configured to converge to.
    pub fn configured_size(&self) -> Option<u32> {
        self.node_config_details.as_ref().and_then(|d| d.size)
    }

    pub fn placement_configs(&self) -> &[PlacementConfig] {
        self.node_config_details
            .as_ref()
            .map(|d| d.placement_configs.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct KeyValue {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NodeShapeConfig {
    pub ocpus: Option<f32>,
    #[serde(rename = "memoryInGBs")]
    pub memory_in_gbs: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "sourceType")]
pub enum NodeSourceDetails {
    #[serde(rename = "IMAGE", rename_all = "camelCase")]
    Image {
        image_id: String,
        #[serde(rename = "bootVolumeSizeInGBs")]
        boot_volume_size_in_gbs: Option<u64>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfigDetails {
    pub size: Option<u32>,
    #[serde(default)]
    pub placement_configs: Vec<PlacementConfig>,
    #[serde(default)]
    pub nsg_ids: Vec<String>,
    pub kms_key_id: Option<String>,
    pub is_pv_encryption_in_transit_enabled: Option<bool>,
    #[serde(default)]
    pub freeform_tags: FreeformTags,
    #[serde(default)]
    pub defined_tags: DefinedTags,
    pub node_pool_pod_network_option_details: Option<PodNetworkOptionDetails>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "cniType")]
pub enum PodNetworkOptionDetails {
    #[serde(rename = "OCI_VCN_IP_NATIVE", rename_all = "camelCase")]
    VcnIpNative {
        #[serde(default)]
        pod_subnet_ids: Vec<String>,
        max_pods_per_node: Option<u32>,
        #[serde(default)]
        pod_nsg_ids: Vec<String>,
    },
    #[serde(rename = "FLANNEL_OVERLAY")]
    FlannelOverlay,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementConfig {
    /// Tenancy-prefixed name, e.g. `Uocm:PHX-AD-1`.
    pub availability_domain: String,
    #[serde(default)]
    pub subnet_id: String,
    pub capacity_reservation_id: Option<String>,
    #[serde(default)]
    pub fault_domains: Vec<String>,
    pub preemptible_node_config: Option<PreemptibleNodeConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreemptibleNodeConfig {
    pub preemption_action: PreemptionAction,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum PreemptionAction {
    #[serde(rename = "TERMINATE", rename_all = "camelCase")]
    Terminate { is_preserve_boot_volume: Option<bool> },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeLifecycleState {
    Creating,
    Active,
    Updating,
    Deleting,
    Deleted,
    Failing,
    Inactive,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub availability_domain: Option<String>,
    pub node_pool_id: Option<String>,
    pub fault_domain: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub node_error: Option<NodeError>,
    #[serde(default)]
    pub lifecycle_state: NodeLifecycleState,
    pub lifecycle_details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NodeError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    pub status: Option<String>,
    #[serde(rename = "opc-request-id")]
    pub opc_request_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub compartment_id: String,
    #[serde(default)]
    pub node_shape: String,
    #[serde(default)]
    pub freeform_tags: FreeformTags,
    #[serde(default)]
    pub defined_tags: DefinedTags,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNodePoolDetails {
    pub node_config_details: UpdateNodeConfigDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateNodeConfigDetails {
    pub size: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceLifecycleState {
    Moving,
    Provisioning,
    Running,
    Starting,
    Stopping,
    Stopped,
    CreatingImage,
    Terminating,
    Terminated,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Compute instance as returned by `ListInstances`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub lifecycle_state: InstanceLifecycleState,
    #[serde(default)]
    pub shape: String,
}

/// Compute shape as returned by `ListShapes`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeShape {
    pub shape: String,
    pub ocpus: Option<f32>,
    #[serde(rename = "memoryInGBs")]
    pub memory_in_gbs: Option<f32>,
    pub gpus: Option<u32>,
}

/// Error body of a failed OCI call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_node_pool_with_polymorphic_details() {
        let json = r#"{
            "id": "ocid1.nodepool.oc1.phx.aaaa",
            "clusterId": "ocid1.cluster.oc1.phx.bbbb",
            "compartmentId": "ocid1.compartment.oc1..cccc",
            "nodeShape": "VM.Standard.E4.Flex",
            "nodeShapeConfig": { "ocpus": 2.0, "memoryInGBs": 16.0 },
            "nodeSourceDetails": { "sourceType": "IMAGE", "imageId": "img", "bootVolumeSizeInGBs": 50 },
            "nodeConfigDetails": {
                "size": 3,
                "placementConfigs": [{
                    "availabilityDomain": "Uocm:PHX-AD-1",
                    "subnetId": "subnet",
                    "preemptibleNodeConfig": { "preemptionAction": { "type": "TERMINATE", "isPreserveBootVolume": false } }
                }],
                "nodePoolPodNetworkOptionDetails": { "cniType": "OCI_VCN_IP_NATIVE", "podSubnetIds": ["pods"], "maxPodsPerNode": 31 }
            },
            "nodes": [
                { "id": "n1", "lifecycleState": "ACTIVE" },
                { "id": "n2", "lifecycleState": "NEEDS_ATTENTION",
                  "nodeError": { "code": "LimitExceeded", "message": "m", "opc-request-id": "req" } }
            ]
        }"#;

        let pool: NodePool = serde_json::from_str(json).unwrap();

        assert_eq!(pool.configured_size(), Some(3));
        assert_eq!(
            pool.node_source_details,
            Some(NodeSourceDetails::Image {
                image_id: "img".to_string(),
                boot_volume_size_in_gbs: Some(50)
            })
        );
        let details = pool.node_config_details.as_ref().unwrap();
        assert!(matches!(
            details.node_pool_pod_network_option_details,
            Some(PodNetworkOptionDetails::VcnIpNative {
                max_pods_per_node: Some(31),
                ..
            })
        ));
        assert_eq!(
            pool.placement_configs()[0]
                .preemptible_node_config
                .as_ref()
                .unwrap()
                .preemption_action,
            PreemptionAction::Terminate {
                is_preserve_boot_volume: Some(false)
            }
        );
        assert_eq!(pool.nodes[0].lifecycle_state, NodeLifecycleState::Active);
        assert_eq!(pool.nodes[1].lifecycle_state, NodeLifecycleState::Unknown);
        assert_eq!(
            pool.nodes[1].node_error.as_ref().unwrap().opc_request_id.as_deref(),
            Some("req")
        );
    }

    #[test]
    fn unknown_discriminators_decode_to_fallback() {
        let net: PodNetworkOptionDetails =
            serde_json::from_str(r#"{ "cniType": "SOMETHING_NEW" }"#).unwrap();
        assert_eq!(net, PodNetworkOptionDetails::Unknown);

        let net: PodNetworkOptionDetails =
            serde_json::from_str(r#"{ "cniType": "FLANNEL_OVERLAY" }"#).unwrap();
        assert_eq!(net, PodNetworkOptionDetails::FlannelOverlay);

        let source: NodeSourceDetails =
            serde_json::from_str(r#"{ "sourceType": "BOOT_VOLUME", "bootVolumeId": "x" }"#)
                .unwrap();
        assert_eq!(source, NodeSourceDetails::Unknown);
    }

    #[test]
    fn update_body_only_carries_size() {
        let body = UpdateNodePoolDetails {
            node_config_details: UpdateNodeConfigDetails { size: 4 },
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"nodeConfigDetails":{"size":4}}"#
        );
    }
}
