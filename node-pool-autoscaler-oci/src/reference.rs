use k8s_openapi::api::core::v1::Node;
use node_pool_autoscaler::template::{
    LABEL_FAILURE_DOMAIN_ZONE, LABEL_INSTANCE_TYPE, LABEL_ZONE,
};

pub const NODE_POOL_ID_ANNOTATION: &str = "oci.oraclecloud.com/node-pool-id";
pub const COMPARTMENT_ID_ANNOTATION: &str = "oci.oraclecloud.com/compartment-id";
const PROVIDER_ID_PREFIX: &str = "oci://";

/// What the autoscaler knows about the OCI instance behind a Kubernetes node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OciRef {
    pub name: String,
    pub instance_id: String,
    /// Empty for nodes that have not registered their node pool yet.
    pub node_pool_id: String,
    pub compartment_id: String,
    pub availability_domain: String,
    pub shape: String,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
}

impl OciRef {
    pub fn from_node(node: &Node) -> Self {
        let metadata = &node.metadata;
        let annotation = |key: &str| {
            metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(key))
                .cloned()
                .unwrap_or_default()
        };
        let label = |key: &str| metadata.labels.as_ref().and_then(|l| l.get(key)).cloned();
        let address = |kind: &str| {
            node.status
                .as_ref()
                .and_then(|s| s.addresses.as_ref())
                .and_then(|addresses| addresses.iter().find(|a| a.type_ == kind))
                .map(|a| a.address.clone())
        };

        let instance_id = node
            .spec
            .as_ref()
            .and_then(|s| s.provider_id.as_deref())
            .map(|id| id.strip_prefix(PROVIDER_ID_PREFIX).unwrap_or(id).to_string())
            .unwrap_or_default();

        OciRef {
            name: metadata.name.clone().unwrap_or_default(),
            instance_id,
            node_pool_id: annotation(NODE_POOL_ID_ANNOTATION),
            compartment_id: annotation(COMPARTMENT_ID_ANNOTATION),
            availability_domain: label(LABEL_ZONE)
                .or_else(|| label(LABEL_FAILURE_DOMAIN_ZONE))
                .unwrap_or_default(),
            shape: label(LABEL_INSTANCE_TYPE).unwrap_or_default(),
            private_ip: address("InternalIP"),
            public_ip: address("ExternalIP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::{NodeAddress, NodeSpec, NodeStatus};
    use kube::api::ObjectMeta;

    use super::*;

    #[test]
    fn reads_provider_id_annotations_and_addresses() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("10.0.0.5".to_string()),
                annotations: Some(BTreeMap::from([
                    (NODE_POOL_ID_ANNOTATION.to_string(), "ocid1.nodepool.oc1.phx.aaa".to_string()),
                    (COMPARTMENT_ID_ANNOTATION.to_string(), "ocid1.compartment.oc1..bbb".to_string()),
                ])),
                labels: Some(BTreeMap::from([
                    (LABEL_FAILURE_DOMAIN_ZONE.to_string(), "PHX-AD-1".to_string()),
                    (LABEL_INSTANCE_TYPE.to_string(), "VM.Standard2.1".to_string()),
                ])),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                provider_id: Some("oci://ocid1.instance.oc1.phx.ccc".to_string()),
                ..Default::default()
            }),
            status: Some(NodeStatus {
                addresses: Some(vec![NodeAddress {
                    type_: "InternalIP".to_string(),
                    address: "10.0.0.5".to_string(),
                }]),
                ..Default::default()
            }),
        };

        let r = OciRef::from_node(&node);
        assert_eq!(r.instance_id, "ocid1.instance.oc1.phx.ccc");
        assert_eq!(r.node_pool_id, "ocid1.nodepool.oc1.phx.aaa");
        assert_eq!(r.compartment_id, "ocid1.compartment.oc1..bbb");
        assert_eq!(r.availability_domain, "PHX-AD-1");
        assert_eq!(r.shape, "VM.Standard2.1");
        assert_eq!(r.private_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(r.public_ip, None);
    }

    #[test]
    fn bare_provider_id_is_kept() {
        let node = Node {
            spec: Some(NodeSpec {
                provider_id: Some("ocid1.instance.oc1.phx.ccc".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let r = OciRef::from_node(&node);
        assert_eq!(r.instance_id, "ocid1.instance.oc1.phx.ccc");
        assert!(r.node_pool_id.is_empty());
    }
}
