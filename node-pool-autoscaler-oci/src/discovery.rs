use std::{collections::BTreeMap, str::FromStr};

use anyhow::{anyhow, Error};
use node_pool_autoscaler::model::NodeGroupSpec;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::{
    client::{ApiError, OkeClient},
    oke::{DefinedTags, FreeformTags},
};

const CLUSTER_ID: &str = "clusterId";
const COMPARTMENT_ID: &str = "compartmentId";
const NODEPOOL_TAGS: &str = "nodepoolTags";
const MIN: &str = "min";
const MAX: &str = "max";

/// Selects the node pools of a cluster carrying a given set of tags, given as
/// `clusterId:<id>,compartmentId:<id>,nodepoolTags:<k>=<v>&<ns.k>=<v>,min:<n>,max:<n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroupAutoDiscovery {
    pub cluster_id: String,
    pub compartment_id: String,
    pub tags: BTreeMap<String, String>,
    pub min_size: u32,
    pub max_size: u32,
}

impl FromStr for NodeGroupAutoDiscovery {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let pattern = [COMPARTMENT_ID, NODEPOOL_TAGS, MAX, MIN, CLUSTER_ID]
            .iter()
            .map(|key| format!("{key}:(?P<{key}>[^,]+)"))
            .collect::<Vec<_>>()
            .join("|");
        let re = Regex::new(&format!("(?:{pattern})(?:,|$)"))?;

        let mut params: BTreeMap<&str, &str> = BTreeMap::new();
        for captures in re.captures_iter(value) {
            for name in re.capture_names().flatten() {
                if let Some(m) = captures.name(name) {
                    params.insert(name, m.as_str());
                }
            }
        }

        let required = |key: &str| {
            params
                .get(key)
                .copied()
                .ok_or_else(|| anyhow!("failed to set {key}, it is missing in node-group-auto-discovery parameter"))
        };
        let size = |key: &str| -> Result<u32, Error> {
            let raw = params.get(key).copied().unwrap_or_default();
            raw.parse()
                .map_err(|_| anyhow!("failed to set {key} size: {raw}, expected integer"))
        };

        let cluster_id = required(CLUSTER_ID)?.to_string();
        let compartment_id = required(COMPARTMENT_ID)?.to_string();
        let min_size = size(MIN)?;
        let max_size = size(MAX)?;

        let mut tags = BTreeMap::new();
        for pair in required(NODEPOOL_TAGS)?.split('&') {
            let parts: Vec<&str> = pair.split('=').collect();
            let &[key, value] = parts.as_slice() else {
                return Err(anyhow!(
                    "nodepoolTags should be given in tagKey=tagValue format, this is not valid: {pair}"
                ));
            };
            tags.insert(key.to_string(), value.to_string());
        }

        let spec = NodeGroupAutoDiscovery {
            cluster_id,
            compartment_id,
            tags,
            min_size,
            max_size,
        };
        info!("node group auto discovery spec constructed: {:?}", spec);
        Ok(spec)
    }
}

/// True when every wanted tag is present with the same value. Keys of the
/// form `namespace.key` are looked up in the defined tags, others in the
/// freeform tags.
pub fn validate_node_pool_tags(
    wanted: &BTreeMap<String, String>,
    freeform: &FreeformTags,
    defined: &DefinedTags,
) -> bool {
    wanted.iter().all(|(key, value)| {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            &[namespace, name] => defined
                .get(namespace)
                .and_then(|tags| tags.get(name))
                .and_then(|v| v.as_str())
                == Some(value.as_str()),
            _ => freeform.get(key) == Some(value),
        }
    })
}

impl NodeGroupAutoDiscovery {
    /// Lists the cluster's node pools and keeps those whose tags match.
    pub async fn discover<O>(&self, client: &O) -> Result<Vec<NodeGroupSpec>, ApiError>
    where
        O: OkeClient + Sync,
    {
        let summaries = client
            .list_node_pools(&self.cluster_id, &self.compartment_id)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    "failed to fetch the nodepool list with clusterId: {}, compartmentId: {}. Error: {}",
                    self.cluster_id,
                    self.compartment_id,
                    e
                )
            })?;

        let mut specs = vec![];
        for summary in summaries {
            if validate_node_pool_tags(&self.tags, &summary.freeform_tags, &summary.defined_tags) {
                debug!(
                    compartment = %self.compartment_id,
                    node_pool = %summary.id,
                    "auto discovered nodepool"
                );
                specs.push(NodeGroupSpec {
                    min_size: self.min_size,
                    max_size: self.max_size,
                    id: summary.id,
                });
            } else {
                warn!(
                    "nodepool ignored as the tags do not satisfy the requirement: {}, {:?}, {:?}",
                    summary.id, summary.freeform_tags, summary.defined_tags
                );
            }
        }
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use mockall::predicate::eq;
    use serde_json::json;

    use crate::{client::MockOkeClient, oke::NodePoolSummary};

    use super::*;

    const ARG: &str = "clusterId:ocid1.cluster.oc1.test-region.test,compartmentId:ocid1.compartment.oc1.test-region.test,nodepoolTags:ca-managed=true&namespace.foo=bar,min:1,max:5";

    fn wanted(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_all_keys() {
        let spec: NodeGroupAutoDiscovery = ARG.parse().unwrap();
        assert_eq!(spec.cluster_id, "ocid1.cluster.oc1.test-region.test");
        assert_eq!(spec.compartment_id, "ocid1.compartment.oc1.test-region.test");
        assert_eq!(spec.min_size, 1);
        assert_eq!(spec.max_size, 5);
        assert_eq!(spec.tags["ca-managed"], "true");
        assert_eq!(spec.tags["namespace.foo"], "bar");
    }

    #[test]
    fn keys_may_come_in_any_order() {
        let spec: NodeGroupAutoDiscovery =
            "max:3,nodepoolTags:a=b,min:0,compartmentId:comp,clusterId:cluster"
                .parse()
                .unwrap();
        assert_eq!(spec.cluster_id, "cluster");
        assert_eq!(spec.max_size, 3);
    }

    #[test]
    fn rejects_missing_or_malformed_parts() {
        assert!("compartmentId:c,nodepoolTags:a=b,min:1,max:5"
            .parse::<NodeGroupAutoDiscovery>()
            .is_err());
        assert!("clusterId:x,compartmentId:c,min:1,max:5"
            .parse::<NodeGroupAutoDiscovery>()
            .is_err());
        assert!("clusterId:x,compartmentId:c,nodepoolTags:a=b,min:one,max:5"
            .parse::<NodeGroupAutoDiscovery>()
            .is_err());
        assert!("clusterId:x,compartmentId:c,nodepoolTags:novalue,min:1,max:5"
            .parse::<NodeGroupAutoDiscovery>()
            .is_err());
    }

    #[test]
    fn matches_freeform_and_defined_tags() {
        let freeform = HashMap::from([
            ("foo".to_string(), "bar".to_string()),
            ("testTag".to_string(), "testTagValue".to_string()),
        ]);
        let defined = HashMap::from([(
            "ns".to_string(),
            HashMap::from([("testTag".to_string(), json!("testTagValue"))]),
        )]);
        let none = HashMap::new();

        assert!(validate_node_pool_tags(&BTreeMap::new(), &none, &HashMap::new()));
        assert!(!validate_node_pool_tags(
            &wanted(&[("testTag", "testTagValue")]),
            &none,
            &HashMap::new()
        ));
        assert!(!validate_node_pool_tags(
            &wanted(&[("testTag", "testTagValue")]),
            &HashMap::from([("foo".to_string(), "bar".to_string())]),
            &HashMap::new()
        ));
        assert!(validate_node_pool_tags(
            &wanted(&[("testTag", "testTagValue")]),
            &freeform,
            &HashMap::new()
        ));
        assert!(validate_node_pool_tags(
            &wanted(&[("ns.testTag", "testTagValue")]),
            &none,
            &defined
        ));
    }

    #[tokio::test]
    async fn discovers_only_matching_pools() {
        let mut client = MockOkeClient::new();
        client
            .expect_list_node_pools()
            .with(
                eq("ocid1.cluster.oc1.test-region.test"),
                eq("ocid1.compartment.oc1.test-region.test"),
            )
            .returning(|_, _| {
                let defined = HashMap::from([(
                    "namespace".to_string(),
                    HashMap::from([("foo".to_string(), json!("bar"))]),
                )]);
                let pools = vec![
                    NodePoolSummary {
                        id: "node-pool-1".to_string(),
                        freeform_tags: HashMap::from([("ca-managed".to_string(), "true".to_string())]),
                        defined_tags: defined.clone(),
                        ..Default::default()
                    },
                    NodePoolSummary {
                        id: "node-pool-2".to_string(),
                        freeform_tags: HashMap::from([("ca-managed".to_string(), "false".to_string())]),
                        defined_tags: defined,
                        ..Default::default()
                    },
                ];
                Box::pin(async move { Ok(pools) })
            })
            .once();

        let spec: NodeGroupAutoDiscovery = ARG.parse().unwrap();
        let found = spec.discover(&client).await.unwrap();

        assert_eq!(
            found,
            vec![NodeGroupSpec {
                min_size: 1,
                max_size: 5,
                id: "node-pool-1".to_string()
            }]
        );
    }
}
