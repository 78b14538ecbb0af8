use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{NodeCondition, Taint},
    apimachinery::pkg::apis::meta::v1::Time,
};

pub const LABEL_ARCH: &str = "kubernetes.io/arch";
pub const LABEL_OS: &str = "kubernetes.io/os";
pub const LABEL_INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";
pub const LABEL_REGION: &str = "topology.kubernetes.io/region";
pub const LABEL_ZONE: &str = "topology.kubernetes.io/zone";
pub const LABEL_HOSTNAME: &str = "kubernetes.io/hostname";

pub const LABEL_BETA_ARCH: &str = "beta.kubernetes.io/arch";
pub const LABEL_BETA_OS: &str = "beta.kubernetes.io/os";
pub const LABEL_BETA_INSTANCE_TYPE: &str = "beta.kubernetes.io/instance-type";
pub const LABEL_FAILURE_DOMAIN_REGION: &str = "failure-domain.beta.kubernetes.io/region";
pub const LABEL_FAILURE_DOMAIN_ZONE: &str = "failure-domain.beta.kubernetes.io/zone";

pub const GPU_RESOURCE: &str = "nvidia.com/gpu";

/// Labels every node carries regardless of provider.
pub fn generic_labels(
    node_name: &str,
    arch: &str,
    instance_type: &str,
    region: &str,
    zone: Option<&str>,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    let mut put = |key: &str, value: &str| {
        labels.insert(key.to_string(), value.to_string());
    };

    put(LABEL_ARCH, arch);
    put(LABEL_BETA_ARCH, arch);
    put(LABEL_OS, "linux");
    put(LABEL_BETA_OS, "linux");
    put(LABEL_INSTANCE_TYPE, instance_type);
    put(LABEL_BETA_INSTANCE_TYPE, instance_type);
    put(LABEL_REGION, region);
    put(LABEL_FAILURE_DOMAIN_REGION, region);
    put(LABEL_HOSTNAME, node_name);
    if let Some(zone) = zone {
        put(LABEL_ZONE, zone);
        put(LABEL_FAILURE_DOMAIN_ZONE, zone);
    }

    labels
}

/// Copies `extra` over `base`, overwriting keys present in both.
pub fn join_labels(
    mut base: BTreeMap<String, String>,
    extra: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    base.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    base
}

/// Conditions of a node that is up and free of pressure.
pub fn ready_conditions() -> Vec<NodeCondition> {
    let now = Time(chrono::Utc::now());
    let condition = |type_: &str, status: &str| NodeCondition {
        type_: type_.to_string(),
        status: status.to_string(),
        last_transition_time: Some(now.clone()),
        ..Default::default()
    };

    vec![
        condition("Ready", "True"),
        condition("NetworkUnavailable", "False"),
        condition("DiskPressure", "False"),
        condition("MemoryPressure", "False"),
        condition("PIDPressure", "False"),
    ]
}

/// Taint fitted to GPU nodes so that only pods asking for GPUs land on them.
pub fn gpu_taint() -> Taint {
    Taint {
        key: GPU_RESOURCE.to_string(),
        value: Some(String::new()),
        effect: crate::taints::EFFECT_NO_SCHEDULE.to_string(),
        time_added: None,
    }
}
