use anyhow::{anyhow, Error};
use k8s_openapi::api::core::v1::{Node, Taint};

use crate::{
    client::{is_conflict, KubeClient},
    retry::{update_on_conflict, ConflictRetry, UpdateOutcome},
};

/// Marks a node the autoscaler is about to delete, so that nothing gets
/// scheduled onto it even if the autoscaler restarts mid-deletion.
pub const TO_BE_DELETED_TAINT: &str = "ToBeDeletedByClusterAutoscaler";

pub const EFFECT_NO_SCHEDULE: &str = "NoSchedule";
const VALID_EFFECTS: [&str; 3] = [EFFECT_NO_SCHEDULE, "PreferNoSchedule", "NoExecute"];

/// Parses a single taint in `key[=value]:effect` form.
pub fn parse_taint(spec: &str) -> Result<Taint, Error> {
    let (key_value, effect) = spec
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("invalid taint spec {spec:?}: missing effect"))?;

    if !VALID_EFFECTS.contains(&effect) {
        return Err(anyhow!("invalid taint spec {spec:?}: unknown effect {effect:?}"));
    }

    let (key, value) = match key_value.split_once('=') {
        Some((key, value)) => (key, Some(value.to_string())),
        None => (key_value, None),
    };

    if key.is_empty() {
        return Err(anyhow!("invalid taint spec {spec:?}: empty key"));
    }

    Ok(Taint {
        key: key.to_string(),
        value,
        effect: effect.to_string(),
        time_added: None,
    })
}

/// Parses a comma separated taint list. Any malformed entry fails the whole list.
pub fn parse_taints(list: &str) -> Result<Vec<Taint>, Error> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_taint)
        .collect()
}

/// Adds `key` with `effect` to the node spec. Returns false if a taint with
/// that key is already present.
pub fn add_taint_to_spec(node: &mut Node, key: &str, effect: &str) -> bool {
    let spec = node.spec.get_or_insert_with(Default::default);
    let taints = spec.taints.get_or_insert_with(Vec::new);

    if let Some(existing) = taints.iter().find(|t| t.key == key) {
        tracing::debug!(
            "{} already present on node {:?}, taint: {:?}",
            key,
            node.metadata.name,
            existing
        );
        return false;
    }

    taints.push(Taint {
        key: key.to_string(),
        value: Some(chrono::Utc::now().timestamp().to_string()),
        effect: effect.to_string(),
        time_added: None,
    });
    true
}

/// Idempotently adds a taint to a node, retrying on update conflicts.
pub async fn add_taint<K>(
    client: &K,
    node: &Node,
    key: &str,
    effect: &str,
    policy: &ConflictRetry,
) -> Result<(), Error>
where
    K: KubeClient + Sync,
{
    let name = node
        .metadata
        .name
        .clone()
        .ok_or(anyhow!("Missing node name"))?;

    let outcome = update_on_conflict(
        policy,
        "add_taint",
        node.clone(),
        || client.get_node(&name),
        |node| add_taint_to_spec(node, key, effect),
        |node| async move { client.update_node(&node).await.map(|_| ()) },
        is_conflict,
    )
    .await
    .inspect_err(|e| tracing::warn!("Error while adding {} taint on node {}: {}", key, name, e))?;

    match outcome {
        UpdateOutcome::Applied => tracing::info!("Successfully added {} on node {}", key, name),
        UpdateOutcome::AlreadyApplied => {}
        UpdateOutcome::Exhausted => tracing::error!(
            "Could not add taint {} on node {} in {} attempts",
            key,
            name,
            policy.max_attempts
        ),
    }

    Ok(())
}

/// Taints every node with [`TO_BE_DELETED_TAINT`], stopping at the first failure.
pub async fn taint_nodes_for_deletion<K>(client: &K, nodes: &[Node]) -> Result<(), Error>
where
    K: KubeClient + Sync,
{
    let policy = ConflictRetry::default();
    for node in nodes {
        add_taint(client, node, TO_BE_DELETED_TAINT, EFFECT_NO_SCHEDULE, &policy).await?;
    }
    Ok(())
}
