use anyhow::Error;
use k8s_openapi::api::core::v1::Node;
use kube::{
    api::{Api, PostParams},
    Client,
};

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

/// The slice of the Kubernetes API the providers need: reading a node and
/// replacing it under optimistic concurrency.
#[trait_variant::make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait KubeClient {
    async fn get_node(&self, name: &str) -> Result<Node, Error>;
    async fn update_node(&self, node: &Node) -> Result<Node, Error>;
}

#[derive(Clone)]
pub struct DefaultKubeClient {
    pub client: Client,
}

impl KubeClient for DefaultKubeClient {
    async fn get_node(&self, name: &str) -> Result<Node, Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        let node = api.get(name).await?;
        Ok(node)
    }

    async fn update_node(&self, node: &Node) -> Result<Node, Error> {
        let name = node
            .metadata
            .name
            .as_ref()
            .ok_or(anyhow::anyhow!("Missing node name"))?;

        let api: Api<Node> = Api::all(self.client.clone());
        let node = api.replace(name, &PostParams::default(), node).await?;
        Ok(node)
    }
}

/// True when the error is an API server conflict (stale resource version).
pub fn is_conflict(err: &Error) -> bool {
    match err.downcast_ref::<kube::Error>() {
        Some(kube::Error::Api(response)) => response.reason == "Conflict" || response.code == 409,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use kube::core::ErrorResponse;

    use super::*;

    fn api_error(reason: &str, code: u16) -> Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "the object has been modified".to_string(),
            reason: reason.to_string(),
            code,
        })
        .into()
    }

    #[test]
    fn detects_conflict_by_reason_or_code() {
        assert!(is_conflict(&api_error("Conflict", 409)));
        assert!(is_conflict(&api_error("", 409)));
        assert!(!is_conflict(&api_error("NotFound", 404)));
        assert!(!is_conflict(&anyhow::anyhow!("Conflict")));
    }
}
