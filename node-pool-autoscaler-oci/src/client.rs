use std::sync::Arc;

use reqwest::{header::HeaderMap, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::{
    auth::RequestSigner,
    oke::{
        ComputeShape, InstanceSummary, NodePool, NodePoolSummary, ServiceErrorBody,
        UpdateNodeConfigDetails, UpdateNodePoolDetails,
    },
};

const OPC_NEXT_PAGE: &str = "opc-next-page";
const OPC_REQUEST_ID: &str = "opc-request-id";
const LIST_INSTANCES_LIMIT: &str = "500";

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{status} {code}: {message} (opc-request-id: {opc_request_id:?})")]
    Service {
        status: StatusCode,
        code: String,
        message: String,
        opc_request_id: Option<String>,
    },
    #[error("request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
    /// HTTP status of the response, if one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Service { status, .. } => Some(*status),
            ApiError::Transport(_) => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(Box::new(e))
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<String>,
}

/// The OKE operations the autoscaler relies on.
#[trait_variant::make(Send)]
#[cfg_attr(test, automock)]
pub trait OkeClient {
    async fn get_node_pool(&self, node_pool_id: &str) -> Result<NodePool, ApiError>;
    /// Changes only the configured size of the pool.
    async fn update_node_pool(&self, node_pool_id: &str, size: u32) -> Result<(), ApiError>;
    async fn delete_node(
        &self,
        node_pool_id: &str,
        node_id: &str,
        is_decrement_size: bool,
    ) -> Result<(), ApiError>;
    async fn list_node_pools(
        &self,
        cluster_id: &str,
        compartment_id: &str,
    ) -> Result<Vec<NodePoolSummary>, ApiError>;
}

#[trait_variant::make(Send)]
#[cfg_attr(test, automock)]
pub trait ComputeClient {
    async fn list_instances(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> Result<Page<InstanceSummary>, ApiError>;
    async fn list_shapes(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> Result<Page<ComputeShape>, ApiError>;
}

/// Signed REST client for both the OKE and the Compute endpoints.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    oke_endpoint: String,
    compute_endpoint: String,
    signer: Arc<dyn RequestSigner>,
}

impl RestClient {
    pub fn new(oke_endpoint: String, compute_endpoint: String, signer: Arc<dyn RequestSigner>) -> Self {
        RestClient {
            client: Client::new(),
            oke_endpoint,
            compute_endpoint,
            signer,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let mut request = builder.build()?;
        self.signer
            .sign(&mut request)
            .map_err(|e| ApiError::Transport(e.into()))?;

        debug!("{} {}", request.method(), request.url());
        let response = self.client.execute(request).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(service_error(response).await)
        }
    }

    async fn list_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        page: Option<String>,
    ) -> Result<Page<T>, ApiError> {
        let url = format!("{}/{path}", self.compute_endpoint);
        let mut builder = self.client.get(url).query(query);
        if let Some(page) = &page {
            builder = builder.query(&[("page", page)]);
        }

        let response = self.send(builder).await?;
        let next_page = header(response.headers(), OPC_NEXT_PAGE);
        let items = response.json().await?;
        Ok(Page { items, next_page })
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn service_error(response: Response) -> ApiError {
    let status = response.status();
    let opc_request_id = header(response.headers(), OPC_REQUEST_ID);
    let body: ServiceErrorBody = response.json().await.unwrap_or_default();
    ApiError::Service {
        status,
        code: body.code,
        message: body.message,
        opc_request_id,
    }
}

impl OkeClient for RestClient {
    async fn get_node_pool(&self, node_pool_id: &str) -> Result<NodePool, ApiError> {
        let url = format!("{}/nodePools/{node_pool_id}", self.oke_endpoint);
        let response = self.send(self.client.get(url)).await?;
        Ok(response.json().await?)
    }

    async fn update_node_pool(&self, node_pool_id: &str, size: u32) -> Result<(), ApiError> {
        let url = format!("{}/nodePools/{node_pool_id}", self.oke_endpoint);
        let body = UpdateNodePoolDetails {
            node_config_details: UpdateNodeConfigDetails { size },
        };
        self.send(self.client.request(Method::PUT, url).json(&body))
            .await?;
        Ok(())
    }

    async fn delete_node(
        &self,
        node_pool_id: &str,
        node_id: &str,
        is_decrement_size: bool,
    ) -> Result<(), ApiError> {
        let url = format!("{}/nodePools/{node_pool_id}/node/{node_id}", self.oke_endpoint);
        let builder = self
            .client
            .delete(url)
            .query(&[("isDecrementSize", is_decrement_size)]);
        self.send(builder).await?;
        Ok(())
    }

    async fn list_node_pools(
        &self,
        cluster_id: &str,
        compartment_id: &str,
    ) -> Result<Vec<NodePoolSummary>, ApiError> {
        let url = format!("{}/nodePools", self.oke_endpoint);
        let mut pools = Vec::new();
        let mut page: Option<String> = None;

        loop {
            let mut builder = self
                .client
                .get(&url)
                .query(&[("clusterId", cluster_id), ("compartmentId", compartment_id)]);
            if let Some(page) = &page {
                builder = builder.query(&[("page", page)]);
            }

            let response = self.send(builder).await?;
            page = header(response.headers(), OPC_NEXT_PAGE);
            let items: Vec<NodePoolSummary> = response.json().await?;
            pools.extend(items);

            if page.is_none() {
                return Ok(pools);
            }
        }
    }
}

impl ComputeClient for RestClient {
    async fn list_instances(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> Result<Page<InstanceSummary>, ApiError> {
        self.list_page(
            "instances",
            &[("compartmentId", compartment_id), ("limit", LIST_INSTANCES_LIMIT)],
            page,
        )
        .await
    }

    async fn list_shapes(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> Result<Page<ComputeShape>, ApiError> {
        self.list_page("shapes", &[("compartmentId", compartment_id)], page)
            .await
    }
}
