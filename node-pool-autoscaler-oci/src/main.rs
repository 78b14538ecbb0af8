use std::sync::Arc;

use anyhow::{anyhow, Error};
use clap::Parser;
use kube::Client;
use node_pool_autoscaler::{
    client::DefaultKubeClient,
    cloud_provider::{log_node_groups, CloudProvider},
    model::NodeGroupSpec,
};
use node_pool_autoscaler_oci::{
    auth::{ApiKeySigner, AuthStrategy, RequestSigner},
    client::RestClient,
    config::OciSettings,
    discovery::NodeGroupAutoDiscovery,
    manager::{ManagerSettings, NodePoolManager},
    provider::OciCloudProvider,
};

/// Runs the OKE node-pool provider against a live cluster and reports what it sees.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Node pool to manage, as `<min>:<max>:<node pool ocid>`.
    #[arg(long = "nodes")]
    nodes: Vec<NodeGroupSpec>,

    /// Tag based node pool discovery.
    #[arg(long = "node-group-auto-discovery")]
    node_group_auto_discovery: Vec<NodeGroupAutoDiscovery>,
}

fn signer(settings: &OciSettings) -> Result<Arc<dyn RequestSigner>, Error> {
    match AuthStrategy::from_settings(settings) {
        AuthStrategy::ApiKey => Ok(Arc::new(ApiKeySigner::from_settings(settings)?)),
        strategy => Err(anyhow!(
            "{strategy:?} authentication requires a request signer from the embedding process"
        )),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();
    tracing::debug!("Starting..");

    let args = Args::parse();
    if args.nodes.is_empty() && args.node_group_auto_discovery.is_empty() {
        return Err(anyhow!("no node pools configured, use --nodes or --node-group-auto-discovery"));
    }

    let settings: OciSettings = de_env::from_env()?;
    let rest = RestClient::new(
        settings.oke_endpoint(),
        settings.compute_endpoint(),
        signer(&settings)?,
    );
    let rest = Arc::new(rest);

    let client = Client::try_default().await?;
    let client = DefaultKubeClient { client };
    let client = Arc::new(client);

    let manager = NodePoolManager::new(
        ManagerSettings {
            refresh_interval: settings.refresh_interval(),
            use_compute_for_node_count: settings.use_compute_for_node_count,
        },
        rest.clone(),
        rest,
        client,
        args.nodes,
        args.node_group_auto_discovery,
    );
    let provider = OciCloudProvider::start(Arc::new(manager)).await;

    let mut interval = tokio::time::interval(settings.refresh_interval());
    loop {
        interval.tick().await;

        if let Err(e) = provider.refresh().await {
            tracing::error!("Refresh failed: {:#}", e);
            continue;
        }

        log_node_groups(&provider.node_groups().await).await;
    }
}
