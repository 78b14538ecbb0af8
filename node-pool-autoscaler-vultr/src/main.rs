use std::sync::Arc;

use anyhow::Error;
use node_pool_autoscaler::cloud_provider::{log_node_groups, CloudProvider};
use node_pool_autoscaler_vultr::{
    client::RestClient, config::VultrSettings, manager::VultrManager,
    provider::VultrCloudProvider,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();
    tracing::debug!("Starting..");

    let settings: VultrSettings = de_env::from_env()?;
    let client = RestClient::new(&settings);
    let client = Arc::new(client);

    let manager = VultrManager::new(client, settings.cluster_id.clone());
    let provider = VultrCloudProvider::new(Arc::new(manager));

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
