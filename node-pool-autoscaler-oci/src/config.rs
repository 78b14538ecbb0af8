use std::time::Duration;

use duration_str::deserialize_option_duration;
use serde::Deserialize;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Provider settings read from the environment.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct OciSettings {
    #[serde(rename = "OCI_REGION")]
    pub region: String,
    #[serde(
        rename = "OCI_REFRESH_INTERVAL",
        default,
        deserialize_with = "deserialize_option_duration"
    )]
    pub refresh_interval: Option<Duration>,
    #[serde(rename = "OCI_USE_WORKLOAD_IDENTITY", default)]
    pub use_workload_identity: bool,
    #[serde(rename = "OCI_USE_INSTANCE_PRINCIPAL", default)]
    pub use_instance_principal: bool,
    #[serde(rename = "OKE_USE_INSTANCE_PRINCIPAL", default)]
    pub oke_use_instance_principal: bool,
    /// Alternative OKE endpoint, used for testing against dev control planes.
    #[serde(rename = "OKE_HOST_OVERRIDE", default)]
    pub oke_host_override: Option<String>,
    /// Count live nodes through the compute API instead of the node-pool cache
    /// when lowering a target size.
    #[serde(rename = "OKE_USE_COMPUTE_FOR_NODE_COUNT", default)]
    pub use_compute_for_node_count: bool,
    #[serde(rename = "OCI_TENANCY_OCID", default)]
    pub tenancy_ocid: Option<String>,
    #[serde(rename = "OCI_USER_OCID", default)]
    pub user_ocid: Option<String>,
    #[serde(rename = "OCI_KEY_FINGERPRINT", default)]
    pub key_fingerprint: Option<String>,
    #[serde(rename = "OCI_PRIVATE_KEY_PATH", default)]
    pub private_key_path: Option<String>,
}

impl OciSettings {
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL)
    }

    pub fn oke_endpoint(&self) -> String {
        match self.oke_host_override.as_deref().filter(|h| !h.is_empty()) {
            Some(host) if host.starts_with("http") => format!("{}/20180222", host.trim_end_matches('/')),
            Some(host) => format!("https://{host}/20180222"),
            None => format!(
                "https://containerengine.{}.oci.oraclecloud.com/20180222",
                self.region
            ),
        }
    }

    pub fn compute_endpoint(&self) -> String {
        format!("https://iaas.{}.oraclecloud.com/20160918", self.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_follow_region_and_override() {
        let settings = OciSettings {
            region: "us-ashburn-1".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.oke_endpoint(),
            "https://containerengine.us-ashburn-1.oci.oraclecloud.com/20180222"
        );
        assert_eq!(
            settings.compute_endpoint(),
            "https://iaas.us-ashburn-1.oraclecloud.com/20160918"
        );
        assert_eq!(settings.refresh_interval(), DEFAULT_REFRESH_INTERVAL);

        let settings = OciSettings {
            oke_host_override: Some("oke.dev.example".to_string()),
            ..settings
        };
        assert_eq!(settings.oke_endpoint(), "https://oke.dev.example/20180222");
    }
}
