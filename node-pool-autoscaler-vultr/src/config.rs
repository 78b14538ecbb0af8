use std::time::Duration;

use duration_str::deserialize_option_duration;
use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "https://api.vultr.com/v2";
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Deserialize, Debug, Clone, Default)]
pub struct VultrSettings {
    #[serde(rename = "VULTR_API_TOKEN")]
    pub token: String,
    #[serde(rename = "VULTR_CLUSTER_ID")]
    pub cluster_id: String,
    #[serde(rename = "VULTR_API_URL", default)]
    pub api_url: Option<String>,
    #[serde(
        rename = "VULTR_REFRESH_INTERVAL",
        default,
        deserialize_with = "deserialize_option_duration"
    )]
    pub refresh_interval: Option<Duration>,
}

impl VultrSettings {
    pub fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or(DEFAULT_API_URL)
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_defaults_to_public_endpoint() {
        let settings = VultrSettings::default();
        assert_eq!(settings.api_url(), DEFAULT_API_URL);
        assert_eq!(settings.refresh_interval(), DEFAULT_REFRESH_INTERVAL);

        let settings = VultrSettings {
            api_url: Some("http://localhost:8080/v2/".to_string()),
            ..settings
        };
        assert_eq!(settings.api_url(), "http://localhost:8080/v2");
    }
}
