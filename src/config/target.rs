//! Target content store configuration

use serde::{Deserialize, Serialize};

/// Target store connection settings.
///
/// `project_id` and `token` normally come from the environment rather than
/// the config file; see [`super::Config::apply_env`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Store project identifier
    pub project_id: Option<String>,
    /// Dataset name
    pub dataset: String,
    /// HTTP API version date
    pub api_version: String,
    /// Write-capable API token
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Request timeout (seconds)
    pub request_timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            dataset: "production".to_string(),
            api_version: "2024-01-01".to_string(),
            token: None,
            request_timeout_secs: 60,
        }
    }
}

impl TargetConfig {
    /// Host for the data and asset APIs
    pub fn api_host(&self) -> Option<String> {
        self.project_id
            .as_deref()
            .map(|id| format!("https://{}.api.sanity.io/v{}", id, self.api_version))
    }
}
