//! Per-stage pipeline configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Source-system identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Tag used as the first `_id` segment and in provenance metadata
    pub system: String,
    /// Substring identifying legacy-hosted asset URLs
    pub legacy_asset_marker: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            system: crate::ids::DEFAULT_SOURCE_SYSTEM.to_string(),
            legacy_asset_marker: "wp-content/uploads".to_string(),
        }
    }
}

/// Asset transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Per-download timeout (seconds)
    pub download_timeout_secs: u64,
    /// Retries after the first failed download
    pub max_retries: u32,
    /// Linear backoff step (milliseconds)
    pub retry_delay_ms: u64,
    /// Flush the manifest after this many completions
    pub flush_every: usize,
    /// Concurrent transfers
    pub concurrency: usize,
    /// Path fragment that marks a legacy upload
    pub priority_path_marker: String,
    /// Extensions (without dot) flagged for manual confirmation
    pub priority_extensions: Vec<String>,
    /// Whether the legacy corpus is known to contain a priority asset
    pub expect_priority_assets: bool,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: 30,
            max_retries: 2,
            retry_delay_ms: 1000,
            flush_every: 10,
            concurrency: 4,
            priority_path_marker: "/wp-content/uploads/".to_string(),
            priority_extensions: vec!["svg".to_string()],
            expect_priority_assets: true,
        }
    }
}

impl AssetsConfig {
    /// Whether a URL is a priority (vector) upload
    pub fn is_priority(&self, url: &str) -> bool {
        if !url.contains(&self.priority_path_marker) {
            return false;
        }
        let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
        self.priority_extensions
            .iter()
            .any(|ext| path.ends_with(&format!(".{}", ext.to_lowercase())))
    }
}

/// Import stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Documents per transaction
    pub batch_size: usize,
    /// Type this migration supersedes; its presence is a fatal transform bug
    pub superseded_type: String,
    /// Abort window before the first write (seconds)
    pub confirm_delay_secs: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            superseded_type: "post".to_string(),
            confirm_delay_secs: 3,
        }
    }
}

/// Artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for all intermediate artifacts
    pub artifacts_dir: PathBuf,
    /// Generated redirect rule file read by the hosting layer
    pub redirects_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            redirects_file: PathBuf::from("apps/web/public/_redirects"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_requires_uploads_path_and_vector_extension() {
        let assets = AssetsConfig::default();
        assert!(assets.is_priority("https://legacy.test/wp-content/uploads/2023/kg.svg"));
        assert!(assets.is_priority("https://legacy.test/wp-content/uploads/KG.SVG?ver=2"));
        assert!(!assets.is_priority("https://legacy.test/wp-content/uploads/photo.png"));
        assert!(!assets.is_priority("https://cdn.test/icons/logo.svg"));
    }
}
