//! Configuration for the migration pipeline
//!
//! Built once in `main` from a TOML file plus environment overrides, then
//! passed by reference into every stage.

mod legacy;
mod logging;
mod pipeline;
mod target;

pub use legacy::{LegacyConfig, RouteMapping};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use pipeline::{AssetsConfig, ImportConfig, PathsConfig, SourceConfig};
pub use target::TargetConfig;

use crate::artifacts::ArtifactPaths;
use crate::error::MigrateError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default user agent for all HTTP requests
pub const DEFAULT_USER_AGENT: &str = "cms-migrate/0.1 (wp-to-sanity)";

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "migrate.toml";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source-system identity
    #[serde(default)]
    pub source: SourceConfig,
    /// Legacy API
    #[serde(default)]
    pub legacy: LegacyConfig,
    /// Target store
    #[serde(default)]
    pub target: TargetConfig,
    /// Asset transfer
    #[serde(default)]
    pub assets: AssetsConfig,
    /// Import
    #[serde(default)]
    pub import: ImportConfig,
    /// Artifact paths
    #[serde(default)]
    pub paths: PathsConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse the file if it exists, otherwise start from defaults.
    ///
    /// Not validated: environment overrides usually come next.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::parse_file(path)
        } else {
            Ok(Self::default())
        }
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))
    }

    /// Apply environment overrides from a lookup function.
    ///
    /// Recognised variables: `WP_BASE_URL`, `SANITY_PROJECT_ID` (or
    /// `VITE_SANITY_PROJECT_ID`), `SANITY_DATASET` (or `VITE_SANITY_DATASET`),
    /// `SANITY_API_VERSION` (or `VITE_SANITY_API_VERSION`),
    /// `SANITY_AUTH_TOKEN`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| lookup(n))
                .filter(|v| !v.trim().is_empty())
        };

        if let Some(base) = first(&["WP_BASE_URL"]) {
            self.legacy.base_url = base;
        }
        if let Some(id) = first(&["SANITY_PROJECT_ID", "VITE_SANITY_PROJECT_ID"]) {
            self.target.project_id = Some(id);
        }
        if let Some(dataset) = first(&["SANITY_DATASET", "VITE_SANITY_DATASET"]) {
            self.target.dataset = dataset;
        }
        if let Some(version) = first(&["SANITY_API_VERSION", "VITE_SANITY_API_VERSION"]) {
            self.target.api_version = version;
        }
        if let Some(token) = first(&["SANITY_AUTH_TOKEN"]) {
            self.target.token = Some(token);
        }
    }

    /// Apply overrides from a `.env` file (if present) and then the process
    /// environment. Real environment variables win over the file.
    pub fn apply_environment(&mut self, dotenv: &Path) -> Result<()> {
        let file_vars = match std::fs::read_to_string(dotenv) {
            Ok(raw) => parse_dotenv(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => anyhow::bail!("Failed to read {}: {}", dotenv.display(), e),
        };
        self.apply_env(|name| std::env::var(name).ok().or_else(|| file_vars.get(name).cloned()));
        Ok(())
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.source.system.is_empty()
            || !self
                .source
                .system
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            errors.push("source.system must be a non-empty [A-Za-z0-9_-] tag".to_string());
        }

        if url::Url::parse(self.legacy.base()).is_err() {
            errors.push(format!("legacy.base_url is not a valid URL: {}", self.legacy.base_url));
        }
        if self.legacy.per_page == 0 || self.legacy.per_page > 100 {
            errors.push("legacy.per_page must be between 1 and 100".to_string());
        }
        if self.legacy.request_timeout_secs == 0 {
            errors.push("legacy.request_timeout_secs must be positive".to_string());
        }
        if self.legacy.post_types.is_empty() {
            errors.push("legacy.post_types must list at least one route".to_string());
        }
        for mapping in self.legacy.post_types.iter() {
            if !mapping.target_type.is_content() {
                errors.push(format!(
                    "legacy.post_types route '{}' maps to non-content type {}",
                    mapping.route, mapping.target_type
                ));
            }
        }
        for mapping in self.legacy.taxonomies.iter() {
            if !mapping.target_type.is_taxonomy() {
                errors.push(format!(
                    "legacy.taxonomies route '{}' maps to non-taxonomy type {}",
                    mapping.route, mapping.target_type
                ));
            }
        }

        if self.assets.download_timeout_secs == 0 {
            errors.push("assets.download_timeout_secs must be positive".to_string());
        }
        if self.assets.flush_every == 0 {
            errors.push("assets.flush_every must be positive".to_string());
        }
        if self.assets.concurrency == 0 {
            errors.push("assets.concurrency must be positive".to_string());
        }

        if self.import.batch_size == 0 {
            errors.push("import.batch_size must be positive".to_string());
        }
        if self.import.batch_size > 250 {
            errors.push("import.batch_size must be <= 250 (store mutation limit)".to_string());
        }
        if self.import.superseded_type.is_empty() {
            errors.push("import.superseded_type must not be empty".to_string());
        }

        if self.paths.artifacts_dir.as_os_str().is_empty() {
            errors.push("paths.artifacts_dir must not be empty".to_string());
        }
        if self.paths.redirects_file.as_os_str().is_empty() {
            errors.push("paths.redirects_file must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }

    /// Fail fast when the target store cannot be addressed or written to
    pub fn require_target(&self) -> Result<(), MigrateError> {
        if self.target.project_id.as_deref().unwrap_or("").is_empty() {
            return Err(MigrateError::MissingConfig(
                "SANITY_PROJECT_ID (target.project_id)".to_string(),
            ));
        }
        if self.target.token.as_deref().unwrap_or("").is_empty() {
            return Err(MigrateError::MissingConfig(
                "SANITY_AUTH_TOKEN (write token required for migration)".to_string(),
            ));
        }
        Ok(())
    }

    /// Artifact locations for this configuration
    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.paths.artifacts_dir, &self.paths.redirects_file)
    }

    /// Render the default configuration as a commented TOML document
    pub fn default_toml() -> Result<String> {
        let body = toml::to_string_pretty(&Config::default())?;
        Ok(format!(
            "# cms-migrate configuration\n\
             #\n\
             # Credentials are read from the environment (or a .env file):\n\
             #   WP_BASE_URL, SANITY_PROJECT_ID, SANITY_DATASET, SANITY_AUTH_TOKEN\n\n{}",
            body
        ))
    }
}

/// Parse `KEY=value` lines; comments and blank lines are skipped and
/// surrounding quotes removed
pub fn parse_dotenv(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| {
            let v = v.trim();
            let v = v
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .or_else(|| v.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
                .unwrap_or(v);
            (k.trim().to_string(), v.to_string())
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TargetType;

    fn valid_config() -> Config {
        Config::default()
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ========================================================================
    // Config::validate
    // ========================================================================

    #[test]
    fn default_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut cfg = valid_config();
        cfg.import.batch_size = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("import.batch_size must be positive"));
    }

    #[test]
    fn validate_rejects_oversized_batch() {
        let mut cfg = valid_config();
        cfg.import.batch_size = 500;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("import.batch_size must be <= 250"));
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let mut cfg = valid_config();
        cfg.legacy.base_url = "not a url".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("legacy.base_url is not a valid URL"));
    }

    #[test]
    fn validate_rejects_taxonomy_route_mapped_to_content() {
        let mut cfg = valid_config();
        cfg.legacy.taxonomies.push(RouteMapping::new("series", TargetType::Article, "series"));
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("maps to non-taxonomy type article"));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = valid_config();
        cfg.legacy.per_page = 0;
        cfg.assets.concurrency = 0;
        cfg.import.superseded_type = String::new();
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("legacy.per_page must be between 1 and 100"));
        assert!(msg.contains("assets.concurrency must be positive"));
        assert!(msg.contains("import.superseded_type must not be empty"));
    }

    // ========================================================================
    // Environment overrides
    // ========================================================================

    #[test]
    fn env_overrides_apply() {
        let mut cfg = valid_config();
        cfg.apply_env(env(&[
            ("WP_BASE_URL", "https://legacy.example"),
            ("VITE_SANITY_PROJECT_ID", "abc123"),
            ("SANITY_DATASET", "staging"),
            ("SANITY_AUTH_TOKEN", "sk-test"),
        ]));
        assert_eq!(cfg.legacy.base_url, "https://legacy.example");
        assert_eq!(cfg.target.project_id.as_deref(), Some("abc123"));
        assert_eq!(cfg.target.dataset, "staging");
        assert_eq!(cfg.target.token.as_deref(), Some("sk-test"));
        assert_eq!(cfg.target.api_version, "2024-01-01");
    }

    #[test]
    fn env_primary_name_wins_over_alias() {
        let mut cfg = valid_config();
        cfg.apply_env(env(&[
            ("SANITY_PROJECT_ID", "primary"),
            ("VITE_SANITY_PROJECT_ID", "alias"),
        ]));
        assert_eq!(cfg.target.project_id.as_deref(), Some("primary"));
    }

    #[test]
    fn require_target_fails_fast_without_credentials() {
        let mut cfg = valid_config();
        let err = cfg.require_target().unwrap_err();
        assert!(err.to_string().contains("SANITY_PROJECT_ID"));

        cfg.target.project_id = Some("abc".into());
        let err = cfg.require_target().unwrap_err();
        assert!(err.to_string().contains("SANITY_AUTH_TOKEN"));

        cfg.target.token = Some("sk".into());
        assert!(cfg.require_target().is_ok());
    }

    #[test]
    fn dotenv_parsing_handles_quotes_and_comments() {
        let vars = parse_dotenv("# comment\nWP_BASE_URL='https://a.test'\n\nSANITY_DATASET=\"prod\"\nBROKEN\n");
        assert_eq!(vars.get("WP_BASE_URL").map(String::as_str), Some("https://a.test"));
        assert_eq!(vars.get("SANITY_DATASET").map(String::as_str), Some("prod"));
        assert_eq!(vars.len(), 2);
    }

    // ========================================================================
    // TOML
    // ========================================================================

    #[test]
    fn default_toml_round_trips() {
        let rendered = Config::default_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.import.batch_size, 50);
        assert_eq!(parsed.legacy.post_types.len(), 4);
        assert_eq!(parsed.legacy.post_types[3].target_type, TargetType::CaseStudy);
        assert!(parsed.target.token.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str("[import]\nbatch_size = 10\n").unwrap();
        assert_eq!(parsed.import.batch_size, 10);
        assert_eq!(parsed.import.superseded_type, "post");
        assert_eq!(parsed.assets.max_retries, 2);
        assert_eq!(parsed.legacy.per_page, 100);
    }

    #[test]
    fn default_values_match_pipeline_contract() {
        let cfg = valid_config();
        assert_eq!(cfg.assets.max_retries, 2);
        assert_eq!(cfg.assets.flush_every, 10);
        assert_eq!(cfg.assets.download_timeout_secs, 30);
        assert_eq!(cfg.import.batch_size, 50);
        assert_eq!(cfg.legacy.per_page, 100);
        assert_eq!(cfg.source.system, "wp");
    }
}
