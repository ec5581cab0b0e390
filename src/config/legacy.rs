//! Legacy (WordPress REST API) source configuration

use crate::types::TargetType;
use serde::{Deserialize, Serialize};

use super::DEFAULT_USER_AGENT;

/// One REST collection to export and the target kind it maps to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMapping {
    /// REST route under `/wp-json/wp/v2/`
    pub route: String,
    /// Target document kind
    pub target_type: TargetType,
    /// Legacy type tag recorded on each export record
    pub legacy_type: String,
}

impl RouteMapping {
    pub fn new(route: &str, target_type: TargetType, legacy_type: &str) -> Self {
        Self {
            route: route.to_string(),
            target_type,
            legacy_type: legacy_type.to_string(),
        }
    }
}

/// Legacy API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// Site base URL (no trailing slash needed)
    pub base_url: String,
    /// Items requested per page
    pub per_page: u32,
    /// Request timeout (seconds)
    pub request_timeout_secs: u64,
    /// Pause between page requests (milliseconds)
    pub request_delay_ms: u64,
    /// Retries for a failed page request
    pub max_retries: u32,
    /// Linear backoff step between page retries (milliseconds)
    pub retry_delay_ms: u64,
    /// User agent string
    pub user_agent: String,
    /// Content collections, exported with `status=publish`
    pub post_types: Vec<RouteMapping>,
    /// Taxonomy collections, exported with `hide_empty=false`
    pub taxonomies: Vec<RouteMapping>,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sugartown.io".to_string(),
            per_page: 100,
            request_timeout_secs: 20,
            request_delay_ms: 250,
            max_retries: 2,
            retry_delay_ms: 1000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            post_types: vec![
                RouteMapping::new("posts", TargetType::Article, "post"),
                RouteMapping::new("pages", TargetType::Page, "page"),
                RouteMapping::new("gems", TargetType::Node, "gem"),
                RouteMapping::new("case-studies", TargetType::CaseStudy, "case_study"),
            ],
            taxonomies: vec![
                RouteMapping::new("categories", TargetType::Category, "category"),
                RouteMapping::new("tags", TargetType::Tag, "tag"),
            ],
        }
    }
}

impl LegacyConfig {
    /// Base URL without a trailing slash
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Base of the v2 REST namespace
    pub fn api_root(&self) -> String {
        format!("{}/wp-json/wp/v2", self.base())
    }
}
