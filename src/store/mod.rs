//! Target content store
//!
//! Every stage that reads from or writes to the new store goes through
//! [`ContentStore`]. [`SanityStore`] speaks the hosted HTTP API;
//! [`MemoryStore`] keeps documents in-process for dry runs and tests.

mod memory;
mod sanity;

pub use memory::MemoryStore;
pub use sanity::SanityStore;

use crate::documents::RawDocument;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by a content store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store answered HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid store response: {0}")]
    Decode(String),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("store is not configured: {0}")]
    NotConfigured(String),
}

/// Operator-managed redirect document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRedirect {
    #[serde(default)]
    pub from_path: String,
    #[serde(default)]
    pub to_path: Option<String>,
    #[serde(default = "default_redirect_status")]
    pub status_code: u16,
}

/// `_id` and current slug of a migrated document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSlug {
    #[serde(rename = "_id")]
    pub id: String,
    pub slug: String,
}

fn default_redirect_status() -> u16 {
    301
}

/// Document API of the target store
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Create-or-replace every document in one atomic transaction
    async fn commit_create_or_replace(&self, docs: &[RawDocument]) -> Result<(), StoreError>;

    /// Create-or-replace a single document
    async fn create_or_replace(&self, doc: &RawDocument) -> Result<(), StoreError>;

    /// Upload image bytes; returns the new asset's document ID
    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        filename: &str,
    ) -> Result<String, StoreError>;

    /// Number of documents of a type, optionally only those with provenance
    async fn count_documents(&self, doc_type: &str, legacy_only: bool) -> Result<u64, StoreError>;

    /// `slug.current` of every migrated document of a type
    async fn legacy_slugs(&self, doc_type: &str) -> Result<Vec<String>, StoreError>;

    /// Migrated content documents whose body or featured image still
    /// mentions `marker`
    async fn count_residual_legacy_urls(&self, marker: &str) -> Result<u64, StoreError>;

    /// Active operator redirects
    async fn active_redirects(&self) -> Result<Vec<StoreRedirect>, StoreError>;

    /// Current `slug.current` of every migrated document, by `_id`.
    ///
    /// Editors may rename slugs after import; this is what they changed to.
    async fn current_slugs(&self) -> Result<Vec<StoreSlug>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_defaults_to_permanent() {
        let r: StoreRedirect =
            serde_json::from_str(r#"{"fromPath":"/old","toPath":"/new"}"#).unwrap();
        assert_eq!(r.status_code, 301);
        assert_eq!(r.to_path.as_deref(), Some("/new"));
    }
}
