//! In-process content store

use super::{ContentStore, StoreError, StoreRedirect, StoreSlug};
use crate::documents::RawDocument;
use crate::ids::bytes_hash;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

const CONTENT_TYPES: [&str; 4] = ["article", "node", "caseStudy", "page"];

/// Uploaded asset metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub filename: String,
    pub content_type: String,
    pub size: usize,
}

/// [`ContentStore`] backed by in-memory maps.
///
/// Supports failure injection: documents whose `_id` is rejected fail both
/// individually and as part of any transaction, and queries can be made to
/// fail wholesale.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, RawDocument>>,
    assets: Mutex<BTreeMap<String, StoredAsset>>,
    redirects: Mutex<Vec<StoreRedirect>>,
    rejected_ids: Mutex<HashSet<String>>,
    fail_queries: AtomicBool,
    fail_residual_scan: AtomicBool,
    commits: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any write touching this document
    pub fn reject_id(&self, id: impl Into<String>) {
        self.rejected_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.into());
    }

    /// Make every read query fail
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Make only the residual URL scan fail
    pub fn fail_residual_scan(&self, fail: bool) {
        self.fail_residual_scan.store(fail, Ordering::SeqCst);
    }

    pub fn add_redirect(&self, redirect: StoreRedirect) {
        self.redirects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(redirect);
    }

    /// Insert a document directly, bypassing failure injection
    pub fn seed(&self, doc: RawDocument) {
        self.docs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(doc.id.clone(), doc);
    }

    /// Change a stored document's `slug.current`, as an editor would.
    /// Returns false when the document does not exist.
    pub fn rename_slug(&self, id: &str, slug: &str) -> bool {
        let mut docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        match docs.get_mut(id) {
            Some(doc) => {
                doc.fields.insert(
                    "slug".to_string(),
                    serde_json::json!({"_type": "slug", "current": slug}),
                );
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<RawDocument> {
        self.docs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Snapshot of all documents, sorted by `_id`
    pub fn documents(&self) -> Vec<RawDocument> {
        self.docs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn assets(&self) -> BTreeMap<String, StoredAsset> {
        self.assets.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Successful atomic transactions
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Successful single-document writes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_rejected(&self, docs: &[RawDocument]) -> Result<(), StoreError> {
        let rejected = self.rejected_ids.lock().unwrap_or_else(|e| e.into_inner());
        match docs.iter().find(|d| rejected.contains(&d.id)) {
            Some(doc) => Err(StoreError::Rejected(format!(
                "document {} failed validation",
                doc.id
            ))),
            None => Ok(()),
        }
    }

    fn check_queries(&self) -> Result<(), StoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            Err(StoreError::Api {
                status: 503,
                body: "query service unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn commit_create_or_replace(&self, docs: &[RawDocument]) -> Result<(), StoreError> {
        self.check_rejected(docs)?;
        let mut stored = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        for doc in docs {
            stored.insert(doc.id.clone(), doc.clone());
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_or_replace(&self, doc: &RawDocument) -> Result<(), StoreError> {
        self.check_rejected(std::slice::from_ref(doc))?;
        self.docs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(doc.id.clone(), doc.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        filename: &str,
    ) -> Result<String, StoreError> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "bin".to_string());
        let digest = bytes_hash(&bytes);
        let id = format!("image-{}-{}", &digest[..16], ext);
        self.assets.lock().unwrap_or_else(|e| e.into_inner()).insert(
            id.clone(),
            StoredAsset {
                filename: filename.to_string(),
                content_type: content_type.to_string(),
                size: bytes.len(),
            },
        );
        Ok(id)
    }

    async fn count_documents(&self, doc_type: &str, legacy_only: bool) -> Result<u64, StoreError> {
        self.check_queries()?;
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(docs
            .values()
            .filter(|d| d.doc_type == doc_type)
            .filter(|d| !legacy_only || d.has_legacy_source())
            .count() as u64)
    }

    async fn legacy_slugs(&self, doc_type: &str) -> Result<Vec<String>, StoreError> {
        self.check_queries()?;
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(docs
            .values()
            .filter(|d| d.doc_type == doc_type && d.has_legacy_source())
            .filter_map(|d| d.slug().map(str::to_string))
            .collect())
    }

    async fn count_residual_legacy_urls(&self, marker: &str) -> Result<u64, StoreError> {
        self.check_queries()?;
        if self.fail_residual_scan.load(Ordering::SeqCst) {
            return Err(StoreError::Api {
                status: 400,
                body: "query parse error".to_string(),
            });
        }
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        let count = docs
            .values()
            .filter(|d| CONTENT_TYPES.contains(&d.doc_type.as_str()) && d.has_legacy_source())
            .filter(|d| {
                ["content", "sections", "featuredImage"]
                    .iter()
                    .filter_map(|field| d.fields.get(*field))
                    .any(|value| value.to_string().contains(marker))
            })
            .count();
        Ok(count as u64)
    }

    async fn active_redirects(&self) -> Result<Vec<StoreRedirect>, StoreError> {
        self.check_queries()?;
        Ok(self
            .redirects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn current_slugs(&self) -> Result<Vec<StoreSlug>, StoreError> {
        self.check_queries()?;
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(docs
            .values()
            .filter(|d| d.has_legacy_source())
            .filter_map(|d| {
                d.slug().map(|slug| StoreSlug {
                    id: d.id.clone(),
                    slug: slug.to_string(),
                })
            })
            .collect())
    }
}
