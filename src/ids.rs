//! Deterministic identifiers and content hashes
//!
//! Every migrated document gets an `_id` derived only from its legacy
//! identity, which is what makes create-or-replace imports idempotent.

use md5::{Digest, Md5};

/// Source-system tag used as the first `_id` segment
pub const DEFAULT_SOURCE_SYSTEM: &str = "wp";

/// Build a deterministic document ID: `<system>.<docType>.<key>`.
///
/// Store IDs may only contain `[A-Za-z0-9._-]`; anything else in the key
/// (author logins with `@`, spaces, ...) is replaced with `-`.
///
/// ```
/// use cms_migrate::ids::make_id;
/// assert_eq!(make_id("wp", "article", 42), "wp.article.42");
/// assert_eq!(make_id("wp", "person", "jane doe"), "wp.person.jane-doe");
/// ```
pub fn make_id(system: &str, doc_type: &str, key: impl ToString) -> String {
    let safe: String = key
        .to_string()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{}.{}.{}", system, doc_type, safe)
}

/// MD5 hex digest, used as the import hash for change detection
pub fn content_hash(text: &str) -> String {
    bytes_hash(text.as_bytes())
}

/// MD5 hex digest of raw bytes
pub fn bytes_hash(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex(&hasher.finalize())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Generator for stable rich-text `_key` values.
///
/// Keys are derived from the owning document ID and a running counter, so a
/// re-run of the transformer over the same input produces identical keys and
/// the import causes no field drift.
#[derive(Debug, Clone)]
pub struct BlockKeys {
    seed: String,
    next: u32,
}

impl BlockKeys {
    /// Create a generator seeded by a document ID
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            next: 0,
        }
    }

    /// Next key in sequence (12 lowercase hex characters)
    pub fn next_key(&mut self) -> String {
        let n = self.next;
        self.next += 1;
        let digest = content_hash(&format!("{}#{}", self.seed, n));
        digest[..12].to_string()
    }
}
