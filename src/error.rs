//! Pipeline-level error types
//!
//! Only conditions that must stop a whole stage live here. Per-item failures
//! (one image, one document, one content type) are recorded in ledgers and
//! logs by the stage that hit them and never surface as a `MigrateError`.

use crate::artifacts::ArtifactError;
use crate::fetch::FetchError;
use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that abort a stage with a non-zero exit status
#[derive(Debug, Error)]
pub enum MigrateError {
    /// An upstream artifact is missing or empty
    #[error("no records found in {path} (run `{stage}` first)")]
    MissingArtifact { path: PathBuf, stage: &'static str },

    /// The legacy API could not be reached at export start
    #[error("cannot reach legacy API at {url}: {source}")]
    LegacyApiUnreachable {
        url: String,
        #[source]
        source: FetchError,
    },

    /// Required configuration is absent
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    /// A document carries the type this migration supersedes
    #[error(
        "{count} document(s) have _type \"{doc_type}\"; this is a transform bug, fix it before importing. Affected _ids: {}",
        ids.join(", ")
    )]
    SupersededType {
        doc_type: String,
        count: usize,
        ids: Vec<String>,
    },

    /// A transformed document violates the document contract
    #[error("invalid document at line {line}: {reason}")]
    InvalidDocument { line: usize, reason: String },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for pipeline stages
pub type MigrateResult<T> = Result<T, MigrateError>;
