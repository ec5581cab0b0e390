//! Import: `sanity_import.ndjson` → target store
//!
//! Documents are upserted by `_id` in atomic batches, so re-running the
//! import over the same artifact leaves the store unchanged. A batch that
//! fails as a whole is retried one document at a time; documents that still
//! fail are written to `import_failures.csv`.

use crate::artifacts::{read_ndjson, ArtifactPaths, CsvLedger};
use crate::documents::RawDocument;
use crate::error::{MigrateError, MigrateResult};
use crate::pipeline::StageProgress;
use crate::store::ContentStore;
use std::path::Path;
use tracing::{info, warn};

pub const IMPORT_FAILURE_COLUMNS: &[&str] = &["_id", "_type", "error"];

/// Import results
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub total: usize,
    pub imported: usize,
    pub failed: usize,
    pub batches: usize,
    /// Batches that had to be retried per document
    pub batch_failures: usize,
}

/// Read the import artifact; missing or empty is fatal
pub fn load_documents(path: &Path) -> MigrateResult<Vec<RawDocument>> {
    let docs: Vec<RawDocument> = read_ndjson(path)?;
    if docs.is_empty() {
        return Err(MigrateError::MissingArtifact {
            path: path.to_path_buf(),
            stage: "transform",
        });
    }
    Ok(docs)
}

/// Contract checks that must pass before anything is written.
///
/// Any document of the superseded type aborts the import, as does a document
/// missing `_id` or `_type`.
pub fn guard_documents(docs: &[RawDocument], superseded_type: &str) -> MigrateResult<()> {
    if let Some((idx, doc)) = docs
        .iter()
        .enumerate()
        .find(|(_, d)| d.id.is_empty() || d.doc_type.is_empty())
    {
        let missing = if doc.id.is_empty() { "_id" } else { "_type" };
        return Err(MigrateError::InvalidDocument {
            line: idx + 1,
            reason: format!("missing {}", missing),
        });
    }

    let ids: Vec<String> = docs
        .iter()
        .filter(|d| d.doc_type == superseded_type)
        .map(|d| d.id.clone())
        .collect();
    if !ids.is_empty() {
        return Err(MigrateError::SupersededType {
            doc_type: superseded_type.to_string(),
            count: ids.len(),
            ids,
        });
    }
    Ok(())
}

/// Upsert documents in batches; returns the tally and the failure ledger
pub async fn import_documents(
    store: &dyn ContentStore,
    docs: &[RawDocument],
    batch_size: usize,
    progress: &StageProgress,
) -> (ImportSummary, CsvLedger) {
    let mut summary = ImportSummary {
        total: docs.len(),
        ..ImportSummary::default()
    };
    let mut failures = CsvLedger::new(IMPORT_FAILURE_COLUMNS);

    for (n, batch) in docs.chunks(batch_size.max(1)).enumerate() {
        summary.batches += 1;
        match store.commit_create_or_replace(batch).await {
            Ok(()) => {
                summary.imported += batch.len();
                for doc in batch {
                    progress.tick(&doc.id, true);
                }
            }
            Err(e) => {
                warn!("Batch {} failed ({}), retrying documents individually", n + 1, e);
                summary.batch_failures += 1;
                for doc in batch {
                    match store.create_or_replace(doc).await {
                        Ok(()) => {
                            summary.imported += 1;
                            progress.tick(&doc.id, true);
                        }
                        Err(e) => {
                            warn!("{} failed: {}", doc.id, e);
                            failures.push([doc.id.clone(), doc.doc_type.clone(), e.to_string()]);
                            summary.failed += 1;
                            progress.tick(&doc.id, false);
                        }
                    }
                }
            }
        }
    }

    (summary, failures)
}

/// Load, guard and import the transform artifact.
///
/// The failure ledger is written even when every document succeeds.
pub async fn run_import(
    store: &dyn ContentStore,
    superseded_type: &str,
    batch_size: usize,
    paths: &ArtifactPaths,
    quiet: bool,
) -> MigrateResult<ImportSummary> {
    let docs = load_documents(&paths.import())?;
    guard_documents(&docs, superseded_type)?;
    info!("{} document(s) passed the pre-import checks", docs.len());

    let progress = StageProgress::new("import", docs.len() as u64, quiet);
    let (summary, failures) = import_documents(store, &docs, batch_size, &progress).await;
    progress.finish();

    failures.write(&paths.import_failures())?;
    if !failures.is_empty() {
        warn!(
            "{} document(s) failed, see {}",
            failures.len(),
            paths.import_failures().display()
        );
    }
    Ok(summary)
}
