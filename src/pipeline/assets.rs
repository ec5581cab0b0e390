//! Asset transfer: legacy images → store assets
//!
//! Every image URL referenced by the export (featured images first, then
//! body images) is downloaded and uploaded once. `image_manifest.json` is the
//! only record of what has been transferred: entries already present are
//! skipped, so an interrupted run resumes where it stopped.
//!
//! Downloads and uploads run in a bounded pool. Only the consuming loop
//! touches the manifest and the failure ledger, one result at a time.

use crate::artifacts::{read_json, read_ndjson, write_json, ArtifactPaths, CsvLedger};
use crate::config::AssetsConfig;
use crate::error::{MigrateError, MigrateResult};
use crate::fetch::{retry_with_backoff, AssetFetcher, RetryPolicy};
use crate::pipeline::StageProgress;
use crate::store::ContentStore;
use crate::types::{ExportRecord, ImageManifest, LegacyId, ManifestEntry};
use crate::util::file_name_from_url;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const IMAGE_FAILURE_COLUMNS: &[&str] =
    &["wpId", "docType", "imageUrl", "fieldContext", "failureReason"];

/// One distinct image URL and the first record that referenced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    pub url: String,
    pub wp_id: LegacyId,
    pub doc_type: String,
    /// `featuredImage` or `bodyContent`
    pub field_context: &'static str,
    pub is_priority: bool,
}

/// Transfer results
#[derive(Debug, Clone, Default)]
pub struct TransferSummary {
    /// Distinct URLs referenced by the export
    pub discovered: usize,
    /// URLs already in the manifest before this run
    pub already_done: usize,
    pub transferred: usize,
    pub failed: usize,
    /// Priority URLs among the discovered ones
    pub priority: Vec<String>,
    pub manifest_size: usize,
}

/// Distinct image URLs in record order, `data:` URIs skipped
pub fn collect_image_jobs(records: &[ExportRecord], config: &AssetsConfig) -> Vec<ImageJob> {
    let mut seen = HashSet::new();
    let mut jobs = Vec::new();
    for record in records {
        let doc_type = record
            .sanity_type
            .map(|t| t.as_str().to_string())
            .unwrap_or_else(|| record.post_type.clone());
        for (url, field_context) in record.referenced_images() {
            let url = url.trim();
            if url.is_empty() || url.starts_with("data:") || !seen.insert(url.to_string()) {
                continue;
            }
            jobs.push(ImageJob {
                url: url.to_string(),
                wp_id: record.wp_id,
                doc_type: doc_type.clone(),
                field_context,
                is_priority: config.is_priority(url),
            });
        }
    }
    jobs
}

async fn transfer_one(
    fetcher: &dyn AssetFetcher,
    store: &dyn ContentStore,
    policy: RetryPolicy,
    url: &str,
) -> Result<String, String> {
    let downloaded = retry_with_backoff(policy, |attempt| {
        if attempt > 0 {
            debug!("retry {} for {}", attempt, url);
        }
        fetcher.download(url)
    })
    .await
    .map_err(|e| format!("download failed: {}", e))?;

    store
        .upload_image(
            downloaded.bytes,
            &downloaded.content_type,
            &file_name_from_url(url),
        )
        .await
        .map_err(|e| format!("upload failed: {}", e))
}

/// Transfer every image referenced by the export artifact.
///
/// Per-image failures go to `image_failures.csv` (always written) and never
/// stop the run. A missing or empty export is fatal.
pub async fn run_transfer(
    fetcher: &dyn AssetFetcher,
    store: &dyn ContentStore,
    config: &AssetsConfig,
    paths: &ArtifactPaths,
    quiet: bool,
) -> MigrateResult<TransferSummary> {
    let records: Vec<ExportRecord> = read_ndjson(&paths.export())?;
    if records.is_empty() {
        return Err(MigrateError::MissingArtifact {
            path: paths.export(),
            stage: "export",
        });
    }

    let mut manifest: ImageManifest = read_json(&paths.image_manifest())?.unwrap_or_default();
    let jobs = collect_image_jobs(&records, config);

    let mut summary = TransferSummary {
        discovered: jobs.len(),
        priority: jobs
            .iter()
            .filter(|j| j.is_priority)
            .map(|j| j.url.clone())
            .collect(),
        ..TransferSummary::default()
    };

    if !summary.priority.is_empty() {
        info!("Priority assets (confirm manually after transfer):");
        for url in &summary.priority {
            info!("  {}", url);
        }
    }

    let (done, pending): (Vec<ImageJob>, Vec<ImageJob>) =
        jobs.into_iter().partition(|j| manifest.contains(&j.url));
    summary.already_done = done.len();
    info!(
        "{} image URL(s): {} already transferred, {} to go",
        summary.discovered,
        summary.already_done,
        pending.len()
    );

    let policy = RetryPolicy::new(
        config.max_retries,
        Duration::from_millis(config.retry_delay_ms),
    );
    let flush_every = config.flush_every.max(1);
    let progress = StageProgress::new("images", pending.len() as u64, quiet);
    let mut failures = CsvLedger::new(IMAGE_FAILURE_COLUMNS);
    let mut completed = 0usize;
    let mut flush_error = None;

    let mut results = stream::iter(pending)
        .map(|job| async move {
            let result = transfer_one(fetcher, store, policy, &job.url).await;
            (job, result)
        })
        .buffer_unordered(config.concurrency.max(1));

    while let Some((job, result)) = results.next().await {
        match result {
            Ok(asset_ref) => {
                debug!("{} -> {}", job.url, asset_ref);
                manifest.insert(
                    job.url.clone(),
                    ManifestEntry {
                        sanity_asset_ref: asset_ref,
                        is_priority_svg: job.is_priority,
                        original_url: job.url.clone(),
                    },
                );
                summary.transferred += 1;
                progress.tick(&job.url, true);
            }
            Err(reason) => {
                warn!("Image {} (wp {}) failed: {}", job.url, job.wp_id, reason);
                failures.push([
                    job.wp_id.to_string(),
                    job.doc_type.clone(),
                    job.url.clone(),
                    job.field_context.to_string(),
                    reason,
                ]);
                summary.failed += 1;
                progress.tick(&job.url, false);
            }
        }

        completed += 1;
        if completed % flush_every == 0 {
            if let Err(e) = write_json(&paths.image_manifest(), &manifest) {
                warn!("Could not flush the image manifest, stopping the transfer: {}", e);
                flush_error = Some(e);
                break;
            }
        }
    }
    progress.finish();

    // The ledger is written even when the manifest cannot be
    failures.write(&paths.image_failures())?;
    if let Some(e) = flush_error {
        return Err(e.into());
    }
    write_json(&paths.image_manifest(), &manifest)?;
    summary.manifest_size = manifest.len();

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Downloaded, FetchError};
    use crate::store::MemoryStore;
    use crate::types::TargetType;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct StaticFetcher {
        failing: Vec<String>,
    }

    #[async_trait]
    impl AssetFetcher for StaticFetcher {
        async fn download(&self, url: &str) -> Result<Downloaded, FetchError> {
            if self.failing.iter().any(|f| f == url) {
                return Err(FetchError::Status {
                    status: 404,
                    body: "Not Found".into(),
                });
            }
            Ok(Downloaded {
                bytes: url.as_bytes().to_vec(),
                content_type: "image/png".into(),
            })
        }
    }

    fn article(wp_id: u64, featured: Option<&str>, body: &[&str]) -> ExportRecord {
        ExportRecord {
            wp_id,
            post_type: "post".into(),
            sanity_type: Some(TargetType::Article),
            slug: format!("a-{}", wp_id),
            featured_media_url: featured.map(str::to_string),
            image_urls: body.iter().map(|u| u.to_string()).collect(),
            ..ExportRecord::default()
        }
    }

    #[test]
    fn jobs_are_distinct_and_keep_first_context() {
        let records = vec![
            article(1, Some("https://l.test/wp-content/uploads/logo.SVG"), &["https://l.test/a.png"]),
            article(2, Some("https://l.test/a.png"), &["data:image/png;base64,AA", "https://l.test/b.png"]),
        ];
        let jobs = collect_image_jobs(&records, &AssetsConfig::default());
        let urls: Vec<&str> = jobs.iter().map(|j| j.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://l.test/wp-content/uploads/logo.SVG",
                "https://l.test/a.png",
                "https://l.test/b.png"
            ]
        );
        assert!(jobs[0].is_priority);
        assert_eq!(jobs[0].field_context, "featuredImage");
        assert_eq!(jobs[1].wp_id, 1);
        assert_eq!(jobs[1].field_context, "bodyContent");
        assert_eq!(jobs[2].doc_type, "article");
    }

    #[tokio::test]
    async fn failures_are_ledgered_and_successes_kept() {
        let dir = TempDir::new().unwrap();
        let paths = ArtifactPaths::new(dir.path(), dir.path().join("_redirects"));
        crate::artifacts::write_ndjson(
            &paths.export(),
            &[article(5, None, &["https://l.test/ok.png", "https://l.test/gone.png"])],
        )
        .unwrap();

        let fetcher = StaticFetcher {
            failing: vec!["https://l.test/gone.png".into()],
        };
        let store = MemoryStore::new();
        let config = AssetsConfig {
            retry_delay_ms: 0,
            ..AssetsConfig::default()
        };

        let summary = run_transfer(&fetcher, &store, &config, &paths, true)
            .await
            .unwrap();
        assert_eq!(summary.transferred, 1);
        assert_eq!(summary.failed, 1);

        let manifest: ImageManifest = read_json(&paths.image_manifest()).unwrap().unwrap();
        assert!(manifest.contains("https://l.test/ok.png"));
        assert!(!manifest.contains("https://l.test/gone.png"));

        let rows = crate::artifacts::read_csv_rows(&paths.image_failures()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "5");
        assert_eq!(rows[0][2], "https://l.test/gone.png");
        assert_eq!(rows[0][3], "bodyContent");
        assert!(rows[0][4].contains("404"));
    }

    #[tokio::test]
    async fn failed_manifest_flush_still_writes_the_ledger() {
        let dir = TempDir::new().unwrap();
        let paths = ArtifactPaths::new(dir.path(), dir.path().join("_redirects"));
        crate::artifacts::write_ndjson(
            &paths.export(),
            &[article(6, None, &["https://l.test/gone.png", "https://l.test/ok.png"])],
        )
        .unwrap();
        // The manifest's temp file cannot be created over a directory
        std::fs::create_dir(paths.image_manifest().with_extension("json.tmp")).unwrap();

        let fetcher = StaticFetcher {
            failing: vec!["https://l.test/gone.png".into()],
        };
        let config = AssetsConfig {
            retry_delay_ms: 0,
            flush_every: 1,
            concurrency: 1,
            ..AssetsConfig::default()
        };

        let err = run_transfer(&fetcher, &MemoryStore::new(), &config, &paths, true)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Artifact(_)));
        assert!(!paths.image_manifest().exists());

        let rows = crate::artifacts::read_csv_rows(&paths.image_failures()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][2], "https://l.test/gone.png");
    }

    #[tokio::test]
    async fn missing_export_is_fatal() {
        let dir = TempDir::new().unwrap();
        let paths = ArtifactPaths::new(dir.path(), dir.path().join("_redirects"));
        let fetcher = StaticFetcher { failing: vec![] };
        let err = run_transfer(&fetcher, &MemoryStore::new(), &AssetsConfig::default(), &paths, true)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::MissingArtifact { stage: "export", .. }));
    }
}
