use anyhow::{Context, Result};
use cms_migrate::{
    config::Config,
    fetch::{FetchConfig, HttpAssetFetcher, HttpFetcher},
    pipeline::run_transfer,
    store::SanityStore,
};
use std::time::Duration;

pub async fn transfer_images(config: Config, quiet: bool) -> Result<()> {
    config.require_target()?;
    let store = SanityStore::new(&config.target).context("Failed to build store client")?;

    let timeout = Duration::from_secs(config.assets.download_timeout_secs);
    let fetcher = HttpFetcher::new(FetchConfig {
        user_agent: config.legacy.user_agent.clone(),
        timeout,
        ..FetchConfig::default()
    })
    .context("Failed to build download client")?;
    let fetcher = HttpAssetFetcher::new(fetcher, timeout);

    let paths = config.artifact_paths();
    let summary = run_transfer(&fetcher, &store, &config.assets, &paths, quiet).await?;

    println!("\nImage Transfer Summary");
    println!("======================");
    println!("Distinct URLs:       {}", summary.discovered);
    println!("Already transferred: {}", summary.already_done);
    println!("Transferred now:     {}", summary.transferred);
    println!("Failed:              {}", summary.failed);
    println!("Manifest entries:    {}", summary.manifest_size);
    if !summary.priority.is_empty() {
        println!("\nPriority assets (confirm manually):");
        for url in &summary.priority {
            println!("  {}", url);
        }
    }
    if summary.failed > 0 {
        println!("\nReview {} before cutover", paths.image_failures().display());
    }
    println!("\nNext step: cms-migrate transform");

    Ok(())
}
