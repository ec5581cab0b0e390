use anyhow::Result;
use cms_migrate::{
    config::Config,
    pipeline::run_redirects,
    store::{ContentStore, SanityStore},
};
use tracing::warn;

pub async fn generate_redirects(config: Config) -> Result<()> {
    let store = match SanityStore::new(&config.target) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("{}", e);
            None
        }
    };
    let paths = config.artifact_paths();
    let summary = run_redirects(store.as_ref().map(|s| s as &dyn ContentStore), &paths).await?;

    println!("\nRedirect Summary");
    println!("================");
    println!("Pattern rules:       {}", summary.patterns);
    println!("Operator redirects:  {}", summary.store);
    println!("Slug renames:        {}", summary.slug_renames);
    println!("Total (incl. catch-all): {}", summary.total);
    println!("Written: {}", paths.redirects().display());
    println!("\nNext step: cms-migrate parity");

    Ok(())
}
