use anyhow::{Context, Result};
use cms_migrate::{config::Config, legacy::WpClient, pipeline::run_export};
use tracing::info;

pub async fn export_content(config: Config) -> Result<()> {
    info!("Exporting from {}", config.legacy.base());

    let client = WpClient::new(&config.legacy).context("Failed to build legacy API client")?;
    let paths = config.artifact_paths();
    let summary = run_export(&client, &config, &paths).await?;

    println!("\nExport Summary");
    println!("==============");
    for (target_type, count) in &summary.counts {
        println!("{:<12} {}", target_type.as_str(), count);
    }
    println!("Total records:   {}", summary.total);
    println!("Slug collisions: {}", summary.collisions);
    if !summary.authors_available {
        println!("Authors:         unavailable (author info omitted)");
    }
    if !summary.failed_routes.is_empty() {
        println!("Skipped routes:  {}", summary.failed_routes.join(", "));
    }
    println!("Written: {}", paths.export().display());
    println!("\nNext step: cms-migrate images");

    Ok(())
}
