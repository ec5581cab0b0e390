use anyhow::Result;
use cms_migrate::{config::Config, pipeline::run_transform};

pub async fn transform_content(config: Config) -> Result<()> {
    let paths = config.artifact_paths();
    let summary = run_transform(&config, &paths)?;

    println!("\nTransform Summary");
    println!("=================");
    for (target_type, count) in &summary.counts {
        println!("{:<12} {}", target_type.as_str(), count);
    }
    println!("Total documents:     {}", summary.total);
    println!("Raw HTML fallbacks:  {}", summary.fallbacks);
    println!("Unresolved images:   {}", summary.unresolved_images);
    if summary.skipped > 0 {
        println!("Untyped records:     {} (skipped)", summary.skipped);
    }
    println!("Written: {}", paths.import().display());
    println!("\nNext step: cms-migrate import");

    Ok(())
}
