use anyhow::Result;
use cms_migrate::{
    artifacts::{inventory, next_stage},
    config::Config,
};

pub async fn show_status(config: Config) -> Result<()> {
    let paths = config.artifact_paths();
    let artifacts = inventory(&paths)?;

    println!("\nArtifacts ({})", paths.dir().display());
    println!("=========");
    for artifact in &artifacts {
        if artifact.exists {
            println!(
                "{:<28} {:>8} entries {:>10} bytes  ({})",
                artifact.name, artifact.entries, artifact.bytes, artifact.produced_by
            );
        } else {
            println!("{:<28} {:>8}  ({})", artifact.name, "missing", artifact.produced_by);
        }
    }

    match next_stage(&paths) {
        Some(stage) => println!("\nNext step: cms-migrate {}", stage),
        None => println!("\nAll stages have run"),
    }

    Ok(())
}
