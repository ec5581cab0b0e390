use anyhow::{Context, Result};
use cms_migrate::{
    config::Config,
    pipeline::{guard_documents, load_documents, run_import},
    store::{ContentStore, MemoryStore, SanityStore},
};
use std::time::Duration;
use tracing::info;

/// Flags of the `import` subcommand
#[derive(Debug, Clone, Default)]
pub struct ImportArgs {
    /// Skip the abort window
    pub yes: bool,
    /// Import into an in-memory store instead
    pub dry_run: bool,
    pub batch_size: Option<usize>,
    pub quiet: bool,
}

pub async fn import_content(config: Config, args: ImportArgs) -> Result<()> {
    let paths = config.artifact_paths();
    let batch_size = args.batch_size.unwrap_or(config.import.batch_size);
    let superseded = config.import.superseded_type.as_str();

    // Fail on contract violations before anything else, including the prompt
    let docs = load_documents(&paths.import())?;
    guard_documents(&docs, superseded)?;

    let memory;
    let sanity;
    let store: &dyn ContentStore = if args.dry_run {
        info!("Dry run: writing to an in-memory store");
        memory = MemoryStore::new();
        &memory
    } else {
        config.require_target()?;
        sanity = SanityStore::new(&config.target).context("Failed to build store client")?;
        &sanity
    };

    if !args.dry_run && !args.yes && config.import.confirm_delay_secs > 0 {
        println!(
            "About to write {} document(s) to dataset \"{}\". Press Ctrl-C within {}s to abort.",
            docs.len(),
            config.target.dataset,
            config.import.confirm_delay_secs
        );
        tokio::time::sleep(Duration::from_secs(config.import.confirm_delay_secs)).await;
    }

    let summary = run_import(store, superseded, batch_size, &paths, args.quiet).await?;

    println!("\nImport Summary");
    println!("==============");
    println!("Documents:        {}", summary.total);
    println!("Imported:         {}", summary.imported);
    println!("Failed:           {}", summary.failed);
    println!("Batches:          {}", summary.batches);
    println!("Retried batches:  {}", summary.batch_failures);
    if args.dry_run {
        println!("(dry run, nothing was written to the store)");
    }
    if summary.failed > 0 {
        println!("\nReview {}", paths.import_failures().display());
    }
    println!("\nNext step: cms-migrate redirects");

    Ok(())
}
