//! cms-migrate: staged WordPress to structured content store migration
//!
//! Each subcommand is one stage. Stages share state only through the
//! artifacts directory, so any stage can be re-run on its own.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cms_migrate::config::{Config, LogFormat};
use commands::ImportArgs;
use std::path::{Path, PathBuf};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "cms-migrate")]
#[command(about = "Resumable WordPress to structured content store migration")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "migrate.toml")]
    config: PathBuf,

    /// Artifacts directory (overrides the configured one)
    #[arg(short, long)]
    artifacts_dir: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// No progress bars
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export posts, terms and authors from the legacy REST API
    Export,

    /// Transfer referenced images into the store
    Images,

    /// Convert exported records into store documents
    Transform,

    /// Upsert transformed documents into the store
    Import {
        /// Skip the abort window
        #[arg(short, long)]
        yes: bool,

        /// Run against an in-memory store; nothing is written remotely
        #[arg(long)]
        dry_run: bool,

        /// Documents per transaction
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Generate the hosting redirect rules
    Redirects,

    /// Compare the store against the export; exits non-zero on failure
    Parity,

    /// Show which artifacts exist and the next stage to run
    Status,

    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_or_default(&cli.config)?;
    config.apply_environment(Path::new(".env"))?;
    if let Some(dir) = &cli.artifacts_dir {
        config.paths.artifacts_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `init` runs before any configuration exists
    if let Commands::Init { path } = &cli.command {
        init_logging(LogFormat::Text, tracing::Level::INFO)?;
        return commands::init_config(path.clone()).await;
    }

    let config = load_config(&cli)?;
    init_logging(
        config.logging.format,
        config.logging.level.with_verbosity(cli.verbose),
    )?;

    match cli.command {
        Commands::Export => commands::export_content(config).await,
        Commands::Images => commands::transfer_images(config, cli.quiet).await,
        Commands::Transform => commands::transform_content(config).await,
        Commands::Import {
            yes,
            dry_run,
            batch_size,
        } => {
            let args = ImportArgs {
                yes,
                dry_run,
                batch_size,
                quiet: cli.quiet,
            };
            commands::import_content(config, args).await
        }
        Commands::Redirects => commands::generate_redirects(config).await,
        Commands::Parity => {
            if !commands::check_parity(config).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Status => commands::show_status(config).await,
        Commands::Init { .. } => Ok(()),
    }
}

fn init_logging(format: LogFormat, level: tracing::Level) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false);
    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}
