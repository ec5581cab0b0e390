use anyhow::{Context, Result};
use cms_migrate::{
    config::Config,
    pipeline::{run_parity, Verdict},
    store::SanityStore,
};

/// Run the parity checks; `Ok(false)` when any check failed
pub async fn check_parity(config: Config) -> Result<bool> {
    config.require_target()?;
    let store = SanityStore::new(&config.target).context("Failed to build store client")?;
    let paths = config.artifact_paths();
    let report = run_parity(&store, &config, &paths).await?;

    println!("\nParity Checks");
    println!("=============");
    for check in &report.checks {
        println!("[{}] {:<45} {}", check.verdict, check.name, check.detail);
    }
    println!();
    if report.passed() {
        println!(
            "ALL CHECKS PASSED ({} warning(s) to review)",
            report.checks.iter().filter(|c| c.verdict == Verdict::Warn).count()
        );
    } else {
        println!("{} CHECK(S) FAILED, cutover is blocked", report.failed());
    }
    println!("Report: {}", paths.parity_report().display());
    println!("JSON:   {}", paths.migration_report().display());

    Ok(report.passed())
}
