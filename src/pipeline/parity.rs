//! Parity: compare the export against the store before cutover
//!
//! Every check ends as pass, warn or fail. Warnings need a human to review
//! them; any failure blocks cutover and makes the command exit non-zero.
//! Results go to `parity_report.md` for people and `migration_report.json`
//! for tooling.

use crate::artifacts::{
    read_csv_rows, read_json, read_ndjson, read_text, write_json, write_text, ArtifactPaths,
};
use crate::config::Config;
use crate::error::{MigrateError, MigrateResult};
use crate::pipeline::redirects::{parse_redirects, static_pattern_rules, RedirectRule};
use crate::store::{ContentStore, StoreError};
use crate::types::{ExportRecord, ImageManifest, TargetType};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{info, warn};

/// Slugs listed per type before the detail is truncated
const SLUG_SAMPLE: usize = 5;

/// Outcome of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: String,
    pub verdict: Verdict,
    pub detail: String,
}

impl Check {
    fn new(name: impl Into<String>, verdict: Verdict, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verdict,
            detail: detail.into(),
        }
    }

    fn pass_or_fail(name: impl Into<String>, passed: bool, detail: impl Into<String>) -> Self {
        let verdict = if passed { Verdict::Pass } else { Verdict::Fail };
        Self::new(name, verdict, detail)
    }
}

/// Local artifacts the checks read
#[derive(Debug, Clone, Default)]
pub struct ParityInputs {
    pub export: Vec<ExportRecord>,
    pub manifest: ImageManifest,
    pub image_failures: usize,
    pub redirect_rules: Vec<RedirectRule>,
}

impl ParityInputs {
    /// Load from the artifact directory; a missing export is fatal, every
    /// other artifact may be absent
    pub fn load(paths: &ArtifactPaths) -> MigrateResult<Self> {
        let export: Vec<ExportRecord> = read_ndjson(&paths.export())?;
        if export.is_empty() {
            return Err(MigrateError::MissingArtifact {
                path: paths.export(),
                stage: "export",
            });
        }
        Ok(Self {
            export,
            manifest: read_json(&paths.image_manifest())?.unwrap_or_default(),
            image_failures: read_csv_rows(&paths.image_failures())?.len(),
            redirect_rules: read_text(paths.redirects())?
                .map(|text| parse_redirects(&text))
                .unwrap_or_default(),
        })
    }
}

/// Everything the validator found
#[derive(Debug, Clone)]
pub struct ParityReport {
    pub generated_at: String,
    pub checks: Vec<Check>,
    pub export_counts: BTreeMap<TargetType, u64>,
    pub store_counts: BTreeMap<TargetType, u64>,
    pub superseded_count: u64,
    pub manifest_size: usize,
    pub image_failure_count: usize,
    pub priority_count: usize,
    /// `None` when the residual scan query failed
    pub residual_legacy_urls: Option<u64>,
    pub redirect_rule_count: usize,
    pub has_catch_all: bool,
}

/// Machine-readable summary written to `migration_report.json`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub generated_at: String,
    pub export_counts: BTreeMap<TargetType, u64>,
    pub store_counts: BTreeMap<TargetType, u64>,
    pub superseded_count: u64,
    pub image_manifest_size: usize,
    pub image_failure_count: usize,
    pub priority_svg_count: usize,
    pub wp_urls_remaining_in_content: Option<u64>,
    pub redirect_rule_count: usize,
    pub has_spa_fallback: bool,
    pub checks_total: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub checks_warned: usize,
    pub overall_passed: bool,
    pub checks: Vec<Check>,
}

impl ParityReport {
    fn count(&self, verdict: Verdict) -> usize {
        self.checks.iter().filter(|c| c.verdict == verdict).count()
    }

    pub fn failed(&self) -> usize {
        self.count(Verdict::Fail)
    }

    pub fn warned(&self) -> usize {
        self.count(Verdict::Warn)
    }

    /// No check failed (warnings allowed)
    pub fn passed(&self) -> bool {
        self.failed() == 0
    }

    pub fn to_json(&self) -> MigrationReport {
        MigrationReport {
            generated_at: self.generated_at.clone(),
            export_counts: self.export_counts.clone(),
            store_counts: self.store_counts.clone(),
            superseded_count: self.superseded_count,
            image_manifest_size: self.manifest_size,
            image_failure_count: self.image_failure_count,
            priority_svg_count: self.priority_count,
            wp_urls_remaining_in_content: self.residual_legacy_urls,
            redirect_rule_count: self.redirect_rule_count,
            has_spa_fallback: self.has_catch_all,
            checks_total: self.checks.len(),
            checks_passed: self.count(Verdict::Pass),
            checks_failed: self.failed(),
            checks_warned: self.warned(),
            overall_passed: self.passed(),
            checks: self.checks.clone(),
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut md = vec![
            "# Migration Parity Report".to_string(),
            String::new(),
            format!("Generated: {}", self.generated_at),
            String::new(),
            format!(
                "Overall: **{}** ({} passed, {} warned, {} failed)",
                if self.passed() { "PASS" } else { "FAIL" },
                self.count(Verdict::Pass),
                self.warned(),
                self.failed()
            ),
            String::new(),
            "## Check Results".to_string(),
            String::new(),
            "| Status | Check | Detail |".to_string(),
            "|--------|-------|--------|".to_string(),
        ];
        md.extend(
            self.checks
                .iter()
                .map(|c| format!("| {} | {} | {} |", c.verdict, c.name, c.detail.replace('|', "\\|"))),
        );

        md.extend([
            String::new(),
            "## Counts".to_string(),
            String::new(),
            "| Type | Export | Store | Match |".to_string(),
            "|------|--------|-------|-------|".to_string(),
        ]);
        for t in TargetType::ALL {
            let export = self.export_counts.get(&t).copied().unwrap_or(0);
            let store = self.store_counts.get(&t).copied().unwrap_or(0);
            md.push(format!(
                "| {} | {} | {} | {} |",
                t,
                export,
                store,
                if export == store { "yes" } else { "NO" }
            ));
        }

        md.extend(
            [
                "",
                "## Known Gaps",
                "",
                "- Legacy `/?p=<id>` URLs are not handled by static redirect rules.",
                "  Generate per-document entries after import using `legacySource.wpId`.",
                "- Slug collisions: review `slug_collision_report.csv`.",
                "- Fallback documents: query `defined(legacySource.legacyHtml)` to find",
                "  documents stored as raw HTML instead of blocks.",
                "",
                "## 15-URL Spot-Check",
                "",
                "Fill in after migration with real slugs from the dataset:",
                "",
                "| # | Type | Old URL | New URL | Redirect? | Checked |",
                "|---|------|---------|---------|-----------|---------|",
                "| 1 | article (with image) | /blog/<slug> | /articles/<slug> | 301 | [ ] |",
                "| 2 | article | /blog/<slug> | /articles/<slug> | 301 | [ ] |",
                "| 3 | page | /<slug> | /<slug> | none | [ ] |",
                "| 4 | page | /<slug> | /<slug> | none | [ ] |",
                "| 5 | node (priority SVG) | /gem/<slug> | /nodes/<slug> | 301 | [ ] |",
                "| 6 | node | /gem/<slug> | /nodes/<slug> | 301 | [ ] |",
                "| 7 | caseStudy | /case-studies/<slug> | /case-studies/<slug> | none | [ ] |",
                "| 8 | caseStudy | /case-study/<slug> | /case-studies/<slug> | 301 | [ ] |",
                "| 9 | category | /category/<slug> | /categories/<slug> | 301 | [ ] |",
                "| 10 | tag | /tag/<slug> | /tags/<slug> | 301 | [ ] |",
                "| 11 | person | /author/<login> | /people/<slug> | none | [ ] |",
                "| 12 | renamed article | /blog/<old-slug> | /articles/<new-slug> | 301 | [ ] |",
                "| 13 | node | /gem/<slug> | /nodes/<slug> | 301 | [ ] |",
                "| 14 | fallback document | /blog/<slug> | /articles/<slug> | 301 | [ ] |",
                "| 15 | page | /<slug> | /<slug> | none | [ ] |",
                "",
            ]
            .map(str::to_string),
        );
        md.join("\n")
    }
}

fn export_counts(records: &[ExportRecord]) -> BTreeMap<TargetType, u64> {
    let mut counts = BTreeMap::new();
    for t in records.iter().filter_map(|r| r.sanity_type) {
        *counts.entry(t).or_default() += 1;
    }
    counts
}

fn sample(slugs: &BTreeSet<&str>) -> String {
    let mut listed: Vec<&str> = slugs.iter().take(SLUG_SAMPLE).copied().collect();
    if slugs.len() > SLUG_SAMPLE {
        listed.push("...");
    }
    listed.join(", ")
}

/// Run every check. Count and slug queries must succeed; the residual URL
/// scan may fail and becomes a warning.
pub async fn validate(
    store: &dyn ContentStore,
    inputs: &ParityInputs,
    config: &Config,
) -> Result<ParityReport, StoreError> {
    let mut checks = Vec::new();
    let exported = export_counts(&inputs.export);

    let mut store_counts = BTreeMap::new();
    for t in TargetType::ALL {
        let in_store = store.count_documents(t.as_str(), true).await?;
        store_counts.insert(t, in_store);
        let in_export = exported.get(&t).copied().unwrap_or(0);
        checks.push(Check::pass_or_fail(
            format!("Count: {}", t),
            in_export == in_store,
            format!("Export: {} | Store: {}", in_export, in_store),
        ));
    }

    let superseded = &config.import.superseded_type;
    let superseded_count = store.count_documents(superseded, false).await?;
    checks.push(Check::pass_or_fail(
        format!("_type \"{}\" count = 0", superseded),
        superseded_count == 0,
        format!("Found: {}", superseded_count),
    ));

    for t in TargetType::ALL {
        let expected: BTreeSet<&str> = inputs
            .export
            .iter()
            .filter(|r| r.sanity_type == Some(t))
            .map(|r| r.slug.as_str())
            .collect();
        let actual_owned = store.legacy_slugs(t.as_str()).await?;
        let actual: BTreeSet<&str> = actual_owned.iter().map(String::as_str).collect();
        if expected.is_empty() && actual.is_empty() {
            continue;
        }

        let missing: BTreeSet<&str> = expected.difference(&actual).copied().collect();
        let extra: BTreeSet<&str> = actual.difference(&expected).copied().collect();
        let check = if !missing.is_empty() {
            Check::new(
                format!("Slugs: {}", t),
                Verdict::Fail,
                format!("{} missing in store: {}", missing.len(), sample(&missing)),
            )
        } else if !extra.is_empty() {
            Check::new(
                format!("Slugs: {}", t),
                Verdict::Warn,
                format!("{} extra in store: {}", extra.len(), sample(&extra)),
            )
        } else {
            Check::new(
                format!("Slugs: {}", t),
                Verdict::Pass,
                format!("{} slug(s) match", expected.len()),
            )
        };
        checks.push(check);
    }

    let marker = &config.source.legacy_asset_marker;
    let residual = match store.count_residual_legacy_urls(marker).await {
        Ok(n) => {
            checks.push(Check::pass_or_fail(
                format!("Zero {} URLs in content", marker),
                n == 0,
                format!("Found: {}", n),
            ));
            Some(n)
        }
        Err(e) => {
            warn!("Residual URL scan failed: {}", e);
            checks.push(Check::new(
                format!("Zero {} URLs in content", marker),
                Verdict::Warn,
                "Query failed (check manually)",
            ));
            None
        }
    };

    checks.push(Check::new(
        "Image failures reviewed",
        if inputs.image_failures == 0 {
            Verdict::Pass
        } else {
            Verdict::Warn
        },
        format!("{} failure(s) in image_failures.csv", inputs.image_failures),
    ));

    let priority_count = inputs.manifest.priority_count();
    checks.push(match (priority_count, config.assets.expect_priority_assets) {
        (n, _) if n > 0 => Check::new(
            "Priority vector asset(s) in manifest",
            Verdict::Pass,
            format!("{} priority asset(s) confirmed", n),
        ),
        (_, true) => Check::new(
            "Priority vector asset(s) in manifest",
            Verdict::Warn,
            "None found; confirm the expected vector asset was captured",
        ),
        (_, false) => Check::new(
            "Priority vector asset(s) in manifest",
            Verdict::Pass,
            "Not expected",
        ),
    });

    let rules = &inputs.redirect_rules;
    let patterns = static_pattern_rules();
    let present = patterns
        .iter()
        .filter(|p| p.is_pattern() && rules.iter().any(|r| r.from == p.from))
        .count();
    checks.push(Check::pass_or_fail(
        "Redirects contain legacy pattern rules",
        present > 0,
        format!(
            "{} of {} pattern rule(s) present",
            present,
            patterns.iter().filter(|p| p.is_pattern()).count()
        ),
    ));

    let catch_alls = rules.iter().filter(|r| r.is_catch_all()).count();
    let catch_all_last = rules.last().is_some_and(RedirectRule::is_catch_all);
    let has_catch_all = catch_alls == 1 && catch_all_last;
    checks.push(Check::pass_or_fail(
        "SPA fallback present and last",
        has_catch_all,
        match (catch_alls, catch_all_last) {
            (0, _) => "Missing".to_string(),
            (1, true) => "Present".to_string(),
            (1, false) => "Present but not last".to_string(),
            (n, _) => format!("{} catch-all rules", n),
        },
    ));

    Ok(ParityReport {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        checks,
        export_counts: exported,
        store_counts,
        superseded_count,
        manifest_size: inputs.manifest.len(),
        image_failure_count: inputs.image_failures,
        priority_count,
        residual_legacy_urls: residual,
        redirect_rule_count: rules.len(),
        has_catch_all,
    })
}

/// Load inputs, validate, and write both reports
pub async fn run_parity(
    store: &dyn ContentStore,
    config: &Config,
    paths: &ArtifactPaths,
) -> MigrateResult<ParityReport> {
    let inputs = ParityInputs::load(paths)?;
    info!(
        "{} export record(s), {} manifest entr(ies), {} image failure(s), {} redirect rule(s)",
        inputs.export.len(),
        inputs.manifest.len(),
        inputs.image_failures,
        inputs.redirect_rules.len()
    );

    let report = validate(store, &inputs, config).await?;
    write_text(&paths.parity_report(), &report.to_markdown())?;
    write_json(&paths.migration_report(), &report.to_json())?;
    Ok(report)
}
