//! Redirects: legacy URL patterns → `_redirects`
//!
//! The hosting layer evaluates rules top to bottom and stops at the first
//! match. The file is composed from four sources, in this order:
//!
//! 1. static legacy URL patterns (`/blog/:slug` and friends)
//! 2. active operator redirects stored in the content store
//! 3. per-document slug renames: the live store slug (or, failing that, the
//!    transform artifact's slug) compared with the legacy slug
//! 4. the single-page-app catch-all, always last
//!
//! An ordering pass then removes duplicate sources, lifts exact rules above
//! any earlier pattern that would swallow them, and pins the catch-all to the
//! end.

use crate::artifacts::{read_ndjson, write_text, ArtifactPaths};
use crate::documents::RawDocument;
use crate::error::MigrateResult;
use crate::store::{ContentStore, StoreRedirect, StoreSlug};
use crate::types::{ExportRecord, TargetType};
use crate::util::url_path;
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

const CATCH_ALL_FROM: &str = "/*";
const CATCH_ALL_TO: &str = "/index.html";

/// One line of the redirect file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRule {
    pub from: String,
    /// `None` for a gone rule (`from  404`)
    pub to: Option<String>,
    pub status: u16,
}

impl RedirectRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>, status: u16) -> Self {
        Self {
            from: from.into(),
            to: Some(to.into()),
            status,
        }
    }

    pub fn gone(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: None,
            status: 404,
        }
    }

    pub fn catch_all() -> Self {
        Self::new(CATCH_ALL_FROM, CATCH_ALL_TO, 200)
    }

    pub fn is_catch_all(&self) -> bool {
        self.from == CATCH_ALL_FROM
    }

    /// Rules with a placeholder (`:slug`) or splat (`*`) segment
    pub fn is_pattern(&self) -> bool {
        self.from
            .split('/')
            .any(|seg| seg.starts_with(':') || seg == "*")
    }

    /// Whether this rule's source matches a concrete path
    pub fn matches(&self, path: &str) -> bool {
        let pattern: Vec<&str> = self.from.trim_end_matches('/').split('/').collect();
        let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();

        for (i, part) in pattern.iter().enumerate() {
            if *part == "*" {
                return true;
            }
            let Some(seg) = segments.get(i) else {
                return false;
            };
            if part.starts_with(':') {
                if seg.is_empty() {
                    return false;
                }
            } else if part != seg {
                return false;
            }
        }
        pattern.len() == segments.len()
    }
}

impl fmt::Display for RedirectRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.to {
            Some(to) if self.is_catch_all() => write!(f, "{}  {}  {}", self.from, to, self.status),
            Some(to) => write!(f, "{:<32}  {}  {}", self.from, to, self.status),
            None => write!(f, "{:<32}  {}", self.from, self.status),
        }
    }
}

impl FromStr for RedirectRule {
    type Err = String;

    /// Parse one non-comment line
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [from, second] => match second.parse::<u16>() {
                Ok(status) => Ok(Self {
                    from: from.to_string(),
                    to: None,
                    status,
                }),
                Err(_) => Ok(Self::new(*from, *second, 301)),
            },
            [from, to, status, ..] => {
                let status = status
                    .trim_end_matches('!')
                    .parse::<u16>()
                    .map_err(|_| format!("invalid status in rule: {}", line))?;
                Ok(Self::new(*from, *to, status))
            }
            _ => Err(format!("incomplete rule: {}", line)),
        }
    }
}

/// Where a rule came from; decides its section in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    Pattern,
    Store,
    SlugRename,
    Fallback,
}

impl RuleSource {
    fn heading(&self) -> &'static str {
        match self {
            Self::Pattern => "# ── Pattern rules: legacy URL patterns → new canonical routes ──",
            Self::Store => "# ── Studio-managed redirects (from redirect documents) ──",
            Self::SlugRename => "# ── Per-document slug changes ──",
            Self::Fallback => "# ── SPA fallback, must be last ──",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Store => "operator",
            Self::SlugRename => "slug-rename",
            Self::Fallback => "fallback",
        }
    }
}

/// Legacy URL patterns of the old site, all permanent
pub fn static_pattern_rules() -> Vec<RedirectRule> {
    vec![
        RedirectRule::new("/blog/:slug", "/articles/:slug", 301),
        RedirectRule::new("/post/:slug", "/articles/:slug", 301),
        RedirectRule::new("/posts/:slug", "/articles/:slug", 301),
        RedirectRule::new("/gem/:slug", "/nodes/:slug", 301),
        RedirectRule::new("/nodes", "/knowledge-graph", 301),
        RedirectRule::new("/case-study/:slug", "/case-studies/:slug", 301),
        RedirectRule::new("/category/:slug", "/categories/:slug", 301),
        RedirectRule::new("/tag/:slug", "/tags/:slug", 301),
    ]
}

/// Operator redirects, sorted by source path
pub fn store_rules(redirects: Vec<StoreRedirect>) -> Vec<RedirectRule> {
    let mut rules: Vec<RedirectRule> = redirects
        .into_iter()
        .filter(|r| !r.from_path.trim().is_empty())
        .map(|r| RedirectRule {
            from: r.from_path.trim().to_string(),
            to: r.to_path.filter(|t| !t.trim().is_empty()),
            status: r.status_code,
        })
        .collect();
    rules.sort_by(|a, b| a.from.cmp(&b.from));
    rules
}

/// Current slug per document ID, as read from the store
pub type CurrentSlugs = HashMap<String, String>;

/// Index store slugs by document ID
pub fn current_slug_index(slugs: Vec<StoreSlug>) -> CurrentSlugs {
    slugs.into_iter().map(|s| (s.id, s.slug)).collect()
}

/// Rules for documents whose slug differs from the legacy slug.
///
/// A document's current slug is taken from `current` when the store knows
/// it, otherwise from the transform artifact. The source is the path of the
/// legacy permalink, the destination the canonical path of the document's
/// type and current slug.
pub fn slug_rename_rules(docs: &[RawDocument], current: &CurrentSlugs) -> Vec<RedirectRule> {
    let mut rules = Vec::new();
    for doc in docs.iter().filter(|d| d.has_legacy_source()) {
        let slug = current.get(&doc.id).map(String::as_str).or_else(|| doc.slug());
        let (Some(slug), Some(legacy_slug)) = (slug, doc.str_at("legacySource.legacySlug")) else {
            continue;
        };
        if slug.is_empty() || slug == legacy_slug {
            continue;
        }
        let Ok(target) = TargetType::from_str(&doc.doc_type) else {
            debug!("{}: no canonical route for type {}", doc.id, doc.doc_type);
            continue;
        };
        let Some(wp_url) = doc.str_at("legacySource.wpUrl").filter(|u| !u.is_empty()) else {
            debug!("{}: renamed but has no legacy URL", doc.id);
            continue;
        };

        let from = url_path(wp_url);
        let to = target.canonical_path(slug);
        if from != to {
            rules.push(RedirectRule::new(from, to, 301));
        }
    }
    rules
}

/// Enforce first-match-wins semantics.
///
/// Duplicate sources keep their first rule (later ones are logged and
/// dropped); an exact rule that an earlier pattern would match is moved
/// directly above the first such pattern; any catch-all in the input is
/// dropped and exactly one is appended last.
pub fn order_rules(entries: Vec<(RuleSource, RedirectRule)>) -> Vec<(RuleSource, RedirectRule)> {
    let mut kept_from: HashMap<String, RuleSource> = HashMap::new();
    let mut ordered: Vec<(RuleSource, RedirectRule)> = Vec::new();
    for (source, rule) in entries {
        if rule.is_catch_all() {
            debug!("dropping {} catch-all; the fallback is appended last", source.label());
            continue;
        }
        if let Some(kept) = kept_from.get(&rule.from) {
            warn!(
                "Ignoring {} rule for {}: an earlier {} rule for the same path takes precedence",
                source.label(),
                rule.from,
                kept.label()
            );
            continue;
        }
        kept_from.insert(rule.from.clone(), source);
        ordered.push((source, rule));
    }

    for i in 0..ordered.len() {
        if ordered[i].1.is_pattern() {
            continue;
        }
        let shadow = ordered[..i]
            .iter()
            .position(|(_, earlier)| earlier.is_pattern() && earlier.matches(&ordered[i].1.from));
        if let Some(j) = shadow {
            let entry = ordered.remove(i);
            debug!("hoisting {} above {}", entry.1.from, ordered[j].1.from);
            ordered.insert(j, entry);
        }
    }

    ordered.push((RuleSource::Fallback, RedirectRule::catch_all()));
    ordered
}

/// Ordered redirect rules with their sources
#[derive(Debug, Clone, Default)]
pub struct RedirectMap {
    entries: Vec<(RuleSource, RedirectRule)>,
}

impl RedirectMap {
    pub fn rules(&self) -> impl Iterator<Item = &RedirectRule> {
        self.entries.iter().map(|(_, rule)| rule)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rules contributed by one source
    pub fn count(&self, source: RuleSource) -> usize {
        self.entries.iter().filter(|(s, _)| *s == source).count()
    }

    /// Render the file, starting a new section comment whenever the source
    /// changes
    pub fn render(&self, generated_at: &str) -> String {
        let mut lines = vec![
            "# ============================================================".to_string(),
            "# _redirects: legacy CMS → structured content migration".to_string(),
            "# Generated by: cms-migrate redirects".to_string(),
            format!("# Generated at: {}", generated_at),
            "#".to_string(),
            "# Rules are evaluated top to bottom; the first match wins.".to_string(),
            "# More specific rules must appear before broader ones.".to_string(),
            "# ============================================================".to_string(),
        ];

        let mut current = None;
        for (source, rule) in &self.entries {
            if current != Some(*source) {
                lines.push(String::new());
                lines.push(source.heading().to_string());
                current = Some(*source);
            }
            lines.push(rule.to_string());
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

/// Compose and order the full rule set
pub fn build_redirect_map(
    store_redirects: Vec<StoreRedirect>,
    docs: &[RawDocument],
    current: &CurrentSlugs,
) -> RedirectMap {
    let entries = static_pattern_rules()
        .into_iter()
        .map(|r| (RuleSource::Pattern, r))
        .chain(store_rules(store_redirects).into_iter().map(|r| (RuleSource::Store, r)))
        .chain(slug_rename_rules(docs, current).into_iter().map(|r| (RuleSource::SlugRename, r)))
        .collect();
    RedirectMap {
        entries: order_rules(entries),
    }
}

/// Parse a redirect file, skipping comments, blank and malformed lines
pub fn parse_redirects(text: &str) -> Vec<RedirectRule> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| match l.parse() {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .collect()
}

/// Redirect generation results
#[derive(Debug, Clone, Default)]
pub struct RedirectSummary {
    pub patterns: usize,
    pub store: usize,
    pub slug_renames: usize,
    pub total: usize,
}

/// Generate the redirect file.
///
/// `store` is optional: without it, or when the query fails, the file is
/// generated without operator redirects.
pub async fn run_redirects(
    store: Option<&dyn ContentStore>,
    paths: &ArtifactPaths,
) -> MigrateResult<RedirectSummary> {
    let records: Vec<ExportRecord> = read_ndjson(&paths.export())?;
    if records.is_empty() {
        warn!(
            "No export records at {}; pattern rules will still be generated",
            paths.export().display()
        );
    }

    let (store_redirects, current) = match store {
        Some(store) => {
            let redirects = store.active_redirects().await.unwrap_or_else(|e| {
                warn!("Could not read operator redirects, continuing without them: {}", e);
                Vec::new()
            });
            let slugs = store.current_slugs().await.unwrap_or_else(|e| {
                warn!("Could not read current slugs, renames made in the store will be missed: {}", e);
                Vec::new()
            });
            (redirects, current_slug_index(slugs))
        }
        None => {
            warn!("Target store not configured; skipping operator redirects and store renames");
            (Vec::new(), CurrentSlugs::new())
        }
    };

    let docs: Vec<RawDocument> = read_ndjson(&paths.import())?;
    if docs.is_empty() {
        info!("No transform artifact; no slug-rename rules");
    }

    let map = build_redirect_map(store_redirects, &docs, &current);
    let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    write_text(paths.redirects(), &map.render(&generated_at))?;
    info!("Wrote {} rule(s) to {}", map.len(), paths.redirects().display());

    warn!("Legacy /?p=<id> URLs cannot be expressed as static rules; add them per document if needed");

    Ok(RedirectSummary {
        patterns: map.count(RuleSource::Pattern),
        store: map.count(RuleSource::Store),
        slug_renames: map.count(RuleSource::SlugRename),
        total: map.len(),
    })
}
