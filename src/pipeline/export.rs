//! Export: legacy REST API → `wp_export.ndjson`
//!
//! Pages through every configured post type and taxonomy, plus the user
//! list, and writes one flat [`ExportRecord`] per item. HTML is left exactly
//! as the API rendered it. Slug collisions within a target type are reported
//! to `slug_collision_report.csv` but never resolved here.

use crate::artifacts::{write_ndjson, ArtifactPaths, CsvLedger};
use crate::config::{Config, RouteMapping};
use crate::error::{MigrateError, MigrateResult};
use crate::legacy::{collect_pages, LegacyApi, WpPost, WpTerm, WpUser};
use crate::richtext::extract_image_urls;
use crate::types::{ExportRecord, LegacyId, TargetType};
use crate::util::strip_tags;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const COLLISION_COLUMNS: &[&str] = &["sanityType", "slug", "wpId", "permalink", "resolution"];

/// Policy text written next to every collision; resolution is manual
pub const COLLISION_RESOLUTION: &str =
    "PENDING: use most-recent publishedAt; suffix older with -<wpId>";

const SEO_TITLE_KEYS: &[&str] = &["_yoast_wpseo_title", "yoast_wpseo_title"];
const SEO_DESC_KEYS: &[&str] = &["_yoast_wpseo_metadesc", "yoast_wpseo_metadesc"];

/// One member of a slug collision group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugCollision {
    pub target_type: TargetType,
    pub slug: String,
    pub wp_id: LegacyId,
    pub permalink: String,
}

/// Export results
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub counts: BTreeMap<TargetType, usize>,
    pub total: usize,
    /// Rows written to the collision report
    pub collisions: usize,
    /// Routes whose listing failed and were skipped
    pub failed_routes: Vec<String>,
    /// Whether the user list could be read
    pub authors_available: bool,
}

/// Export everything reachable through `api`.
///
/// An unreachable API is fatal. A failing route is logged and skipped so one
/// broken custom type does not block the rest of the export.
pub async fn run_export(
    api: &dyn LegacyApi,
    config: &Config,
    paths: &ArtifactPaths,
) -> MigrateResult<ExportSummary> {
    let base = api.base_url().to_string();
    api.probe()
        .await
        .map_err(|source| MigrateError::LegacyApiUnreachable {
            url: format!("{}/wp-json/", base),
            source,
        })?;
    info!("Legacy API reachable at {}", base);

    let per_page = api.per_page();
    let delay = Duration::from_millis(config.legacy.request_delay_ms);
    let mut summary = ExportSummary::default();
    let mut records = Vec::new();

    let users: Vec<WpUser> =
        match collect_pages(per_page, delay, move |page| api.list_users(page)).await {
            Ok(users) => {
                summary.authors_available = true;
                users
            }
            Err(e) => {
                warn!("Could not read users, author info will be omitted: {}", e);
                Vec::new()
            }
        };
    let users_by_id: HashMap<u64, &WpUser> = users.iter().map(|u| (u.id, u)).collect();

    for mapping in &config.legacy.post_types {
        let route = mapping.route.as_str();
        let posts = match collect_pages(per_page, delay, move |page| api.list_posts(route, page)).await {
            Ok(posts) => posts,
            Err(e) => {
                warn!("Skipping {}: {}", mapping.route, e);
                summary.failed_routes.push(mapping.route.clone());
                continue;
            }
        };
        info!("{}: {} published item(s)", mapping.route, posts.len());

        for post in &posts {
            let featured = featured_image_url(api, post).await;
            records.push(post_record(post, mapping, &users_by_id, featured));
        }
    }

    for mapping in &config.legacy.taxonomies {
        let route = mapping.route.as_str();
        let terms = match collect_pages(per_page, delay, move |page| api.list_terms(route, page)).await {
            Ok(terms) => terms,
            Err(e) => {
                warn!("Skipping {}: {}", mapping.route, e);
                summary.failed_routes.push(mapping.route.clone());
                continue;
            }
        };
        info!("{}: {} term(s)", mapping.route, terms.len());
        records.extend(terms.iter().map(|t| term_record(t, mapping)));
    }

    records.extend(users.iter().map(|u| person_record(u, &base)));

    for record in &records {
        if let Some(t) = record.sanity_type {
            *summary.counts.entry(t).or_default() += 1;
        }
    }
    summary.total = records.len();

    write_ndjson(&paths.export(), &records)?;
    info!("Wrote {} record(s) to {}", records.len(), paths.export().display());

    let collisions = detect_collisions(&records);
    let mut ledger = CsvLedger::new(COLLISION_COLUMNS);
    for c in &collisions {
        ledger.push([
            c.target_type.as_str().to_string(),
            c.slug.clone(),
            c.wp_id.to_string(),
            c.permalink.clone(),
            COLLISION_RESOLUTION.to_string(),
        ]);
    }
    ledger.write(&paths.slug_collisions())?;
    if !collisions.is_empty() {
        warn!(
            "{} record(s) share a slug within their type, see {}",
            collisions.len(),
            paths.slug_collisions().display()
        );
    }
    summary.collisions = collisions.len();

    Ok(summary)
}

/// Group records by `(target type, slug)` and return every member of each
/// group with two or more records, ordered by type then slug then legacy ID
pub fn detect_collisions(records: &[ExportRecord]) -> Vec<SlugCollision> {
    let mut groups: BTreeMap<(TargetType, &str), Vec<&ExportRecord>> = BTreeMap::new();
    for record in records {
        let Some(target_type) = record.sanity_type else {
            continue;
        };
        if record.slug.is_empty() {
            continue;
        }
        groups
            .entry((target_type, record.slug.as_str()))
            .or_default()
            .push(record);
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .flat_map(|((target_type, slug), mut members)| {
            members.sort_by_key(|r| r.wp_id);
            members.into_iter().map(move |r| SlugCollision {
                target_type,
                slug: slug.to_string(),
                wp_id: r.wp_id,
                permalink: r.permalink.clone(),
            })
        })
        .collect()
}

async fn featured_image_url(api: &dyn LegacyApi, post: &WpPost) -> Option<String> {
    if let Some(url) = post.embedded_featured_url() {
        return Some(url);
    }
    if post.featured_media == 0 {
        return None;
    }
    match api.media_url(post.featured_media).await {
        Ok(url) => url,
        Err(e) => {
            debug!("Media {} lookup failed for {}: {}", post.featured_media, post.id, e);
            None
        }
    }
}

fn gmt_timestamp(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| format!("{}Z", s))
}

fn post_record(
    post: &WpPost,
    mapping: &RouteMapping,
    users: &HashMap<u64, &WpUser>,
    featured_media_url: Option<String>,
) -> ExportRecord {
    let (author_login, author_name) = match (post.author, users.get(&post.author)) {
        (0, _) => (None, None),
        (_, Some(user)) => (Some(user.slug.clone()), Some(user.name.clone())),
        (id, None) => (Some(id.to_string()), Some(String::new())),
    };

    ExportRecord {
        wp_id: post.id,
        post_type: mapping.legacy_type.clone(),
        sanity_type: Some(mapping.target_type),
        status: Some(post.status.clone()),
        slug: post.slug.clone(),
        permalink: post.link.clone(),
        title: post.title.rendered.clone(),
        excerpt: strip_tags(&post.excerpt.rendered).trim().to_string(),
        raw_html: post.content.rendered.clone(),
        featured_media_url,
        image_urls: extract_image_urls(&post.content.rendered),
        term_category_ids: post.categories.clone(),
        term_tag_ids: post.tags.clone(),
        author_login,
        author_name,
        published_at: gmt_timestamp(&post.date_gmt),
        modified_at: gmt_timestamp(&post.modified_gmt),
        seo_title: post.meta_str(SEO_TITLE_KEYS).unwrap_or_default(),
        seo_desc: post.meta_str(SEO_DESC_KEYS).unwrap_or_default(),
        ..ExportRecord::default()
    }
}

fn term_record(term: &WpTerm, mapping: &RouteMapping) -> ExportRecord {
    ExportRecord {
        wp_id: term.id,
        post_type: mapping.legacy_type.clone(),
        sanity_type: Some(mapping.target_type),
        slug: term.slug.clone(),
        permalink: term.link.clone(),
        name: term.name.clone(),
        description: term.description.clone(),
        count: Some(term.count),
        ..ExportRecord::default()
    }
}

fn person_record(user: &WpUser, base: &str) -> ExportRecord {
    ExportRecord {
        wp_id: user.id,
        post_type: "user".to_string(),
        sanity_type: Some(TargetType::Person),
        slug: user.slug.clone(),
        permalink: format!("{}/author/{}/", base, user.slug),
        name: user.name.clone(),
        email: user.email.clone(),
        ..ExportRecord::default()
    }
}
