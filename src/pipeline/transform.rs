//! Transform: export records + image manifest → `sanity_import.ndjson`
//!
//! Lookup tables are built in one pass over the export before any document
//! is produced and never change afterwards. Each record then maps to exactly
//! one [`TransformedDocument`] variant. Output order is taxonomy, people,
//! then content, so references point at documents written earlier in the
//! file.

use crate::artifacts::{read_json, read_ndjson, write_ndjson, ArtifactPaths};
use crate::config::Config;
use crate::documents::{
    ArticleDoc, CaseStudyDoc, CategoryDoc, ImageField, LegacySource, NodeDoc, PageDoc, PersonDoc,
    Seo, Slug, TagDoc, TextSection, TransformedDocument,
};
use crate::error::{MigrateError, MigrateResult};
use crate::ids::{content_hash, make_id};
use crate::richtext::{convert, resolve_images, Block, Reference};
use crate::types::{ExportRecord, ImageManifest, LegacyId, TargetType};
use chrono::{SecondsFormat, Utc};
use scraper::Html;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Term and author lookups, keyed `category::<id>`, `tag::<id>` and login
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    system: String,
    terms: HashMap<String, String>,
    people: HashMap<String, String>,
}

impl Lookups {
    pub fn build(records: &[ExportRecord], system: &str) -> Self {
        let mut lookups = Self {
            system: system.to_string(),
            ..Self::default()
        };
        for record in records {
            match record.sanity_type {
                Some(t @ (TargetType::Category | TargetType::Tag)) => {
                    lookups.terms.insert(
                        term_key(t, record.wp_id),
                        make_id(system, t.as_str(), record.wp_id),
                    );
                }
                Some(TargetType::Person) => {
                    lookups.people.insert(
                        record.slug.clone(),
                        make_id(system, TargetType::Person.as_str(), &record.slug),
                    );
                }
                _ => {}
            }
        }
        lookups
    }

    /// Document ID of a term, if the term was exported
    pub fn term(&self, kind: TargetType, wp_id: LegacyId) -> Option<&str> {
        self.terms.get(&term_key(kind, wp_id)).map(String::as_str)
    }

    /// Person ID for an author login; always resolves
    pub fn person(&self, login: &str) -> String {
        self.people
            .get(login)
            .cloned()
            .unwrap_or_else(|| make_id(&self.system, TargetType::Person.as_str(), login))
    }
}

fn term_key(kind: TargetType, wp_id: LegacyId) -> String {
    format!("{}::{}", kind.as_str(), wp_id)
}

/// Decode entities and drop tags from a short rendered string
fn decode_text(rendered: &str) -> String {
    if !rendered.contains(['&', '<']) {
        return rendered.trim().to_string();
    }
    Html::parse_fragment(rendered)
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

/// One transformed document plus the inline images it could not resolve
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub document: TransformedDocument,
    pub unresolved_images: Vec<String>,
}

struct Body {
    blocks: Vec<Block>,
    legacy_html: Option<String>,
    unresolved: Vec<String>,
}

/// Maps export records to documents
pub struct Transformer<'a> {
    system: &'a str,
    manifest: &'a ImageManifest,
    lookups: Lookups,
    imported_at: String,
}

impl<'a> Transformer<'a> {
    pub fn new(
        records: &[ExportRecord],
        manifest: &'a ImageManifest,
        system: &'a str,
        imported_at: impl Into<String>,
    ) -> Self {
        Self {
            system,
            manifest,
            lookups: Lookups::build(records, system),
            imported_at: imported_at.into(),
        }
    }

    pub fn lookups(&self) -> &Lookups {
        &self.lookups
    }

    /// Transform one record; `None` when it has no target type
    pub fn transform(&self, record: &ExportRecord) -> Option<Transformed> {
        let target = record.sanity_type?;
        let id = match target {
            TargetType::Person => make_id(self.system, target.as_str(), &record.slug),
            _ => make_id(self.system, target.as_str(), record.wp_id),
        };

        let body = if target.is_content() {
            self.body(record, &id)
        } else {
            Body {
                blocks: Vec::new(),
                legacy_html: None,
                unresolved: Vec::new(),
            }
        };
        let legacy_source = self.legacy_source(record, body.legacy_html);
        let slug = Slug::new(record.slug.clone());

        let document = match target {
            TargetType::Article => TransformedDocument::Article(ArticleDoc {
                title: decode_text(&record.title),
                slug,
                excerpt: record.excerpt.clone(),
                featured_image: self.featured_image(record),
                content: body.blocks,
                authors: self.authors(record),
                categories: self.terms(record, TargetType::Category),
                tags: self.terms(record, TargetType::Tag),
                projects: Vec::new(),
                published_at: record.published_at.clone(),
                updated_at: record.modified_at.clone(),
                seo: seo(record),
                legacy_source,
                id,
            }),
            TargetType::Page => TransformedDocument::Page(PageDoc {
                title: decode_text(&record.title),
                slug,
                sections: text_sections(record.wp_id, body.blocks),
                template: "default".to_string(),
                seo: seo(record),
                legacy_source,
                id,
            }),
            TargetType::Node => TransformedDocument::Node(NodeDoc {
                title: decode_text(&record.title),
                slug,
                excerpt: record.excerpt.clone(),
                content: body.blocks,
                ai_tool: "mixed".to_string(),
                conversation_type: "learning".to_string(),
                status: "explored".to_string(),
                authors: self.authors(record),
                categories: self.terms(record, TargetType::Category),
                tags: self.terms(record, TargetType::Tag),
                projects: Vec::new(),
                published_at: record.published_at.clone(),
                updated_at: record.modified_at.clone(),
                legacy_source,
                id,
            }),
            TargetType::CaseStudy => TransformedDocument::CaseStudy(CaseStudyDoc {
                title: decode_text(&record.title),
                slug,
                excerpt: record.excerpt.clone(),
                featured_image: self.featured_image(record),
                sections: text_sections(record.wp_id, body.blocks),
                published_at: record.published_at.clone(),
                authors: self.authors(record),
                categories: self.terms(record, TargetType::Category),
                tags: self.terms(record, TargetType::Tag),
                projects: Vec::new(),
                seo: seo(record),
                legacy_source,
                id,
            }),
            TargetType::Category => TransformedDocument::Category(CategoryDoc {
                name: decode_text(&record.name),
                slug,
                description: record.description.clone(),
                legacy_source,
                id,
            }),
            TargetType::Tag => TransformedDocument::Tag(TagDoc {
                name: decode_text(&record.name),
                slug,
                legacy_source,
                id,
            }),
            TargetType::Person => TransformedDocument::Person(PersonDoc {
                name: if record.name.is_empty() {
                    record.slug.clone()
                } else {
                    decode_text(&record.name)
                },
                slug,
                legacy_source,
                id,
            }),
        };

        Some(Transformed {
            document,
            unresolved_images: body.unresolved,
        })
    }

    fn body(&self, record: &ExportRecord, id: &str) -> Body {
        let conversion = convert(&record.raw_html, id);
        if conversion.used_fallback {
            debug!("{} kept as raw HTML", id);
            return Body {
                blocks: Vec::new(),
                legacy_html: Some(record.raw_html.clone()),
                unresolved: Vec::new(),
            };
        }
        let resolved = resolve_images(conversion.blocks, self.manifest);
        Body {
            blocks: resolved.blocks,
            legacy_html: None,
            unresolved: resolved.unresolved,
        }
    }

    fn legacy_source(&self, record: &ExportRecord, legacy_html: Option<String>) -> LegacySource {
        LegacySource {
            system: self.system.to_string(),
            wp_id: record.wp_id,
            wp_type: record.post_type.clone(),
            wp_url: record.permalink.clone(),
            legacy_slug: record.slug.clone(),
            import_hash: content_hash(record.hash_source()),
            imported_at: self.imported_at.clone(),
            legacy_html,
            legacy_featured_image_url: record.featured_media_url.clone(),
        }
    }

    fn featured_image(&self, record: &ExportRecord) -> Option<ImageField> {
        let url = record.featured_media_url.as_deref()?;
        match self.manifest.asset_ref(url) {
            Some(asset) => Some(ImageField::asset(asset)),
            None => {
                debug!("featured image of {} not in manifest: {}", record.wp_id, url);
                None
            }
        }
    }

    fn authors(&self, record: &ExportRecord) -> Vec<Reference> {
        record
            .author_login
            .as_deref()
            .filter(|login| !login.is_empty())
            .map(|login| vec![Reference::item(self.lookups.person(login))])
            .unwrap_or_default()
    }

    fn terms(&self, record: &ExportRecord, kind: TargetType) -> Vec<Reference> {
        let ids = match kind {
            TargetType::Category => &record.term_category_ids,
            _ => &record.term_tag_ids,
        };
        ids.iter()
            .filter_map(|term_id| match self.lookups.term(kind, *term_id) {
                Some(doc_id) => Some(Reference::item(doc_id)),
                None => {
                    debug!("{} {} of {} was not exported, dropped", kind, term_id, record.wp_id);
                    None
                }
            })
            .collect()
    }
}

fn seo(record: &ExportRecord) -> Option<Seo> {
    if record.seo_title.is_empty() && record.seo_desc.is_empty() {
        return None;
    }
    Some(Seo {
        meta_title: record.seo_title.clone(),
        meta_description: record.seo_desc.clone(),
    })
}

fn text_sections(wp_id: LegacyId, blocks: Vec<Block>) -> Vec<TextSection> {
    if blocks.is_empty() {
        return Vec::new();
    }
    vec![TextSection {
        key: format!("ts_{}", wp_id),
        heading: String::new(),
        content: blocks,
    }]
}

/// Transform results
#[derive(Debug, Clone, Default)]
pub struct TransformSummary {
    pub counts: BTreeMap<TargetType, usize>,
    pub total: usize,
    /// Content documents kept as raw HTML
    pub fallbacks: usize,
    /// Inline images replaced by a visible placeholder
    pub unresolved_images: usize,
    /// Records with no target type
    pub skipped: usize,
}

/// Transform every record, in emission order
pub fn transform_all(
    records: &[ExportRecord],
    manifest: &ImageManifest,
    system: &str,
    imported_at: &str,
) -> (Vec<TransformedDocument>, TransformSummary) {
    let transformer = Transformer::new(records, manifest, system, imported_at);
    let mut summary = TransformSummary {
        skipped: records.iter().filter(|r| r.sanity_type.is_none()).count(),
        ..TransformSummary::default()
    };
    let mut documents = Vec::with_capacity(records.len());

    for target in TargetType::TRANSFORM_ORDER {
        for record in records.iter().filter(|r| r.sanity_type == Some(target)) {
            let Some(out) = transformer.transform(record) else {
                continue;
            };
            if out.document.used_fallback() {
                summary.fallbacks += 1;
            }
            summary.unresolved_images += out.unresolved_images.len();
            *summary.counts.entry(target).or_default() += 1;
            documents.push(out.document);
        }
    }
    summary.total = documents.len();

    (documents, summary)
}

/// Read the export and manifest, write the import artifact
pub fn run_transform(config: &Config, paths: &ArtifactPaths) -> MigrateResult<TransformSummary> {
    let records: Vec<ExportRecord> = read_ndjson(&paths.export())?;
    if records.is_empty() {
        return Err(MigrateError::MissingArtifact {
            path: paths.export(),
            stage: "export",
        });
    }

    let manifest: ImageManifest = match read_json(&paths.image_manifest())? {
        Some(manifest) => manifest,
        None => {
            warn!(
                "No image manifest at {}; every image will be left unresolved",
                paths.image_manifest().display()
            );
            ImageManifest::new()
        }
    };
    if manifest.is_empty() {
        warn!("Image manifest is empty; run `images` first for resolved images");
    }

    let imported_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let (documents, summary) = transform_all(&records, &manifest, &config.source.system, &imported_at);

    write_ndjson(&paths.import(), &documents)?;
    info!(
        "Wrote {} document(s) to {} ({} fallback)",
        documents.len(),
        paths.import().display(),
        summary.fallbacks
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ManifestEntry;

    const NOW: &str = "2024-05-01T00:00:00.000Z";

    fn term(kind: TargetType, wp_id: u64, name: &str) -> ExportRecord {
        ExportRecord {
            wp_id,
            post_type: kind.as_str().into(),
            sanity_type: Some(kind),
            slug: name.to_lowercase(),
            name: name.into(),
            ..ExportRecord::default()
        }
    }

    fn content(kind: TargetType, wp_id: u64, html: &str) -> ExportRecord {
        ExportRecord {
            wp_id,
            post_type: "post".into(),
            sanity_type: Some(kind),
            slug: format!("item-{}", wp_id),
            permalink: format!("https://l.test/blog/item-{}/", wp_id),
            title: "Tips &amp; Tricks".into(),
            raw_html: html.into(),
            term_category_ids: vec![10, 99],
            author_login: Some("jane".into()),
            published_at: Some("2023-01-01T00:00:00Z".into()),
            modified_at: Some("2023-02-01T00:00:00Z".into()),
            ..ExportRecord::default()
        }
    }

    #[test]
    fn article_maps_references_and_provenance() {
        let records = vec![
            term(TargetType::Category, 10, "Rust"),
            content(TargetType::Article, 1, "<p>Hello</p>"),
        ];
        let manifest = ImageManifest::new();
        let t = Transformer::new(&records, &manifest, "wp", NOW);
        let out = t.transform(&records[1]).unwrap();

        let TransformedDocument::Article(doc) = out.document else {
            panic!("expected article");
        };
        assert_eq!(doc.id, "wp.article.1");
        assert_eq!(doc.title, "Tips & Tricks");
        assert_eq!(doc.categories.len(), 1);
        assert_eq!(doc.categories[0].target, "wp.category.10");
        assert_eq!(doc.authors[0].target, "wp.person.jane");
        assert!(doc.projects.is_empty());
        assert!(doc.seo.is_none());
        assert_eq!(doc.updated_at.as_deref(), Some("2023-02-01T00:00:00Z"));
        assert_eq!(doc.legacy_source.import_hash, content_hash("<p>Hello</p>"));
        assert_eq!(doc.legacy_source.legacy_slug, "item-1");
        assert!(doc.legacy_source.legacy_html.is_none());
    }

    #[test]
    fn unsafe_html_falls_back_verbatim() {
        let html = "<!-- wp:paragraph --><p>x</p><!-- /wp:paragraph -->";
        let records = vec![content(TargetType::Node, 3, html)];
        let manifest = ImageManifest::new();
        let out = Transformer::new(&records, &manifest, "wp", NOW)
            .transform(&records[0])
            .unwrap();

        assert!(out.document.used_fallback());
        assert_eq!(out.document.legacy_source().legacy_html.as_deref(), Some(html));
        let TransformedDocument::Node(doc) = out.document else {
            panic!("expected node");
        };
        assert!(doc.content.is_empty());
        assert_eq!(doc.ai_tool, "mixed");
        assert_eq!(doc.conversation_type, "learning");
        assert_eq!(doc.status, "explored");
    }

    #[test]
    fn page_wraps_blocks_in_one_section() {
        let records = vec![
            content(TargetType::Page, 4, "<p>About</p>"),
            content(TargetType::Page, 5, ""),
        ];
        let manifest = ImageManifest::new();
        let t = Transformer::new(&records, &manifest, "wp", NOW);

        let TransformedDocument::Page(page) = t.transform(&records[0]).unwrap().document else {
            panic!("expected page");
        };
        assert_eq!(page.template, "default");
        assert_eq!(page.sections.len(), 1);
        assert_eq!(page.sections[0].key, "ts_4");
        assert_eq!(page.sections[0].heading, "");

        let TransformedDocument::Page(empty) = t.transform(&records[1]).unwrap().document else {
            panic!("expected page");
        };
        assert!(empty.sections.is_empty());
        assert!(empty.legacy_source.legacy_html.is_none());
    }

    #[test]
    fn featured_image_needs_manifest_entry() {
        let mut record = content(TargetType::CaseStudy, 6, "<p>x</p>");
        record.featured_media_url = Some("https://l.test/f.jpg".into());
        record.seo_desc = "Desc".into();
        let records = vec![record];

        let empty = ImageManifest::new();
        let TransformedDocument::CaseStudy(doc) = Transformer::new(&records, &empty, "wp", NOW)
            .transform(&records[0])
            .unwrap()
            .document
        else {
            panic!("expected case study");
        };
        assert!(doc.featured_image.is_none());
        assert_eq!(
            doc.legacy_source.legacy_featured_image_url.as_deref(),
            Some("https://l.test/f.jpg")
        );
        assert_eq!(doc.seo.unwrap().meta_description, "Desc");

        let mut manifest = ImageManifest::new();
        manifest.insert(
            "https://l.test/f.jpg",
            ManifestEntry {
                sanity_asset_ref: "image-f".into(),
                is_priority_svg: false,
                original_url: "https://l.test/f.jpg".into(),
            },
        );
        let TransformedDocument::CaseStudy(doc) = Transformer::new(&records, &manifest, "wp", NOW)
            .transform(&records[0])
            .unwrap()
            .document
        else {
            panic!("expected case study");
        };
        assert_eq!(doc.featured_image.unwrap().asset.target, "image-f");
    }

    #[test]
    fn emission_order_puts_taxonomy_and_people_first() {
        let mut person = term(TargetType::Person, 1, "Jane");
        person.slug = "jane".into();
        person.post_type = "user".into();
        let records = vec![
            content(TargetType::Article, 1, "<p>a</p>"),
            term(TargetType::Tag, 2, "Go"),
            person,
            term(TargetType::Category, 10, "Rust"),
            ExportRecord::default(),
        ];
        let (docs, summary) = transform_all(&records, &ImageManifest::new(), "wp", NOW);
        let types: Vec<TargetType> = docs.iter().map(|d| d.target_type()).collect();
        assert_eq!(
            types,
            vec![
                TargetType::Category,
                TargetType::Tag,
                TargetType::Person,
                TargetType::Article
            ]
        );
        assert_eq!(docs[2].id(), "wp.person.jane");
        assert_eq!(summary.total, 4);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn same_input_gives_identical_documents() {
        let records = vec![content(
            TargetType::Article,
            8,
            r#"<h2>Title</h2><ul><li>one</li><li><a href="/x">two</a></li></ul>"#,
        )];
        let manifest = ImageManifest::new();
        let (a, _) = transform_all(&records, &manifest, "wp", NOW);
        let (b, _) = transform_all(&records, &manifest, "wp", NOW);
        assert_eq!(a, b);
    }
}
