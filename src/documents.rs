//! Documents written to the target store
//!
//! [`TransformedDocument`] is the typed output of the transformer, one
//! variant per target kind. [`RawDocument`] is the untyped view the importer
//! and the stores work with, so a malformed or superseded document can still
//! be read, reported and rejected.

use crate::richtext::{Block, Reference};
use crate::types::{LegacyId, TargetType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// URL slug
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "slug")]
pub struct Slug {
    pub current: String,
}

impl Slug {
    pub fn new(current: impl Into<String>) -> Self {
        Self {
            current: current.into(),
        }
    }
}

/// Image field referencing an uploaded asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "image")]
pub struct ImageField {
    pub asset: Reference,
}

impl ImageField {
    pub fn asset(asset_ref: impl Into<String>) -> Self {
        Self {
            asset: Reference::to(asset_ref),
        }
    }
}

/// SEO metadata carried over from the legacy SEO plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "seoMetadata", rename_all = "camelCase")]
pub struct Seo {
    pub meta_title: String,
    pub meta_description: String,
}

/// Page-builder section wrapping converted body content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "textSection")]
pub struct TextSection {
    #[serde(rename = "_key")]
    pub key: String,
    pub heading: String,
    pub content: Vec<Block>,
}

/// Provenance block present on every migrated document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "legacySource", rename_all = "camelCase")]
pub struct LegacySource {
    pub system: String,
    pub wp_id: LegacyId,
    pub wp_type: String,
    pub wp_url: String,
    pub legacy_slug: String,
    /// MD5 of the raw HTML (content) or name (taxonomy, people)
    pub import_hash: String,
    pub imported_at: String,
    /// Raw HTML, kept only when conversion fell back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_featured_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub slug: Slug,
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<ImageField>,
    pub content: Vec<Block>,
    pub authors: Vec<Reference>,
    pub categories: Vec<Reference>,
    pub tags: Vec<Reference>,
    pub projects: Vec<Reference>,
    pub published_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo: Option<Seo>,
    pub legacy_source: LegacySource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub slug: Slug,
    pub sections: Vec<TextSection>,
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo: Option<Seo>,
    pub legacy_source: LegacySource,
}

/// Knowledge-graph node (legacy "gem")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub slug: Slug,
    pub excerpt: String,
    pub content: Vec<Block>,
    pub ai_tool: String,
    pub conversation_type: String,
    pub status: String,
    pub authors: Vec<Reference>,
    pub categories: Vec<Reference>,
    pub tags: Vec<Reference>,
    pub projects: Vec<Reference>,
    pub published_at: Option<String>,
    pub updated_at: Option<String>,
    pub legacy_source: LegacySource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseStudyDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub slug: Slug,
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<ImageField>,
    pub sections: Vec<TextSection>,
    pub published_at: Option<String>,
    pub authors: Vec<Reference>,
    pub categories: Vec<Reference>,
    pub tags: Vec<Reference>,
    pub projects: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo: Option<Seo>,
    pub legacy_source: LegacySource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub slug: Slug,
    pub description: String,
    pub legacy_source: LegacySource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub slug: Slug,
    pub legacy_source: LegacySource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub slug: Slug,
    pub legacy_source: LegacySource,
}

/// A document ready for import, discriminated by `_type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename_all = "camelCase")]
pub enum TransformedDocument {
    Article(ArticleDoc),
    Page(PageDoc),
    Node(NodeDoc),
    CaseStudy(CaseStudyDoc),
    Category(CategoryDoc),
    Tag(TagDoc),
    Person(PersonDoc),
}

impl TransformedDocument {
    pub fn id(&self) -> &str {
        match self {
            Self::Article(d) => &d.id,
            Self::Page(d) => &d.id,
            Self::Node(d) => &d.id,
            Self::CaseStudy(d) => &d.id,
            Self::Category(d) => &d.id,
            Self::Tag(d) => &d.id,
            Self::Person(d) => &d.id,
        }
    }

    pub fn target_type(&self) -> TargetType {
        match self {
            Self::Article(_) => TargetType::Article,
            Self::Page(_) => TargetType::Page,
            Self::Node(_) => TargetType::Node,
            Self::CaseStudy(_) => TargetType::CaseStudy,
            Self::Category(_) => TargetType::Category,
            Self::Tag(_) => TargetType::Tag,
            Self::Person(_) => TargetType::Person,
        }
    }

    pub fn slug(&self) -> &str {
        match self {
            Self::Article(d) => &d.slug.current,
            Self::Page(d) => &d.slug.current,
            Self::Node(d) => &d.slug.current,
            Self::CaseStudy(d) => &d.slug.current,
            Self::Category(d) => &d.slug.current,
            Self::Tag(d) => &d.slug.current,
            Self::Person(d) => &d.slug.current,
        }
    }

    pub fn legacy_source(&self) -> &LegacySource {
        match self {
            Self::Article(d) => &d.legacy_source,
            Self::Page(d) => &d.legacy_source,
            Self::Node(d) => &d.legacy_source,
            Self::CaseStudy(d) => &d.legacy_source,
            Self::Category(d) => &d.legacy_source,
            Self::Tag(d) => &d.legacy_source,
            Self::Person(d) => &d.legacy_source,
        }
    }

    /// Whether the body was preserved as raw HTML instead of blocks
    pub fn used_fallback(&self) -> bool {
        self.legacy_source().legacy_html.is_some()
    }

    /// Body blocks, flattened across sections
    pub fn body_blocks(&self) -> Vec<&Block> {
        match self {
            Self::Article(d) => d.content.iter().collect(),
            Self::Node(d) => d.content.iter().collect(),
            Self::Page(d) => d.sections.iter().flat_map(|s| s.content.iter()).collect(),
            Self::CaseStudy(d) => d.sections.iter().flat_map(|s| s.content.iter()).collect(),
            Self::Category(_) | Self::Tag(_) | Self::Person(_) => Vec::new(),
        }
    }
}

/// Untyped document: `_id`, `_type` and every other field as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_type", default)]
    pub doc_type: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawDocument {
    /// Field lookup by dotted path (`slug.current`, `authors.0._ref`)
    pub fn path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        parts.try_fold(self.fields.get(first)?, |value, part| match part.parse::<usize>() {
            Ok(idx) if value.is_array() => value.get(idx),
            _ => value.get(part),
        })
    }

    pub fn str_at(&self, path: &str) -> Option<&str> {
        self.path(path).and_then(Value::as_str)
    }

    /// Documents created by this migration carry provenance
    pub fn has_legacy_source(&self) -> bool {
        self.fields.contains_key("legacySource")
    }

    pub fn slug(&self) -> Option<&str> {
        self.str_at("slug.current")
    }

    /// Whole document as one JSON value
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 2);
        map.insert("_id".to_string(), Value::String(self.id.clone()));
        map.insert("_type".to_string(), Value::String(self.doc_type.clone()));
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

impl TryFrom<&TransformedDocument> for RawDocument {
    type Error = serde_json::Error;

    fn try_from(doc: &TransformedDocument) -> Result<Self, Self::Error> {
        serde_json::from_value(serde_json::to_value(doc)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy(slug: &str) -> LegacySource {
        LegacySource {
            system: "wp".into(),
            wp_id: 7,
            wp_type: "tag".into(),
            wp_url: "https://legacy.test/tag/rust/".into(),
            legacy_slug: slug.into(),
            import_hash: "abc".into(),
            imported_at: "2024-01-01T00:00:00Z".into(),
            legacy_html: None,
            legacy_featured_image_url: None,
        }
    }

    #[test]
    fn tagged_union_serializes_type_and_id() {
        let doc = TransformedDocument::Tag(TagDoc {
            id: "wp.tag.7".into(),
            name: "Rust".into(),
            slug: Slug::new("rust"),
            legacy_source: legacy("rust"),
        });
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["_type"], json!("tag"));
        assert_eq!(value["_id"], json!("wp.tag.7"));
        assert_eq!(value["slug"], json!({"_type": "slug", "current": "rust"}));
        assert_eq!(value["legacySource"]["_type"], json!("legacySource"));
        assert_eq!(value["legacySource"]["wpId"], json!(7));
        assert!(value["legacySource"].get("legacyHtml").is_none());

        let back: TransformedDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn case_study_type_tag_is_camel_case() {
        let doc = TransformedDocument::CaseStudy(CaseStudyDoc {
            id: "wp.caseStudy.1".into(),
            title: "T".into(),
            slug: Slug::new("t"),
            excerpt: String::new(),
            featured_image: None,
            sections: Vec::new(),
            published_at: None,
            authors: Vec::new(),
            categories: Vec::new(),
            tags: Vec::new(),
            projects: Vec::new(),
            seo: None,
            legacy_source: legacy("t"),
        });
        let raw = RawDocument::try_from(&doc).unwrap();
        assert_eq!(raw.doc_type, "caseStudy");
        assert_eq!(raw.slug(), Some("t"));
        assert!(raw.has_legacy_source());
    }

    #[test]
    fn raw_document_reads_unknown_types() {
        let raw: RawDocument =
            serde_json::from_str(r#"{"_id":"wp.post.1","_type":"post","title":"x"}"#).unwrap();
        assert_eq!(raw.doc_type, "post");
        assert_eq!(raw.str_at("title"), Some("x"));
        assert!(!raw.has_legacy_source());
        assert_eq!(raw.to_value()["_id"], json!("wp.post.1"));
    }

    #[test]
    fn raw_document_missing_identity_defaults_to_empty() {
        let raw: RawDocument = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert!(raw.id.is_empty());
        assert!(raw.doc_type.is_empty());
    }
}
