//! Core types shared by the pipeline stages

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Legacy numeric identifier
pub type LegacyId = u64;

// ============================================================================
// Target document kinds
// ============================================================================

/// Document type in the target store.
///
/// The type this migration supersedes (`post`) is intentionally absent: a
/// transformed document can only ever be one of these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetType {
    Article,
    Page,
    Node,
    CaseStudy,
    Category,
    Tag,
    Person,
}

impl TargetType {
    /// All kinds, in report order
    pub const ALL: [TargetType; 7] = [
        TargetType::Article,
        TargetType::Page,
        TargetType::Node,
        TargetType::CaseStudy,
        TargetType::Category,
        TargetType::Tag,
        TargetType::Person,
    ];

    /// Emission order for the transformer: taxonomy and people first
    pub const TRANSFORM_ORDER: [TargetType; 7] = [
        TargetType::Category,
        TargetType::Tag,
        TargetType::Person,
        TargetType::Article,
        TargetType::Page,
        TargetType::Node,
        TargetType::CaseStudy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Page => "page",
            Self::Node => "node",
            Self::CaseStudy => "caseStudy",
            Self::Category => "category",
            Self::Tag => "tag",
            Self::Person => "person",
        }
    }

    /// Content kinds carry a rich-text body
    pub fn is_content(&self) -> bool {
        matches!(
            self,
            Self::Article | Self::Page | Self::Node | Self::CaseStudy
        )
    }

    /// Taxonomy kinds are referenced by content
    pub fn is_taxonomy(&self) -> bool {
        matches!(self, Self::Category | Self::Tag)
    }

    /// Canonical URL prefix on the new site (`None` for root-level pages)
    pub fn route_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Article => Some("/articles"),
            Self::Page => None,
            Self::Node => Some("/nodes"),
            Self::CaseStudy => Some("/case-studies"),
            Self::Category => Some("/categories"),
            Self::Tag => Some("/tags"),
            Self::Person => Some("/people"),
        }
    }

    /// Canonical path for a slug of this kind
    pub fn canonical_path(&self, slug: &str) -> String {
        match self.route_prefix() {
            Some(prefix) => format!("{}/{}", prefix, slug),
            None => format!("/{}", slug),
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown target type: {}", s))
    }
}

// ============================================================================
// Export records
// ============================================================================

/// One legacy item as exported, flat and denormalized.
///
/// Content, taxonomy and author records share this shape; fields that do not
/// apply to a kind are left at their defaults. HTML is kept exactly as the
/// legacy API rendered it (entities included).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportRecord {
    /// Legacy numeric ID
    pub wp_id: LegacyId,
    /// Legacy type tag (post, page, gem, case_study, category, tag, user)
    pub post_type: String,
    /// Target type tag
    pub sanity_type: Option<TargetType>,
    /// Publication status (content only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub slug: String,
    pub permalink: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Display name (taxonomy terms and people)
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Term description
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Author email (people)
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
    /// Number of items using the term
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Plain-text excerpt
    #[serde(skip_serializing_if = "String::is_empty")]
    pub excerpt: String,
    /// Raw rendered HTML body
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw_html: String,
    pub featured_media_url: Option<String>,
    /// Image URLs found in the body, in document order, deduplicated
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub term_category_ids: Vec<LegacyId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub term_tag_ids: Vec<LegacyId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub seo_title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub seo_desc: String,
}

impl ExportRecord {
    /// Text the import hash is computed over: the body for content, the
    /// name for taxonomy and people
    pub fn hash_source(&self) -> &str {
        if !self.raw_html.is_empty() {
            &self.raw_html
        } else {
            &self.name
        }
    }

    /// Every image URL this record references (featured first)
    pub fn referenced_images(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.featured_media_url
            .as_deref()
            .map(|u| (u, "featuredImage"))
            .into_iter()
            .chain(self.image_urls.iter().map(|u| (u.as_str(), "bodyContent")))
    }
}

// ============================================================================
// Image manifest
// ============================================================================

/// Result of transferring one legacy image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Asset reference returned by the target store
    pub sanity_asset_ref: String,
    /// Vector asset that needs manual confirmation before cutover
    #[serde(default)]
    pub is_priority_svg: bool,
    /// Legacy URL, kept for audit
    pub original_url: String,
}

/// Persisted URL → asset map; the only record of what has been transferred
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageManifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl ImageManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry unless the URL is already known.
    ///
    /// Returns `false` when the URL was already present; the existing entry
    /// is left untouched.
    pub fn insert(&mut self, url: impl Into<String>, entry: ManifestEntry) -> bool {
        use std::collections::btree_map::Entry;
        match self.entries.entry(url.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    pub fn get(&self, url: &str) -> Option<&ManifestEntry> {
        self.entries.get(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    /// Asset reference for a URL, if transferred
    pub fn asset_ref(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(|e| e.sanity_asset_ref.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.entries.iter()
    }

    /// Number of priority (vector) assets
    pub fn priority_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_priority_svg).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(asset: &str) -> ManifestEntry {
        ManifestEntry {
            sanity_asset_ref: asset.to_string(),
            is_priority_svg: false,
            original_url: "https://legacy.test/a.png".to_string(),
        }
    }

    #[test]
    fn test_manifest_insert_is_idempotent() {
        let mut manifest = ImageManifest::new();
        assert!(manifest.insert("https://legacy.test/a.png", entry("image-1")));
        assert!(!manifest.insert("https://legacy.test/a.png", entry("image-2")));
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.asset_ref("https://legacy.test/a.png"), Some("image-1"));
    }

    #[test]
    fn test_manifest_json_shape() {
        let mut manifest = ImageManifest::new();
        manifest.insert("https://legacy.test/a.png", entry("image-1"));
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(
            json["https://legacy.test/a.png"]["sanityAssetRef"],
            serde_json::json!("image-1")
        );
        let back: ImageManifest = serde_json::from_value(json).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn test_target_type_round_trips_through_str() {
        for t in TargetType::ALL {
            assert_eq!(t.as_str().parse::<TargetType>().unwrap(), t);
        }
        assert!("post".parse::<TargetType>().is_err());
    }

    #[test]
    fn test_canonical_paths() {
        assert_eq!(TargetType::Article.canonical_path("launch"), "/articles/launch");
        assert_eq!(TargetType::Page.canonical_path("about"), "/about");
        assert_eq!(TargetType::CaseStudy.canonical_path("x"), "/case-studies/x");
    }

    #[test]
    fn test_export_record_referenced_images() {
        let record = ExportRecord {
            featured_media_url: Some("https://legacy.test/f.jpg".into()),
            image_urls: vec!["https://legacy.test/b.png".into()],
            ..Default::default()
        };
        let refs: Vec<_> = record.referenced_images().collect();
        assert_eq!(
            refs,
            vec![
                ("https://legacy.test/f.jpg", "featuredImage"),
                ("https://legacy.test/b.png", "bodyContent"),
            ]
        );
    }

    #[test]
    fn test_export_record_deserializes_sparse_lines() {
        let line = r#"{"wpId":3,"postType":"category","sanityType":"category","slug":"news","name":"News","permalink":""}"#;
        let record: ExportRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.sanity_type, Some(TargetType::Category));
        assert_eq!(record.hash_source(), "News");
        assert!(record.image_urls.is_empty());
    }
}
