//! Image discovery and placeholder resolution

use super::{Block, Converted, ImageBlock, Reference, TextBlock};
use crate::types::ImageManifest;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::warn;

static RE_IMG_SRC: OnceLock<Regex> = OnceLock::new();

/// Distinct `<img src>` URLs in document order, `data:` URIs excluded
pub fn extract_image_urls(html: &str) -> Vec<String> {
    if html.is_empty() {
        return Vec::new();
    }
    let re = RE_IMG_SRC.get_or_init(|| {
        Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["'][^>]*>"#).unwrap()
    });

    let mut seen = HashSet::new();
    re.captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|src| !src.is_empty() && !src.starts_with("data:"))
        .filter(|src| seen.insert(src.to_string()))
        .map(str::to_string)
        .collect()
}

/// Blocks after placeholder resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    pub blocks: Vec<Block>,
    /// Image URLs with no manifest entry, in document order
    pub unresolved: Vec<String>,
}

/// Replace image placeholders using the manifest.
///
/// A hit becomes an image block with the asset reference; a miss becomes a
/// visible text block at the same position so the gap is obvious to editors.
pub fn resolve_images(converted: Vec<Converted>, manifest: &ImageManifest) -> Resolved {
    let mut resolved = Resolved::default();
    for item in converted {
        match item {
            Converted::Block(block) => resolved.blocks.push(block),
            Converted::Image { key, url, alt } => match manifest.asset_ref(&url) {
                Some(asset) => resolved.blocks.push(Block::Image(ImageBlock {
                    key,
                    asset: Reference::to(asset),
                    alt,
                })),
                None => {
                    warn!("Unresolved inline image: {}", url);
                    resolved.blocks.push(Block::Text(TextBlock::plain(
                        key,
                        format!("[Image not migrated: {}]", url),
                    )));
                    resolved.unresolved.push(url);
                }
            },
        }
    }
    resolved
}
