//! Rich-text blocks and the HTML → blocks conversion
//!
//! Blocks follow the Portable Text shape the target store expects: text
//! blocks with styled, marked spans; image blocks referencing an uploaded
//! asset; and break blocks for horizontal rules. Every block and span key
//! comes from a [`BlockKeys`](crate::ids::BlockKeys) seeded with the
//! document ID, so converting the same HTML twice yields identical output.

mod classify;
mod convert;
mod images;

pub use classify::{classify, is_convertible, UnsafeReason};
pub use convert::{convert, Conversion, Converted};
pub use images::{extract_image_urls, resolve_images, Resolved};

use serde::{Deserialize, Serialize};

/// Reference to another document or asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "reference")]
pub struct Reference {
    #[serde(rename = "_ref")]
    pub target: String,
    /// Present when the reference is an array member
    #[serde(rename = "_key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Reference {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            key: None,
        }
    }

    /// Array-member reference; the key is derived from the target ID so it
    /// stays stable across runs
    pub fn item(target: impl Into<String>) -> Self {
        let target = target.into();
        let key = crate::ids::content_hash(&target)[..12].to_string();
        Self {
            target,
            key: Some(key),
        }
    }
}

/// List kind of a list-item block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Bullet,
    Number,
}

/// Link annotation referenced from span marks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "link")]
pub struct MarkDef {
    #[serde(rename = "_key")]
    pub key: String,
    pub href: String,
}

/// Run of text sharing one set of marks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "span")]
pub struct Span {
    #[serde(rename = "_key")]
    pub key: String,
    pub text: String,
    #[serde(default)]
    pub marks: Vec<String>,
}

/// Paragraph, heading, quote or list item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    #[serde(rename = "_key")]
    pub key: String,
    pub style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_item: Option<ListKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default)]
    pub mark_defs: Vec<MarkDef>,
    pub children: Vec<Span>,
}

impl TextBlock {
    /// Single-span paragraph
    pub fn plain(key: impl Into<String>, text: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            children: vec![Span {
                key: format!("{}_txt", key),
                text: text.into(),
                marks: Vec::new(),
            }],
            key,
            style: "normal".to_string(),
            list_item: None,
            level: None,
            mark_defs: Vec::new(),
        }
    }

    /// Concatenated span text
    pub fn text(&self) -> String {
        self.children.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Inline image referencing an uploaded asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBlock {
    #[serde(rename = "_key")]
    pub key: String,
    pub asset: Reference,
    #[serde(default)]
    pub alt: String,
}

/// Horizontal rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakBlock {
    #[serde(rename = "_key")]
    pub key: String,
    pub style: String,
}

/// One rich-text block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum Block {
    #[serde(rename = "block")]
    Text(TextBlock),
    #[serde(rename = "image")]
    Image(ImageBlock),
    #[serde(rename = "break")]
    Break(BreakBlock),
}

impl Block {
    pub fn key(&self) -> &str {
        match self {
            Self::Text(b) => &b.key,
            Self::Image(b) => &b.key,
            Self::Break(b) => &b.key,
        }
    }

    /// Visible text of the block (empty for images and breaks)
    pub fn text(&self) -> String {
        match self {
            Self::Text(b) => b.text(),
            _ => String::new(),
        }
    }
}

/// Plain text of a block list, one line per text block
pub fn plain_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            Block::Text(t) => Some(t.text()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
