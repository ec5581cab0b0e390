//! Safety classification of legacy HTML
//!
//! Markup the converter cannot represent faithfully (block-editor markers,
//! shortcodes, tables, embeds, scripts, forms) is routed to the fallback
//! path instead of being converted lossily.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

static RE_SHORTCODE: OnceLock<Regex> = OnceLock::new();
static RE_UNSAFE_TAG: OnceLock<Regex> = OnceLock::new();

/// Why a fragment is not convertible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsafeReason {
    BlockEditorMarkup,
    Shortcode,
    Table,
    Iframe,
    Script,
    Style,
    Form,
}

impl UnsafeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockEditorMarkup => "block editor markup",
            Self::Shortcode => "shortcode",
            Self::Table => "table",
            Self::Iframe => "iframe",
            Self::Script => "script",
            Self::Style => "style",
            Self::Form => "form",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "table" => Some(Self::Table),
            "iframe" => Some(Self::Iframe),
            "script" => Some(Self::Script),
            "style" => Some(Self::Style),
            "form" => Some(Self::Form),
            _ => None,
        }
    }
}

impl fmt::Display for UnsafeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First reason the fragment is unsafe to convert, or `None` if it is safe.
///
/// A pure function of its input.
pub fn classify(html: &str) -> Option<UnsafeReason> {
    if html.contains("<!-- wp:") {
        return Some(UnsafeReason::BlockEditorMarkup);
    }

    let shortcode = RE_SHORTCODE.get_or_init(|| Regex::new(r"\[[\w-]+").unwrap());
    if shortcode.is_match(html) {
        return Some(UnsafeReason::Shortcode);
    }

    let unsafe_tag = RE_UNSAFE_TAG
        .get_or_init(|| Regex::new(r"(?i)<(table|iframe|script|style|form)[\s>]").unwrap());
    unsafe_tag
        .captures(html)
        .and_then(|caps| caps.get(1))
        .and_then(|m| UnsafeReason::from_tag(m.as_str()))
}

/// Whether the fragment can go through the converter
pub fn is_convertible(html: &str) -> bool {
    classify(html).is_none()
}
