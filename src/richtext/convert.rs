//! HTML → block conversion
//!
//! Block elements open a new block context; inline content between them is
//! gathered into a run of spans that becomes one text block. Images become
//! positional placeholders so the transfer manifest can be applied later.

use super::classify::is_convertible;
use super::{Block, BreakBlock, ListKind, MarkDef, Span, TextBlock};
use crate::ids::BlockKeys;
use scraper::{ElementRef, Html, Node};

/// Converter output, before image placeholders are resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Converted {
    Block(Block),
    /// `<img>` at this position; resolved against the image manifest
    Image { key: String, url: String, alt: String },
}

/// Result of converting one HTML fragment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversion {
    pub blocks: Vec<Converted>,
    /// The fragment must be preserved verbatim instead
    pub used_fallback: bool,
}

impl Conversion {
    fn fallback() -> Self {
        Self {
            blocks: Vec::new(),
            used_fallback: true,
        }
    }
}

/// Convert a legacy HTML fragment into blocks keyed from `seed`.
///
/// Blank input yields no blocks. Unsafe input, or non-blank input that
/// produces no block at all, yields the fallback marker.
pub fn convert(html: &str, seed: &str) -> Conversion {
    if html.trim().is_empty() {
        return Conversion::default();
    }
    if !is_convertible(html) {
        return Conversion::fallback();
    }

    let fragment = Html::parse_fragment(html);
    let mut converter = Converter::new(seed);
    converter.container(fragment.root_element(), &Context::default());

    if converter.out.is_empty() {
        return Conversion::fallback();
    }
    Conversion {
        blocks: converter.out,
        used_fallback: false,
    }
}

#[derive(Debug, Clone)]
struct Context {
    style: &'static str,
    list: Option<(ListKind, u8)>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            style: "normal",
            list: None,
        }
    }
}

impl Context {
    fn with_style(&self, style: &'static str) -> Self {
        Self {
            style,
            list: self.list,
        }
    }

    fn list_level(&self) -> u8 {
        self.list.map(|(_, level)| level).unwrap_or(0)
    }
}

/// Inline content gathered for one text block
#[derive(Debug, Default)]
struct Run {
    spans: Vec<(String, Vec<String>)>,
    mark_defs: Vec<MarkDef>,
}

impl Run {
    fn push_text(&mut self, raw: &str, marks: &[String]) {
        let mut text = String::with_capacity(raw.len());
        let mut last_space = self.ends_with_space();
        for c in raw.chars() {
            if c.is_ascii_whitespace() {
                if !last_space {
                    text.push(' ');
                    last_space = true;
                }
            } else {
                text.push(c);
                last_space = false;
            }
        }
        self.push_literal(text, marks);
    }

    fn push_literal(&mut self, text: String, marks: &[String]) {
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some((last, last_marks)) if last_marks.as_slice() == marks => last.push_str(&text),
            _ => self.spans.push((text, marks.to_vec())),
        }
    }

    fn ends_with_space(&self) -> bool {
        match self.spans.last() {
            Some((text, _)) => text.ends_with(' ') || text.ends_with('\n'),
            None => true,
        }
    }

    fn has_text(&self) -> bool {
        self.spans.iter().any(|(t, _)| !t.trim().is_empty())
    }
}

struct Converter {
    keys: BlockKeys,
    out: Vec<Converted>,
}

impl Converter {
    fn new(seed: &str) -> Self {
        Self {
            keys: BlockKeys::new(seed),
            out: Vec::new(),
        }
    }

    /// Walk an element's children as a block context
    fn container(&mut self, el: ElementRef<'_>, ctx: &Context) {
        let mut run = Run::default();
        for child in el.children() {
            match child.value() {
                Node::Text(text) => run.push_text(text, &[]),
                Node::Element(element) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if is_block(element.name()) {
                        self.flush(&mut run, ctx);
                        self.block(child_el, ctx);
                    } else {
                        self.inline(child_el, &mut run, &[], ctx);
                    }
                }
                _ => {}
            }
        }
        self.flush(&mut run, ctx);
    }

    fn block(&mut self, el: ElementRef<'_>, ctx: &Context) {
        let name = el.value().name();
        match name {
            "p" => self.container(el, ctx),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.container(el, &ctx.with_style(heading_style(name)))
            }
            "blockquote" => self.container(el, &ctx.with_style("blockquote")),
            "ul" | "ol" => {
                let kind = if name == "ol" {
                    ListKind::Number
                } else {
                    ListKind::Bullet
                };
                let level = ctx.list_level().saturating_add(1);
                let list_ctx = Context {
                    style: "normal",
                    list: Some((kind, level)),
                };
                self.container(el, &list_ctx);
            }
            "li" => {
                let list_ctx = match ctx.list {
                    Some(_) => ctx.clone(),
                    None => Context {
                        style: "normal",
                        list: Some((ListKind::Bullet, 1)),
                    },
                };
                self.container(el, &list_ctx);
            }
            "img" => self.image(el),
            "hr" => {
                let key = self.keys.next_key();
                self.out.push(Converted::Block(Block::Break(BreakBlock {
                    key,
                    style: "break".to_string(),
                })));
            }
            _ => self.container(el, ctx),
        }
    }

    fn inline(&mut self, el: ElementRef<'_>, run: &mut Run, marks: &[String], ctx: &Context) {
        let name = el.value().name();
        let mut marks = marks.to_vec();
        match name {
            "br" => {
                trim_trailing_space(run);
                run.push_literal("\n".to_string(), &marks);
                return;
            }
            "strong" | "b" => push_mark(&mut marks, "strong"),
            "em" | "i" => push_mark(&mut marks, "em"),
            "code" => push_mark(&mut marks, "code"),
            "a" => {
                if let Some(href) = el.value().attr("href").filter(|h| !h.is_empty()) {
                    let key = self.keys.next_key();
                    run.mark_defs.push(MarkDef {
                        key: key.clone(),
                        href: href.to_string(),
                    });
                    marks.push(key);
                }
            }
            _ => {}
        }

        for child in el.children() {
            match child.value() {
                Node::Text(text) => run.push_text(text, &marks),
                Node::Element(element) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if is_block(element.name()) {
                        // Block inside inline markup: close the current block
                        // and continue after it with the same marks.
                        self.flush(run, ctx);
                        self.block(child_el, ctx);
                    } else {
                        self.inline(child_el, run, &marks, ctx);
                    }
                }
                _ => {}
            }
        }
    }

    fn image(&mut self, el: ElementRef<'_>) {
        let Some(src) = el.value().attr("src").map(str::trim) else {
            return;
        };
        if src.is_empty() || src.starts_with("data:") {
            return;
        }
        let key = self.keys.next_key();
        self.out.push(Converted::Image {
            key,
            url: src.to_string(),
            alt: el.value().attr("alt").unwrap_or_default().to_string(),
        });
    }

    fn flush(&mut self, run: &mut Run, ctx: &Context) {
        let taken = std::mem::take(run);
        if !taken.has_text() {
            return;
        }

        let mut spans = taken.spans;
        if let Some((first, _)) = spans.first_mut() {
            *first = first.trim_start().to_string();
        }
        if let Some((last, _)) = spans.last_mut() {
            *last = last.trim_end().to_string();
        }
        spans.retain(|(text, _)| !text.is_empty());

        // Only keep definitions some span still uses
        let mark_defs: Vec<MarkDef> = taken
            .mark_defs
            .into_iter()
            .filter(|def| spans.iter().any(|(_, marks)| marks.contains(&def.key)))
            .collect();

        let key = self.keys.next_key();
        let children = spans
            .into_iter()
            .map(|(text, marks)| Span {
                key: self.keys.next_key(),
                text,
                marks,
            })
            .collect();

        let (list_item, level) = match ctx.list {
            Some((kind, level)) => (Some(kind), Some(level)),
            None => (None, None),
        };

        self.out.push(Converted::Block(Block::Text(TextBlock {
            key,
            style: ctx.style.to_string(),
            list_item,
            level,
            mark_defs,
            children,
        })));
    }
}

fn push_mark(marks: &mut Vec<String>, mark: &str) {
    if !marks.iter().any(|m| m == mark) {
        marks.push(mark.to_string());
    }
}

fn trim_trailing_space(run: &mut Run) {
    if let Some((last, _)) = run.spans.last_mut() {
        while last.ends_with(' ') {
            last.pop();
        }
    }
}

fn heading_style(name: &str) -> &'static str {
    match name {
        "h1" => "h1",
        "h2" => "h2",
        "h3" => "h3",
        "h4" => "h4",
        "h5" => "h5",
        _ => "h6",
    }
}

/// Elements that end the current text block
fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "ul"
            | "ol"
            | "li"
            | "blockquote"
            | "img"
            | "hr"
            | "figure"
            | "figcaption"
            | "div"
            | "section"
            | "article"
            | "header"
            | "footer"
            | "aside"
            | "main"
            | "pre"
    )
}
