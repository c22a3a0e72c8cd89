//! Markdown note parsing.
//!
//! Turns raw note bytes into frontmatter, body, wiki-links and hashtags.
//! Pure transform: link targets stay as written and are resolved to note
//! ids later through the title index.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{NotedexError, Result};
use crate::text::normalize_title;

static WIKILINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!?)\[\[([^\[\]\n]+?)\]\]").expect("wikilink pattern is valid")
});

static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\p{L}\p{N}_&/#-])#(\p{L}[\p{L}\p{N}_/-]*)")
        .expect("hashtag pattern is valid")
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:https?|ftp|mailto):[^\s<>]+").expect("url pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedLink {
    /// Target title as written, anchor stripped.
    pub target: String,
    /// Heading or block anchor after `#`, if any.
    pub anchor: Option<String>,
    /// Text after `|`.
    pub display: Option<String>,
    pub is_embed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub frontmatter: serde_json::Map<String, serde_json::Value>,
    pub frontmatter_raw: Option<String>,
    pub body: String,
    /// First level-1 heading of the body.
    pub heading: Option<String>,
    /// In order of first appearance, one entry per (target, embed) pair.
    pub links: Vec<ParsedLink>,
    /// Lower-cased and sorted.
    pub tags: Vec<String>,
}

impl ParseResult {
    /// Frontmatter `title` when it is a non-blank string.
    #[must_use]
    pub fn frontmatter_title(&self) -> Option<&str> {
        self.frontmatter
            .get("title")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|title| !title.is_empty())
    }

    /// Frontmatter `tags`, accepting either a list or a comma/space separated string.
    #[must_use]
    pub fn frontmatter_tags(&self) -> Vec<String> {
        let mut out = Vec::new();
        match self.frontmatter.get("tags") {
            Some(serde_json::Value::Array(items)) => {
                for item in items {
                    if let Some(raw) = item.as_str() {
                        push_tag(&mut out, raw);
                    }
                }
            }
            Some(serde_json::Value::String(raw)) => {
                for part in raw.split(|c: char| c == ',' || c.is_whitespace()) {
                    push_tag(&mut out, part);
                }
            }
            _ => {}
        }
        out
    }
}

fn push_tag(out: &mut Vec<String>, raw: &str) {
    let tag = raw.trim().trim_start_matches('#').to_lowercase();
    if !tag.is_empty() && !out.contains(&tag) {
        out.push(tag);
    }
}

pub fn parse(source: &[u8]) -> Result<ParseResult> {
    let text = std::str::from_utf8(source)
        .map_err(|err| NotedexError::InvalidMarkdown(format!("note is not valid UTF-8: {err}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let (frontmatter, frontmatter_raw, body) = match split_frontmatter(text) {
        Some((raw, body)) => (parse_frontmatter(raw)?, Some(raw.to_string()), body),
        None => (serde_json::Map::new(), None, text),
    };

    let extracted = extract_body(body);
    Ok(ParseResult {
        frontmatter,
        frontmatter_raw,
        body: body.to_string(),
        heading: extracted.heading,
        links: extracted.links,
        tags: extracted.tags.into_iter().collect(),
    })
}

/// Returns `(raw_frontmatter, body)` when the text opens with a `---` block
/// closed by `---` or `...`. An unterminated block is treated as body text.
fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != "---" {
        return None;
    }

    let raw_start = first.len();
    let mut offset = raw_start;
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let raw = text[raw_start..offset].trim_end_matches(['\n', '\r']);
            return Some((raw, &text[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn parse_frontmatter(raw: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }
    let yaml: serde_norway::Value = serde_norway::from_str(raw)
        .map_err(|err| NotedexError::InvalidMarkdown(format!("malformed frontmatter: {err}")))?;
    let value = serde_json::to_value(yaml).map_err(|err| {
        NotedexError::InvalidMarkdown(format!("unsupported frontmatter value: {err}"))
    })?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(serde_json::Map::new()),
        other => Err(NotedexError::InvalidMarkdown(format!(
            "frontmatter must be a mapping, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "sequence",
        serde_json::Value::Object(_) => "mapping",
    }
}

#[derive(Default)]
struct BodyExtraction {
    heading: Option<String>,
    links: Vec<ParsedLink>,
    seen_links: HashSet<(String, bool)>,
    tags: BTreeSet<String>,
}

impl BodyExtraction {
    fn scan_segment(&mut self, segment: &str) {
        if segment.trim().is_empty() {
            return;
        }
        for caps in WIKILINK_RE.captures_iter(segment) {
            let is_embed = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
            let Some(inner) = caps.get(2) else { continue };
            if let Some(link) = parse_wikilink(inner.as_str(), is_embed) {
                let key = (normalize_title(&link.target), link.is_embed);
                if self.seen_links.insert(key) {
                    self.links.push(link);
                }
            }
        }

        let without_links = WIKILINK_RE.replace_all(segment, " ");
        let without_urls = URL_RE.replace_all(&without_links, " ");
        for caps in HASHTAG_RE.captures_iter(&without_urls) {
            if let Some(tag) = caps.get(1) {
                let tag = tag.as_str().trim_end_matches(['/', '-']).to_lowercase();
                if !tag.is_empty() {
                    self.tags.insert(tag);
                }
            }
        }
    }
}

fn parse_wikilink(inner: &str, is_embed: bool) -> Option<ParsedLink> {
    let (target_part, display) = match inner.split_once('|') {
        Some((target, display)) => {
            let display = display.trim();
            (target, (!display.is_empty()).then(|| display.to_string()))
        }
        None => (inner, None),
    };
    let (target, anchor) = match target_part.split_once('#') {
        Some((target, anchor)) => {
            let anchor = anchor.trim();
            (target, (!anchor.is_empty()).then(|| anchor.to_string()))
        }
        None => (target_part, None),
    };
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    Some(ParsedLink {
        target: target.to_string(),
        anchor,
        display,
        is_embed,
    })
}

/// Walks the CommonMark tree (tables, task lists, strikethrough enabled) and
/// scans text runs block by block. Code spans and code blocks never yield
/// links or tags.
fn extract_body(body: &str) -> BodyExtraction {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut out = BodyExtraction::default();
    let mut segment = String::new();
    let mut heading_text: Option<String> = None;
    let mut in_code_block = false;

    for event in Parser::new_ext(body, options) {
        match event {
            Event::Start(Tag::CodeBlock(_)) => {
                out.scan_segment(&segment);
                segment.clear();
                in_code_block = true;
            }
            Event::End(TagEnd::CodeBlock) => in_code_block = false,
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) if out.heading.is_none() => {
                heading_text = Some(String::new());
            }
            Event::Text(text) if !in_code_block => {
                segment.push_str(&text);
                if let Some(heading) = heading_text.as_mut() {
                    heading.push_str(&text);
                }
            }
            Event::Code(_) => segment.push(' '),
            Event::SoftBreak | Event::HardBreak => segment.push('\n'),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::TableCell) => {
                out.scan_segment(&segment);
                segment.clear();
                if let Some(heading) = heading_text.take() {
                    let heading = heading.trim();
                    if !heading.is_empty() {
                        out.heading = Some(heading.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    out.scan_segment(&segment);
    out
}
