//! Free-text cleanup for provider payloads
//!
//! Repairs mojibake, strips HTML markup and collapses whitespace.
//! Every step is best-effort: when a step cannot improve the text
//! the input passes through unchanged.

use chrono::Datelike;
use regex::Regex;
use scraper::{Html, Node};
use std::borrow::Cow;
use std::sync::OnceLock;
use tracing::debug;

/// Placeholder some providers return instead of a description
pub const UNAVAILABLE_SENTINEL: &str = "Description not available";

/// Earliest publication year accepted as plausible
pub const MIN_PLAUSIBLE_YEAR: i32 = 1450;

/// Elements that separate words when their tags are removed
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "br", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "tr", "td", "th", "section", "article",
];

/// Elements whose text content is never prose
const SKIPPED_ELEMENTS: &[&str] = &["script", "style"];

/// Windows-1252 code points for bytes 0x80..=0x9F (None where undefined)
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

/// Normalize a free-text field
///
/// Returns `None` for empty input, for the unavailable sentinel, or when
/// nothing is left after markup removal.
///
/// # Arguments
/// * `raw` - Text as received from a provider
pub fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == UNAVAILABLE_SENTINEL {
        return None;
    }

    let repaired = repair_mojibake(trimmed);
    let stripped = strip_markup(&repaired);
    let collapsed = collapse_whitespace(&stripped);

    if collapsed.is_empty() || collapsed == UNAVAILABLE_SENTINEL {
        debug!("Discarding text with no usable content after cleanup");
        return None;
    }

    Some(collapsed)
}

/// Normalize an optional field, treating blank values as absent
pub fn normalize_optional(raw: Option<&str>) -> Option<String> {
    raw.and_then(normalize_text)
}

/// Trim a short field (title, publisher, ...) and drop it when blank
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == v.len() {
            Some(v)
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Undo UTF-8 text that was decoded as Windows-1252 / Latin-1
///
/// The repair is kept only when the re-encoded bytes are valid UTF-8 and
/// the result carries fewer mojibake markers than the input.
pub fn repair_mojibake(text: &str) -> Cow<'_, str> {
    let before = mojibake_markers(text);
    if before == 0 {
        return Cow::Borrowed(text);
    }

    let mut bytes = Vec::with_capacity(text.len());
    for ch in text.chars() {
        match cp1252_byte(ch) {
            Some(byte) => bytes.push(byte),
            None => {
                debug!("Mojibake repair skipped: character {:?} has no single-byte form", ch);
                return Cow::Borrowed(text);
            }
        }
    }

    match String::from_utf8(bytes) {
        Ok(repaired) if mojibake_markers(&repaired) < before => Cow::Owned(repaired),
        _ => Cow::Borrowed(text),
    }
}

/// Count byte sequences typical for UTF-8 read as Windows-1252
fn mojibake_markers(text: &str) -> usize {
    let chars: Vec<char> = text.chars().collect();
    chars
        .windows(2)
        .filter(|pair| match pair[0] {
            'Ã' | 'Â' => cp1252_byte(pair[1]).map(|b| b >= 0x80).unwrap_or(false),
            'â' => pair[1] == '\u{20AC}',
            _ => false,
        })
        .count()
}

/// Map a character back to its Windows-1252 byte
fn cp1252_byte(ch: char) -> Option<u8> {
    let code = ch as u32;
    if code < 0x80 || (0xA0..=0xFF).contains(&code) {
        return Some(code as u8);
    }
    if let Some(pos) = CP1252_HIGH.iter().position(|c| *c == Some(ch)) {
        return Some(0x80 + pos as u8);
    }
    // Undefined 1252 slots survive decoding as C1 control characters
    if (0x80..=0x9F).contains(&code) {
        return Some(code as u8);
    }
    None
}

/// Remove HTML tags and resolve entities
fn strip_markup(text: &str) -> Cow<'_, str> {
    if !text.contains('<') && !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let fragment = Html::parse_fragment(text);
    let mut out = String::with_capacity(text.len());

    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Text(content) => {
                let in_skipped = node
                    .parent()
                    .and_then(|parent| parent.value().as_element().map(|e| e.name().to_string()))
                    .map(|name| SKIPPED_ELEMENTS.contains(&name.as_str()))
                    .unwrap_or(false);
                if !in_skipped {
                    out.push_str(content);
                }
            }
            Node::Element(element) if BLOCK_ELEMENTS.contains(&element.name()) => out.push(' '),
            _ => {}
        }
    }

    Cow::Owned(out)
}

/// Collapse runs of whitespace (including non-breaking spaces) to one space
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn year_regex() -> &'static Regex {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    YEAR.get_or_init(|| Regex::new(r"(?:^|\D)(\d{4})(?:\D|$)").expect("static year pattern"))
}

/// Extract a plausible publication year from free text
///
/// Accepts "2008-08-01", "c1999", "May 1999" and similar shapes.
pub fn parse_year(raw: &str) -> Option<i32> {
    let max_year = chrono::Utc::now().year() + 1;

    year_regex()
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<i32>().ok())
        .find(|year| (MIN_PLAUSIBLE_YEAR..=max_year).contains(year))
}

/// Check a numeric year against the plausible range
pub fn plausible_year(year: i32) -> Option<i32> {
    let max_year = chrono::Utc::now().year() + 1;
    (MIN_PLAUSIBLE_YEAR..=max_year).contains(&year).then_some(year)
}

/// First listed author, cut at the first list or conjunction separator
///
/// "Smith, John; Doe, Jane" becomes "Smith", "Ann & Bob" becomes "Ann".
pub fn primary_author(author: &str) -> Option<String> {
    let mut cut = author.len();
    for separator in [",", ";", "&", " and "] {
        if let Some(pos) = author.find(separator) {
            cut = cut.min(pos);
        }
    }

    let primary = author[..cut].trim();
    if primary.is_empty() {
        None
    } else {
        Some(primary.to_string())
    }
}
