//! Main-text extraction from fetched pages.
//!
//! The passage is the largest contiguous run of paragraph-level text that
//! shares a parent element, ignoring navigation, headers, footers, forms and
//! anything whose class or id marks it as boilerplate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};

use crate::tools::dates::parse_published;

const SKIP_TAGS: [&str; 12] = [
    "script", "style", "noscript", "iframe", "svg", "head", "nav", "header", "footer", "aside",
    "form", "button",
];

const BOILERPLATE_MARKERS: [&str; 12] = [
    "nav", "menu", "footer", "header", "sidebar", "comment", "cookie", "banner", "advert",
    "promo", "share", "related",
];

const TEXT_BLOCKS: &str = "p, blockquote, pre, li, dd";

const DATE_META: [&str; 6] = [
    r#"meta[property="article:published_time"]"#,
    r#"meta[name="article:published_time"]"#,
    r#"meta[itemprop="datePublished"]"#,
    r#"meta[name="date"]"#,
    r#"meta[name="pubdate"]"#,
    r#"meta[name="DC.date.issued"]"#,
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub text: String,
    pub published_at: Option<DateTime<Utc>>,
}

pub fn extract_main_text(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);

    let mut text = largest_block(&document);
    if text.is_empty() {
        text = visible_body_text(&document);
    }

    ExtractedPage {
        title: page_title(&document),
        text,
        published_at: published_date(&document),
    }
}

/// Collapses runs of whitespace while keeping paragraph breaks.
pub fn normalize_text(text: &str) -> String {
    text.split("\n\n")
        .map(|para| para.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|para| !para.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Cuts `text` to at most `max_chars` characters, preferring the last
/// sentence end in the second half of the window.
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    let Some((limit, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let window = &text[..limit];

    let search_start = floor_char_boundary(window, window.len() / 2);
    let tail = &window[search_start..];
    let endings = [". ", "! ", "? ", ".\n", "!\n", "?\n"];
    let cut = endings
        .iter()
        .filter_map(|ending| tail.rfind(ending).map(|pos| pos + 1))
        .max();

    match cut {
        Some(pos) => window[..search_start + pos].trim_end().to_string(),
        None => window.trim_end().to_string(),
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn largest_block(document: &Html) -> String {
    let Ok(blocks) = Selector::parse(TEXT_BLOCKS) else {
        return String::new();
    };

    // paragraphs grouped by parent element, in document order
    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut slots = HashMap::new();
    for element in document.select(&blocks) {
        if is_hidden(&element) {
            continue;
        }
        let text = collapse(&element.text().collect::<String>());
        if text.is_empty() {
            continue;
        }
        let Some(parent) = element.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let slot = *slots.entry(parent.id()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(text);
    }

    let mut best: Option<(usize, &Vec<String>)> = None;
    for paragraphs in &groups {
        let size: usize = paragraphs.iter().map(|p| p.chars().count()).sum();
        if best.map(|(best_size, _)| size > best_size).unwrap_or(true) {
            best = Some((size, paragraphs));
        }
    }

    best.map(|(_, paragraphs)| paragraphs.join("\n\n"))
        .unwrap_or_default()
}

/// Whether the element sits under a skipped tag or a boilerplate container.
fn is_hidden(element: &ElementRef<'_>) -> bool {
    if is_boilerplate(element) {
        return true;
    }
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| is_boilerplate(&ancestor))
}

fn is_boilerplate(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if SKIP_TAGS.contains(&value.name()) {
        return true;
    }
    if value.attr("hidden").is_some() || value.attr("aria-hidden") == Some("true") {
        return true;
    }
    let role = value.attr("role").unwrap_or("");
    if matches!(role, "navigation" | "banner" | "contentinfo") {
        return true;
    }

    let marker_text = format!(
        "{} {}",
        value.attr("class").unwrap_or(""),
        value.attr("id").unwrap_or("")
    )
    .to_lowercase();
    marker_text
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .any(|token| BOILERPLATE_MARKERS.contains(&token))
}

/// Fallback for pages without paragraph markup: every visible text node in
/// the body.
fn visible_body_text(document: &Html) -> String {
    let Ok(body) = Selector::parse("body") else {
        return String::new();
    };
    let mut parts = Vec::new();
    if let Some(root) = document.select(&body).next() {
        collect_visible(root, &mut parts);
    }
    parts.join("\n\n")
}

fn collect_visible(element: ElementRef<'_>, parts: &mut Vec<String>) {
    use scraper::node::Node;

    if is_boilerplate(&element) {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed = collapse(text);
                if !collapsed.is_empty() {
                    parts.push(collapsed);
                }
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_visible(child_element, parts);
                }
            }
            _ => {}
        }
    }
}

fn page_title(document: &Html) -> Option<String> {
    let og = Selector::parse(r#"meta[property="og:title"]"#).ok()?;
    if let Some(title) = document
        .select(&og)
        .filter_map(|m| m.value().attr("content"))
        .map(collapse)
        .find(|t| !t.is_empty())
    {
        return Some(title);
    }

    let title = Selector::parse("title").ok()?;
    document
        .select(&title)
        .map(|t| collapse(&t.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn published_date(document: &Html) -> Option<DateTime<Utc>> {
    for css in DATE_META {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        if let Some(date) = document
            .select(&selector)
            .filter_map(|m| m.value().attr("content"))
            .find_map(parse_published)
        {
            return Some(date);
        }
    }

    let time = Selector::parse("time[datetime]").ok()?;
    document
        .select(&time)
        .filter_map(|t| t.value().attr("datetime"))
        .find_map(parse_published)
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
