//! Page extraction: datasheet link + normalized specifications fragment.
//!
//! Anchors are matched by case-sensitive substring of their visible text
//! ("Datasheet", "Specification"). That contract is what existing monitored
//! pages rely on, so it is kept literal even though it is phrasing-fragile.
//!
//! Known limitation: text nodes are trimmed and emitted on their own line,
//! so whitespace between inline siblings is not significant.
//! `<b>Max</b> 5 V` and `<b>Max</b>5 V` normalize to the same output.

use html_escape::{encode_double_quoted_attribute, encode_text};
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::error::{ExtractionFailure, MonitorError};

const DATASHEET_TEXT: &str = "Datasheet";
const SPECS_TAB_TEXT: &str = "Specification";
const INDENT: &str = "  ";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// What a product page yields before any download happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub download_url: String,
    pub spec_html: String,
}

/// Extract the absolute datasheet URL and the normalized specs fragment.
pub fn extract_page(page_url: &Url, body: &str) -> Result<ExtractedPage, MonitorError> {
    if !body.contains('<') {
        return Err(MonitorError::Parse {
            url: page_url.to_string(),
            reason: "response body contains no markup".into(),
        });
    }
    let document = Html::parse_document(body);
    let anchors = Selector::parse("a").expect("anchor selector");

    let datasheet = find_anchor(&document, &anchors, DATASHEET_TEXT)
        .and_then(|a| a.value().attr("href"))
        .ok_or_else(|| {
            MonitorError::extraction(page_url.as_str(), ExtractionFailure::DatasheetLinkNotFound)
        })?;
    let download_url = page_url
        .join(datasheet.trim())
        .map_err(|e| MonitorError::Parse {
            url: page_url.to_string(),
            reason: format!("invalid datasheet href '{}': {}", datasheet, e),
        })?;

    let tab = find_anchor(&document, &anchors, SPECS_TAB_TEXT).ok_or_else(|| {
        MonitorError::extraction(page_url.as_str(), ExtractionFailure::SpecsTabNotFound)
    })?;
    let fragment_id = tab
        .value()
        .attr("href")
        .and_then(|href| href.strip_prefix('#'))
        .ok_or_else(|| {
            MonitorError::extraction(page_url.as_str(), ExtractionFailure::SpecsHrefInvalid)
        })?;

    let content = find_by_id(&document, fragment_id).ok_or_else(|| {
        MonitorError::extraction(page_url.as_str(), ExtractionFailure::SpecsContentNotFound)
    })?;
    let spec_html = normalize_children(content);
    if spec_html.is_empty() {
        return Err(MonitorError::extraction(
            page_url.as_str(),
            ExtractionFailure::SpecsContentNotFound,
        ));
    }

    Ok(ExtractedPage {
        download_url: download_url.to_string(),
        spec_html,
    })
}

fn find_anchor<'a>(document: &'a Html, anchors: &Selector, needle: &str) -> Option<ElementRef<'a>> {
    document
        .select(anchors)
        .find(|a| a.text().collect::<String>().contains(needle))
}

fn find_by_id<'a>(document: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    if id.is_empty() {
        return None;
    }
    let escaped = id.replace('\\', "\\\\").replace('"', "\\\"");
    let selector = Selector::parse(&format!("[id=\"{}\"]", escaped)).ok()?;
    document.select(&selector).next()
}

/// Serialize an element's children in canonical form: one node per line,
/// two-space indentation, collapsed text whitespace, attributes sorted by
/// name. Elements holding only text stay on a single line.
fn normalize_children(element: ElementRef<'_>) -> String {
    let mut lines = Vec::new();
    write_children(element, 0, &mut lines);
    lines.join("\n")
}

#[cfg(test)]
fn normalize_fragment(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    normalize_children(parsed.root_element())
}

fn write_children(element: ElementRef<'_>, depth: usize, lines: &mut Vec<String>) {
    let indent = INDENT.repeat(depth);
    for child in element.children() {
        if let Some(el) = ElementRef::wrap(child) {
            write_element(el, depth, lines);
            continue;
        }
        match child.value() {
            Node::Text(text) => {
                let collapsed = collapse_whitespace(text);
                if !collapsed.is_empty() {
                    lines.push(format!("{}{}", indent, encode_text(&collapsed)));
                }
            }
            Node::Comment(comment) => {
                lines.push(format!("{}<!-- {} -->", indent, collapse_whitespace(comment)));
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, depth: usize, lines: &mut Vec<String>) {
    let indent = INDENT.repeat(depth);
    let name = element.value().name();
    let mut attrs: Vec<(&str, &str)> = element.value().attrs().collect();
    attrs.sort();

    let mut open = format!("<{}", name);
    for (key, value) in attrs {
        open.push_str(&format!(" {}=\"{}\"", key, encode_double_quoted_attribute(value)));
    }
    open.push('>');

    if VOID_ELEMENTS.contains(&name) {
        lines.push(format!("{}{}", indent, open));
        return;
    }

    match inline_text(element) {
        Some(text) => lines.push(format!("{}{}{}</{}>", indent, open, text, name)),
        None => {
            lines.push(format!("{}{}", indent, open));
            write_children(element, depth + 1, lines);
            lines.push(format!("{}</{}>", indent, name));
        }
    }
}

/// Returns the collapsed text when every child is a text node.
fn inline_text(element: ElementRef<'_>) -> Option<String> {
    let mut raw = String::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => raw.push_str(text),
            _ => return None,
        }
    }
    Some(encode_text(&collapse_whitespace(&raw)).into_owned())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}
