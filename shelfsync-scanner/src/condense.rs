// Page condensing: reduces raw HTML to the parts the extraction service needs
use crate::extraction::PagePurpose;
use scraper::{ElementRef, Html, Selector};

pub const DEFAULT_MAX_CHARS: usize = 60_000;

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "svg", "template", "iframe"];

const NAVIGATION_SELECTORS: &[&str] = &[
    "nav",
    "header",
    "[class*='menu']",
    "[class*='catalog']",
    "[class*='categor']",
    "[id*='menu']",
];

const LISTING_SELECTORS: &[&str] = &[
    "[class*='product']",
    "[class*='item']",
    "[class*='card']",
    "[class*='categor']",
    "[class*='pagination']",
];

/// Condense an HTML document for one extraction purpose.
///
/// JSON-LD blocks are always kept since storefronts often publish structured
/// product data there. What else survives depends on `purpose`: link lists
/// for category trees and listings, visible text for product detail pages.
/// The output never exceeds `max_chars` characters.
pub fn condense_page(html: &str, purpose: PagePurpose, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let mut sections: Vec<String> = Vec::new();

    if let Some(title) = first_text(&document, "title") {
        sections.push(format!("TITLE: {}", title));
    }

    let json_ld = json_ld_blocks(&document);
    if !json_ld.is_empty() {
        sections.push(format!("JSON-LD:\n{}", json_ld.join("\n")));
    }

    match purpose {
        PagePurpose::CategoryTree => {
            let links = links_within(&document, NAVIGATION_SELECTORS);
            let links = if links.is_empty() {
                all_links(&document)
            } else {
                links
            };
            sections.push(format!("LINKS:\n{}", links.join("\n")));
        }
        PagePurpose::CategoryListing => {
            let mut links = links_within(&document, LISTING_SELECTORS);
            if links.is_empty() {
                links = all_links(&document);
            }
            sections.push(format!("LINKS:\n{}", links.join("\n")));
            if let Some(text) = body_text(&document) {
                sections.push(format!("TEXT:\n{}", text));
            }
        }
        PagePurpose::ProductDetail => {
            if let Some(h1) = first_text(&document, "h1") {
                sections.push(format!("HEADING: {}", h1));
            }
            if let Some(text) = body_text(&document) {
                sections.push(format!("TEXT:\n{}", text));
            }
        }
    }

    truncate_chars(&sections.join("\n\n"), max_chars)
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    document
        .select(&sel)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn json_ld_blocks(document: &Html) -> Vec<String> {
    let Some(sel) = selector("script[type='application/ld+json']") else {
        return Vec::new();
    };
    document
        .select(&sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn link_line(el: ElementRef<'_>) -> Option<String> {
    let href = el.value().attr("href")?.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }
    let text = visible_text(el);
    let label = if text.is_empty() {
        el.value().attr("title").unwrap_or("").trim().to_string()
    } else {
        text
    };
    Some(format!("{} -> {}", label, href))
}

fn push_unique(lines: &mut Vec<String>, line: String) {
    if !lines.contains(&line) {
        lines.push(line);
    }
}

fn links_within(document: &Html, containers: &[&str]) -> Vec<String> {
    let Some(anchor) = selector("a[href]") else {
        return Vec::new();
    };
    let mut lines = Vec::new();
    for css in containers {
        let Some(sel) = selector(css) else { continue };
        for container in document.select(&sel) {
            for a in container.select(&anchor) {
                if let Some(line) = link_line(a) {
                    push_unique(&mut lines, line);
                }
            }
        }
    }
    lines
}

fn all_links(document: &Html) -> Vec<String> {
    let Some(anchor) = selector("a[href]") else {
        return Vec::new();
    };
    let mut lines = Vec::new();
    for a in document.select(&anchor) {
        if let Some(line) = link_line(a) {
            push_unique(&mut lines, line);
        }
    }
    lines
}

fn body_text(document: &Html) -> Option<String> {
    let sel = selector("body")?;
    let body = document.select(&sel).next()?;
    let text = visible_text(body);
    if text.is_empty() { None } else { Some(text) }
}

/// Text of an element with script/style content left out.
fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| SKIPPED_TAGS.contains(&e.name()))
                .unwrap_or(false)
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
