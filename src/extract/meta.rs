use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

use super::blocks::collapse_whitespace;

static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("head title, title").unwrap());
static META_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta[content]").unwrap());
static CANONICAL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("link[rel~=canonical][href]").unwrap());
static HTML_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("html").unwrap());
static HEADING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").unwrap());
static ALL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body *").unwrap());
static STYLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("style").unwrap());
static STYLESHEET_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("link[rel~=stylesheet]").unwrap());
static SCRIPT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script[src]").unwrap());
static HEAD_SCRIPT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("head script[src]").unwrap());

const SEMANTIC_TAGS: &[&str] = &[
    "article", "section", "nav", "main", "header", "footer", "aside", "figure",
    "figcaption", "time", "address", "details", "summary", "dl", "mark",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// Tag counts the analyzers reason about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ElementCensus {
    pub total_elements: usize,
    pub semantic_elements: usize,
    pub lists: usize,
    pub tables: usize,
    pub scripts: usize,
    /// External scripts in `<head>` without async/defer/module.
    pub blocking_scripts: usize,
    pub stylesheets: usize,
    pub media_queries: usize,
}

pub fn title(doc: &Html) -> Option<String> {
    doc.select(&TITLE_SEL)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// `name`, `property` and `http-equiv` meta tags, keys lowercased. The first
/// occurrence of a key wins.
pub fn meta_tags(doc: &Html) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    for el in doc.select(&META_SEL) {
        let v = el.value();
        let key = v
            .attr("name")
            .or_else(|| v.attr("property"))
            .or_else(|| v.attr("http-equiv"));
        if let (Some(key), Some(content)) = (key, v.attr("content")) {
            meta.entry(key.trim().to_lowercase())
                .or_insert_with(|| content.trim().to_string());
        }
    }
    meta
}

pub fn canonical(doc: &Html, base: &Url) -> Option<String> {
    doc.select(&CANONICAL_SEL)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| base.join(href.trim()).ok())
        .map(|u| u.to_string())
}

/// Declared language: `<html lang>`, else the content-language meta tag.
pub fn language(doc: &Html, meta: &BTreeMap<String, String>) -> Option<String> {
    doc.select(&HTML_SEL)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .or_else(|| meta.get("content-language").cloned())
}

pub fn headings(doc: &Html) -> Vec<Heading> {
    doc.select(&HEADING_SEL)
        .filter_map(|el| {
            let level = el.value().name()[1..].parse::<u8>().ok()?;
            let text = collapse_whitespace(&el.text().collect::<String>());
            Some(Heading { level, text })
        })
        .collect()
}

pub fn census(doc: &Html) -> ElementCensus {
    let mut c = ElementCensus::default();
    for el in doc.select(&ALL_SEL) {
        c.total_elements += 1;
        let name = el.value().name();
        if SEMANTIC_TAGS.contains(&name) {
            c.semantic_elements += 1;
        }
        match name {
            "ul" | "ol" | "dl" => c.lists += 1,
            "table" => c.tables += 1,
            _ => {}
        }
    }

    c.scripts = doc.select(&SCRIPT_SEL).count();
    c.blocking_scripts = doc.select(&HEAD_SCRIPT_SEL).filter(|el| is_blocking(*el)).count();

    let linked = doc.select(&STYLESHEET_SEL).collect::<Vec<_>>();
    c.stylesheets = linked.len();
    c.media_queries = linked
        .iter()
        .filter(|el| el.value().attr("media").is_some_and(|m| m.trim() != "all"))
        .count()
        + doc
            .select(&STYLE_SEL)
            .map(|el| el.text().collect::<String>().matches("@media").count())
            .sum::<usize>();
    c
}

fn is_blocking(el: ElementRef) -> bool {
    let v = el.value();
    v.attr("async").is_none() && v.attr("defer").is_none() && v.attr("type") != Some("module")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html><html lang="en"><head>
        <title>  Widget   Guide </title>
        <meta name="Description" content="All about widgets.">
        <meta property="og:title" content="Widgets">
        <meta name="description" content="ignored duplicate">
        <link rel="canonical" href="/guide">
        <link rel="stylesheet" href="/a.css">
        <link rel="stylesheet" href="/print.css" media="print">
        <script src="/app.js"></script>
        <script src="/late.js" defer></script>
        <style>@media (max-width: 600px) { body { font-size: 18px } }</style>
    </head><body>
        <main><h1>Widgets</h1><section><h2>Why?</h2><ul><li>x</li></ul></section></main>
        <table><tr><td>1</td></tr></table>
    </body></html>"#;

    #[test]
    fn head_signals() {
        let doc = Html::parse_document(PAGE);
        let base = Url::parse("https://example.com/docs/").unwrap();
        assert_eq!(title(&doc).as_deref(), Some("Widget Guide"));
        let meta = meta_tags(&doc);
        assert_eq!(meta.get("description").map(String::as_str), Some("All about widgets."));
        assert_eq!(meta.get("og:title").map(String::as_str), Some("Widgets"));
        assert_eq!(canonical(&doc, &base).as_deref(), Some("https://example.com/guide"));
        assert_eq!(language(&doc, &meta).as_deref(), Some("en"));
    }

    #[test]
    fn heading_levels() {
        let doc = Html::parse_document(PAGE);
        let h = headings(&doc);
        assert_eq!(h.len(), 2);
        assert_eq!(h[0], Heading { level: 1, text: "Widgets".into() });
        assert_eq!(h[1].level, 2);
    }

    #[test]
    fn element_census() {
        let doc = Html::parse_document(PAGE);
        let c = census(&doc);
        assert_eq!(c.lists, 1);
        assert_eq!(c.tables, 1);
        assert_eq!(c.scripts, 2);
        assert_eq!(c.blocking_scripts, 1);
        assert_eq!(c.stylesheets, 2);
        assert_eq!(c.media_queries, 2);
        assert!(c.semantic_elements >= 2);
    }
}
