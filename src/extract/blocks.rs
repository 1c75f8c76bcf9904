use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const MIN_BLOCK_CHARS: usize = 20;

static CONTAINER_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article, main, [role=main]").unwrap());
static BLOCK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p, li, blockquote, pre, dd, td").unwrap());

const BOILERPLATE_TAGS: &[&str] = &["nav", "header", "footer", "aside"];
const BOILERPLATE_ROLES: &[&str] = &["navigation", "contentinfo", "banner", "complementary"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockSource {
    MainContent,
    Boilerplate,
}

/// How main content was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentMode {
    /// At least one article/main container exists.
    Container,
    /// No container; generic block elements, boilerplate regions tagged.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextBlock {
    pub text: String,
    pub source: BlockSource,
}

impl TextBlock {
    pub fn is_main(&self) -> bool {
        self.source == BlockSource::MainContent
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Collect content-bearing blocks in document order, dropping short blocks
/// and duplicates of already-seen normalized text. Duplicates are counted
/// per source: boilerplate never shadows the same text in main content.
pub fn collect_blocks(doc: &Html) -> (Vec<TextBlock>, ContentMode) {
    let mode = if doc.select(&CONTAINER_SEL).next().is_some() {
        ContentMode::Container
    } else {
        ContentMode::Fallback
    };

    let mut seen: HashSet<(BlockSource, Vec<u8>)> = HashSet::new();
    let mut blocks = Vec::new();

    for el in doc.select(&BLOCK_SEL) {
        let text = collapse_whitespace(&el.text().collect::<String>());
        if text.chars().count() < MIN_BLOCK_CHARS {
            continue;
        }

        let source = match mode {
            ContentMode::Container if in_container(el) => BlockSource::MainContent,
            ContentMode::Container => BlockSource::Boilerplate,
            ContentMode::Fallback if in_boilerplate(el) => BlockSource::Boilerplate,
            ContentMode::Fallback => BlockSource::MainContent,
        };
        if !seen.insert((source, text_hash(&text))) {
            continue;
        }
        blocks.push(TextBlock { text, source });
    }

    (blocks, mode)
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hash of the lowercased, whitespace-collapsed text.
fn text_hash(text: &str) -> Vec<u8> {
    let normalized = collapse_whitespace(&text.to_lowercase());
    Sha256::digest(normalized.as_bytes()).to_vec()
}

fn in_container(el: ElementRef) -> bool {
    el.ancestors().filter_map(ElementRef::wrap).any(|a| {
        let v = a.value();
        matches!(v.name(), "article" | "main") || v.attr("role") == Some("main")
    })
}

fn in_boilerplate(el: ElementRef) -> bool {
    el.ancestors().filter_map(ElementRef::wrap).any(|a| {
        let v = a.value();
        BOILERPLATE_TAGS.contains(&v.name())
            || v.attr("role").is_some_and(|r| BOILERPLATE_ROLES.contains(&r))
    })
}
