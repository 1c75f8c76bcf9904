pub mod blocks;
pub mod links;
pub mod meta;
pub mod structured;

use std::collections::BTreeMap;

use scraper::Html;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::fetch::robots::RobotsTxt;
use crate::fetch::sitemap::Sitemap;
use crate::fetch::SiteResources;
use crate::units::Millis;
pub use blocks::{BlockSource, ContentMode, TextBlock};
pub use links::{Image, Link, LinkKind};
pub use meta::{ElementCensus, Heading};
pub use structured::{ExtractionWarning, StructuredEntry, StructuredFormat};

/// Response-level facts about the primary document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transport {
    pub is_https: bool,
    pub status: u16,
    pub x_robots_tag: Option<String>,
    pub response_time: Millis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RobotsVerdict {
    Allowed,
    Disallowed,
    /// No robots.txt could be read.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SitemapSummary {
    pub url: String,
    pub entries: usize,
    pub is_index: bool,
}

/// Everything extracted from one page. Built once per run and read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalBundle {
    pub url: Url,
    pub transport: Transport,
    pub byte_size: u64,
    pub title: Option<String>,
    pub language: Option<String>,
    pub canonical: Option<String>,
    pub meta: BTreeMap<String, String>,
    pub headings: Vec<Heading>,
    pub blocks: Vec<TextBlock>,
    pub content_mode: ContentMode,
    pub structured: Vec<StructuredEntry>,
    pub links: Vec<Link>,
    pub images: Vec<Image>,
    pub census: ElementCensus,
    pub robots: RobotsVerdict,
    pub sitemap: Option<SitemapSummary>,
    pub warnings: Vec<ExtractionWarning>,
}

impl SignalBundle {
    pub fn main_blocks(&self) -> impl Iterator<Item = (usize, &TextBlock)> {
        self.blocks.iter().enumerate().filter(|(_, b)| b.is_main())
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Meta robots and X-Robots-Tag directives combined, lowercased.
    pub fn robots_directives(&self) -> Vec<String> {
        let mut directives: Vec<String> = Vec::new();
        for source in [self.meta("robots"), self.transport.x_robots_tag.as_deref()]
            .into_iter()
            .flatten()
        {
            directives.extend(source.split(',').map(|d| d.trim().to_lowercase()));
        }
        directives
    }

    pub fn is_noindex(&self) -> bool {
        self.robots_directives().iter().any(|d| d == "noindex" || d == "none")
    }
}

/// Parse the fetched document and fold in the auxiliary resources.
pub fn extract(site: &SiteResources) -> SignalBundle {
    let page = &site.page;
    let base = &page.final_url;
    let html = String::from_utf8_lossy(&page.body);
    let doc = Html::parse_document(&html);

    let meta_map = meta::meta_tags(&doc);
    let (blocks, content_mode) = blocks::collect_blocks(&doc);
    let (structured, warnings) = structured::extract(&doc);

    let bundle = SignalBundle {
        url: base.clone(),
        transport: Transport {
            is_https: base.scheme() == "https",
            status: page.status,
            x_robots_tag: page.x_robots_tag.clone(),
            response_time: page.elapsed,
        },
        byte_size: page.body.len() as u64,
        title: meta::title(&doc),
        language: meta::language(&doc, &meta_map),
        canonical: meta::canonical(&doc, base),
        headings: meta::headings(&doc),
        blocks,
        content_mode,
        structured,
        links: links::links(&doc, base),
        images: links::images(&doc, base),
        census: meta::census(&doc),
        robots: robots_verdict(site.robots.as_ref(), base),
        sitemap: site.sitemap.as_ref().map(summarize_sitemap),
        warnings,
        meta: meta_map,
    };

    debug!(
        url = %bundle.url,
        blocks = bundle.blocks.len(),
        headings = bundle.headings.len(),
        structured = bundle.structured.len(),
        links = bundle.links.len(),
        mode = ?bundle.content_mode,
        "extracted signal bundle"
    );
    bundle
}

fn robots_verdict(robots: Option<&RobotsTxt>, url: &Url) -> RobotsVerdict {
    match robots {
        None => RobotsVerdict::Unknown,
        Some(r) if r.allows(url.path()) => RobotsVerdict::Allowed,
        Some(_) => RobotsVerdict::Disallowed,
    }
}

fn summarize_sitemap(s: &Sitemap) -> SitemapSummary {
    SitemapSummary {
        url: s.url.clone(),
        entries: s.locations.len(),
        is_index: s.kind == crate::fetch::sitemap::SitemapKind::Index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::fixtures::{bundle, fixture, site};

    #[test]
    fn article_fixture_bundle() {
        let b = fixture("article");
        assert_eq!(b.content_mode, ContentMode::Container);
        assert_eq!(b.language.as_deref(), Some("en"));
        assert!(b.title.is_some());
        assert_eq!(b.robots, RobotsVerdict::Allowed);
        assert_eq!(b.sitemap.as_ref().map(|s| s.entries), Some(1));
        assert_eq!(b.structured.len(), 1);
        assert!(b.warnings.is_empty());
        assert_eq!(b.links.iter().filter(|l| l.kind == LinkKind::Internal).count(), 2);
        assert!(b.main_blocks().count() >= 5);
    }

    #[test]
    fn identical_bytes_identical_bundle() {
        let html = std::fs::read_to_string("tests/fixtures/fallback.html").unwrap();
        let s = site("https://example.com/", &html);
        let a = extract(&s);
        let b = extract(&s);
        let main = |b: &SignalBundle| b.main_blocks().map(|(_, t)| t.text.clone()).collect::<Vec<_>>();
        assert_eq!(main(&a), main(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn noindex_from_meta_or_header() {
        let b = bundle(r#"<head><meta name="robots" content="noindex, follow"></head>"#);
        assert!(b.is_noindex());

        let mut s = site("https://example.com/", "<p>hi</p>");
        s.page.x_robots_tag = Some("none".into());
        assert!(extract(&s).is_noindex());
        assert!(!bundle("<p>plain</p>").is_noindex());
    }

    #[test]
    fn robots_disallow_verdict() {
        let s = site("https://example.com/admin/panel", "<p>x</p>");
        assert_eq!(extract(&s).robots, RobotsVerdict::Disallowed);
    }
}
