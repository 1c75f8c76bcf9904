use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

use super::blocks::collapse_whitespace;

static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkKind {
    Internal,
    External,
    Mailto,
    Tel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub href: String,
    pub text: String,
    pub kind: LinkKind,
    pub nofollow: bool,
}

impl Link {
    /// Path of an http(s) link, lowercased. Empty for mailto/tel.
    pub fn path(&self) -> String {
        Url::parse(&self.href)
            .map(|u| u.path().to_lowercase())
            .unwrap_or_default()
    }

    pub fn is_https(&self) -> bool {
        self.href.starts_with("https://")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub src: String,
    pub alt: Option<String>,
    pub responsive: bool,
}

impl Image {
    pub fn has_alt(&self) -> bool {
        self.alt.is_some()
    }
}

/// Anchor inventory resolved against `base`. Fragment-only and
/// `javascript:` anchors are skipped.
pub fn links(doc: &Html, base: &Url) -> Vec<Link> {
    doc.select(&ANCHOR_SEL)
        .filter_map(|el| {
            let raw = el.value().attr("href")?.trim();
            if raw.is_empty() || raw.starts_with('#') {
                return None;
            }
            let resolved = base.join(raw).ok()?;
            let kind = match resolved.scheme() {
                "mailto" => LinkKind::Mailto,
                "tel" => LinkKind::Tel,
                "http" | "https" if same_site(&resolved, base) => LinkKind::Internal,
                "http" | "https" => LinkKind::External,
                _ => return None,
            };
            Some(Link {
                href: resolved.to_string(),
                text: anchor_text(el),
                kind,
                nofollow: el
                    .value()
                    .attr("rel")
                    .is_some_and(|r| r.split_whitespace().any(|t| t.eq_ignore_ascii_case("nofollow"))),
            })
        })
        .collect()
}

pub fn images(doc: &Html, base: &Url) -> Vec<Image> {
    doc.select(&IMG_SEL)
        .map(|el| {
            let v = el.value();
            let src = v
                .attr("src")
                .map(|s| base.join(s.trim()).map(|u| u.to_string()).unwrap_or_else(|_| s.to_string()))
                .unwrap_or_default();
            let in_picture = el
                .parent()
                .and_then(ElementRef::wrap)
                .is_some_and(|p| p.value().name() == "picture");
            Image {
                src,
                alt: v.attr("alt").map(|a| a.trim().to_string()),
                responsive: v.attr("srcset").is_some() || in_picture,
            }
        })
        .collect()
}

/// Hosts match ignoring a leading `www.`.
fn same_site(a: &Url, b: &Url) -> bool {
    let strip = |u: &Url| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase());
    strip(a).is_some() && strip(a) == strip(b)
}

/// Visible text, falling back to `aria-label` or an image's alt text.
fn anchor_text(el: ElementRef) -> String {
    let text = collapse_whitespace(&el.text().collect::<String>());
    if !text.is_empty() {
        return text;
    }
    if let Some(label) = el.value().attr("aria-label") {
        return label.trim().to_string();
    }
    el.select(&IMG_SEL)
        .find_map(|img| img.value().attr("alt"))
        .map(|a| a.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.example.com/blog/post").unwrap()
    }

    #[test]
    fn classifies_links() {
        let doc = Html::parse_document(
            r##"<body>
            <a href="/about">About us</a>
            <a href="https://example.com/contact">Contact</a>
            <a href="https://other.org/paper" rel="external nofollow">Paper</a>
            <a href="mailto:hi@example.com">Email</a>
            <a href="tel:+15551234">Call</a>
            <a href="#top">Top</a>
            <a href="javascript:void(0)">Noop</a>
            <a href="/home" aria-label="Home"></a>
            </body>"##,
        );
        let l = links(&doc, &base());
        let kinds: Vec<LinkKind> = l.iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LinkKind::Internal,
                LinkKind::Internal,
                LinkKind::External,
                LinkKind::Mailto,
                LinkKind::Tel,
                LinkKind::Internal,
            ]
        );
        assert!(l[2].nofollow);
        assert_eq!(l[0].href, "https://www.example.com/about");
        assert_eq!(l[0].path(), "/about");
        assert_eq!(l[5].text, "Home");
    }

    #[test]
    fn image_inventory() {
        let doc = Html::parse_document(
            r#"<body><img src="/a.png" alt="A chart"><img src="b.png">
            <picture><img src="/c.png" alt=""></picture></body>"#,
        );
        let imgs = images(&doc, &base());
        assert_eq!(imgs.len(), 3);
        assert!(imgs[0].has_alt());
        assert!(!imgs[1].has_alt());
        assert_eq!(imgs[1].src, "https://www.example.com/blog/b.png");
        assert!(imgs[2].responsive);
        assert_eq!(imgs[2].alt.as_deref(), Some(""));
    }
}
