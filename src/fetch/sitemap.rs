use anyhow::Result;
use quick_xml::events::Event;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SitemapKind {
    Urlset,
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sitemap {
    pub url: String,
    pub kind: SitemapKind,
    /// `<loc>` values of `<url>` (urlset) or `<sitemap>` (index) entries.
    pub locations: Vec<String>,
}

/// Parse a urlset or sitemapindex document. Returns `None` when the root
/// element is neither.
pub fn parse(url: &str, xml: &str) -> Result<Option<Sitemap>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut kind = None;
    let mut locations = Vec::new();
    let mut in_entry = false;
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"urlset" if kind.is_none() => kind = Some(SitemapKind::Urlset),
                b"sitemapindex" if kind.is_none() => kind = Some(SitemapKind::Index),
                b"url" | b"sitemap" => in_entry = true,
                b"loc" if in_entry => in_loc = true,
                _ => {}
            },
            Event::Text(e) if in_loc => {
                let loc = e.unescape()?.trim().to_string();
                if !loc.is_empty() {
                    locations.push(loc);
                }
            }
            Event::CData(e) if in_loc => {
                let loc = String::from_utf8_lossy(&e).trim().to_string();
                if !loc.is_empty() {
                    locations.push(loc);
                }
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"loc" => in_loc = false,
                b"url" | b"sitemap" => in_entry = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(kind.map(|kind| Sitemap {
        url: url.to_string(),
        kind,
        locations,
    }))
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|b| *b == b':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}
