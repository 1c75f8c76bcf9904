//! Trust signals read from page behavior: what the page links to, how it
//! attributes itself, and how it connects into its own site. Nothing here
//! looks at which domain, TLD or industry the page belongs to.

use super::{Confidence, Evidence, FactorId, FactorScore, Scorecard, Severity};
use crate::extract::{Link, LinkKind, SignalBundle};

const CONTACT_HINTS: &[&str] = &["contact", "support", "get-in-touch"];
const ABOUT_HINTS: &[&str] = &["about", "team", "who-we-are"];
const PRIVACY_HINTS: &[&str] = &["privacy", "terms", "legal", "cookie"];
const VAGUE_ANCHORS: &[&str] = &["click here", "here", "read more", "more", "link", "this"];
const MIN_INTERNAL_LINKS: usize = 2;

fn points_to(link: &Link, hints: &[&str]) -> bool {
    let path = link.path();
    let text = link.text.to_lowercase();
    hints.iter().any(|h| path.contains(h) || text.contains(h))
}

fn internal(bundle: &SignalBundle) -> impl Iterator<Item = &Link> {
    bundle.links.iter().filter(|l| l.kind == LinkKind::Internal)
}

pub fn analyze(bundle: &SignalBundle) -> FactorScore {
    let mut card = Scorecard::default();

    let reachable = bundle.links.iter().any(|l| matches!(l.kind, LinkKind::Mailto | LinkKind::Tel));
    if reachable || internal(bundle).any(|l| points_to(l, CONTACT_HINTS)) {
        card.award(15.0);
    } else {
        card.flag(Severity::Warning, "contact-missing", "no contact page, email or phone link", Evidence::Document);
    }

    if internal(bundle).any(|l| points_to(l, ABOUT_HINTS)) {
        card.award(15.0);
    } else {
        card.flag(Severity::Warning, "about-missing", "no about page link", Evidence::Document);
    }

    if internal(bundle).any(|l| points_to(l, PRIVACY_HINTS)) {
        card.award(10.0);
    } else {
        card.flag(Severity::Info, "policy-missing", "no privacy or terms page link", Evidence::Document);
    }

    score_outbound(bundle, &mut card);

    let attributed = ["author", "publisher", "article:author"].iter().any(|k| bundle.meta(k).is_some())
        || bundle.structured.iter().any(|e| e.has_field("author") || e.has_field("publisher"))
        || bundle.structured.iter().any(|e| e.has_type("Organization") || e.has_type("Person"));
    if attributed {
        card.award(15.0);
    } else {
        card.flag(
            Severity::Warning,
            "attribution-missing",
            "no author or publisher attribution",
            Evidence::Document,
        );
    }

    let internal_count = internal(bundle).count();
    if internal_count >= MIN_INTERNAL_LINKS {
        card.award(10.0);
    } else {
        card.award(5.0 * internal_count as f64);
        card.flag(
            Severity::Info,
            "weak-internal-linking",
            format!("{} internal link(s)", internal_count),
            Evidence::Document,
        );
    }

    if bundle.transport.is_https {
        card.award(5.0);
    } else {
        card.flag(Severity::Warning, "not-https", "page is served without TLS", Evidence::Transport);
    }

    let same_as = bundle.structured.iter().position(|e| e.has_field("sameAs"));
    match same_as {
        Some(_) => card.award(10.0),
        None => card.flag(
            Severity::Info,
            "same-as-missing",
            "structured data links no external identity profiles (sameAs)",
            Evidence::Document,
        ),
    }

    card.finish(FactorId::Authority, Confidence::Full)
}

/// Quality of outbound links: served over TLS and labeled descriptively.
/// A page with no outbound links earns both shares.
fn score_outbound(bundle: &SignalBundle, card: &mut Scorecard) {
    let outbound: Vec<(usize, &Link)> = bundle
        .links
        .iter()
        .enumerate()
        .filter(|(_, l)| l.kind == LinkKind::External)
        .collect();
    if outbound.is_empty() {
        card.award(20.0);
        return;
    }
    let n = outbound.len() as f64;

    let insecure: Vec<usize> = outbound.iter().filter(|(_, l)| !l.is_https()).map(|(i, _)| *i).collect();
    card.award(10.0 * (n - insecure.len() as f64) / n);
    if let Some(first) = insecure.first() {
        card.flag(
            Severity::Info,
            "insecure-outbound",
            format!("{} outbound link(s) use plain http", insecure.len()),
            Evidence::Link(*first),
        );
    }

    let vague: Vec<usize> = outbound
        .iter()
        .filter(|(_, l)| {
            let t = l.text.trim().to_lowercase();
            t.is_empty() || VAGUE_ANCHORS.contains(&t.as_str())
        })
        .map(|(i, _)| *i)
        .collect();
    card.award(10.0 * (n - vague.len() as f64) / n);
    if let Some(first) = vague.first() {
        card.flag(
            Severity::Info,
            "vague-anchor-text",
            format!("{} outbound link(s) with non-descriptive text", vague.len()),
            Evidence::Link(*first),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::fixtures::{bundle, fixture, site};
    use crate::extract::extract;

    #[test]
    fn article_is_trustworthy() {
        let s = analyze(&fixture("article"));
        assert!(!s.has_finding("contact-missing"), "{:?}", s.findings);
        assert!(!s.has_finding("about-missing"));
        assert!(!s.has_finding("attribution-missing"));
        assert!(s.score >= 80.0, "score {}", s.score);
    }

    #[test]
    fn registered_domain_does_not_matter() {
        let html = std::fs::read_to_string("tests/fixtures/article.html").unwrap();
        let com = extract(&site("https://example.com/", &html));
        let law = extract(&site("https://example.law/", &html));
        assert_eq!(analyze(&com).score, analyze(&law).score);
    }

    #[test]
    fn vague_and_insecure_outbound() {
        let b = bundle(
            r#"<a href="http://other.test/a">click here</a><a href="https://other.test/b">Field guide to widgets</a>"#,
        );
        let s = analyze(&b);
        assert!(s.has_finding("insecure-outbound"));
        assert!(s.has_finding("vague-anchor-text"));
        assert!(s.has_finding("contact-missing"));
    }

    #[test]
    fn mailto_counts_as_contact() {
        let s = analyze(&bundle(r#"<a href="mailto:hello@example.com">Email us</a>"#));
        assert!(!s.has_finding("contact-missing"));
    }
}
