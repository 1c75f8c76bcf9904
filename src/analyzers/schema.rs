use super::{Confidence, Evidence, FactorId, FactorScore, Scorecard, Severity};
use crate::extract::{SignalBundle, StructuredEntry};

/// Types we know how to judge, with the properties each must carry.
const EXPECTED_TYPES: &[(&str, &[&str])] = &[
    ("Organization", &["name", "url"]),
    ("LocalBusiness", &["name", "address"]),
    ("Article", &["headline"]),
    ("NewsArticle", &["headline"]),
    ("BlogPosting", &["headline"]),
    ("Product", &["name"]),
    ("WebSite", &["name", "url"]),
    ("WebPage", &["name"]),
    ("FAQPage", &["mainEntity"]),
    ("BreadcrumbList", &["itemListElement"]),
    ("Person", &["name"]),
    ("Event", &["name", "startDate"]),
    ("Recipe", &["name"]),
    ("HowTo", &["name", "step"]),
];

/// Credit for a well-formed entry whose type is outside the table.
const UNRECOGNIZED_CREDIT: f64 = 0.5;
const MALFORMED_PENALTY: f64 = 10.0;

enum Verdict {
    Valid,
    MissingProperties(Vec<&'static str>),
    Unrecognized,
}

fn judge(entry: &StructuredEntry) -> Verdict {
    let mut known = EXPECTED_TYPES.iter().filter(|(ty, _)| entry.has_type(ty)).peekable();
    if known.peek().is_none() {
        return Verdict::Unrecognized;
    }
    let missing: Vec<&'static str> = known
        .flat_map(|(_, required)| required.iter().copied())
        .filter(|prop| !entry.has_field(prop))
        .collect();
    if missing.is_empty() {
        Verdict::Valid
    } else {
        Verdict::MissingProperties(missing)
    }
}

pub fn analyze(bundle: &SignalBundle) -> FactorScore {
    let mut card = Scorecard::default();

    for (i, w) in bundle.warnings.iter().enumerate() {
        card.flag(
            Severity::Warning,
            "schema-malformed",
            format!("structured-data block {}: {}", w.block, w.message),
            Evidence::ExtractionWarning(i),
        );
    }

    if bundle.structured.is_empty() {
        card.flag(
            Severity::Critical,
            "schema-missing",
            "no structured-data entries on the page",
            Evidence::Document,
        );
        return card.finish(FactorId::Schema, Confidence::Full);
    }

    let mut credit = 0.0;
    for (i, entry) in bundle.structured.iter().enumerate() {
        match judge(entry) {
            Verdict::Valid => credit += 1.0,
            Verdict::MissingProperties(missing) => card.flag(
                Severity::Warning,
                "schema-missing-property",
                format!("{} lacks {}", entry.types.join("/"), missing.join(", ")),
                Evidence::StructuredData(i),
            ),
            Verdict::Unrecognized => {
                credit += UNRECOGNIZED_CREDIT;
                card.flag(
                    Severity::Info,
                    "schema-unrecognized-type",
                    format!("{} is not a type we validate", entry.types.join("/")),
                    Evidence::StructuredData(i),
                );
            }
        }
    }

    let coverage = 100.0 * credit / bundle.structured.len() as f64;
    card.award((coverage - MALFORMED_PENALTY * bundle.warnings.len() as f64).max(0.0));
    card.finish(FactorId::Schema, Confidence::Full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::fixtures::{bundle, fixture};

    fn ld(json: &str) -> String {
        format!(r#"<script type="application/ld+json">{}</script>"#, json)
    }

    #[test]
    fn one_valid_block_has_no_findings() {
        let s = analyze(&fixture("article"));
        assert_eq!(s.score, 100.0);
        assert!(s.findings.is_empty(), "{:?}", s.findings);
    }

    #[test]
    fn nothing_scores_zero() {
        let s = analyze(&bundle("<p>no markup here at all</p>"));
        assert_eq!(s.score, 0.0);
        assert!(s.has_finding("schema-missing"));
    }

    #[test]
    fn missing_required_property() {
        let html = ld(r#"{"@context":"https://schema.org","@type":"Event","name":"Launch"}"#)
            + &ld(r#"{"@type":"Organization","name":"Acme","url":"https://acme.test"}"#);
        let s = analyze(&bundle(&html));
        assert_eq!(s.score, 50.0);
        assert!(s.findings[0].message.contains("startDate"));
    }

    #[test]
    fn malformed_block_deducts_but_does_not_abort() {
        let html = ld(r#"{"@type":"Person","name":"Ada"}"#) + &ld("{not json");
        let s = analyze(&bundle(&html));
        assert_eq!(s.score, 90.0);
        assert!(s.has_finding("schema-malformed"));
        assert_eq!(s.findings[0].evidence, Evidence::ExtractionWarning(0));
    }

    #[test]
    fn unknown_type_gets_partial_credit() {
        let s = analyze(&bundle(&ld(r#"{"@type":"Thing","name":"x"}"#)));
        assert_eq!(s.score, 50.0);
        assert!(s.has_finding("schema-unrecognized-type"));
    }
}
