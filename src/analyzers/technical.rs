use super::{Confidence, Evidence, FactorId, FactorScore, Scorecard, Severity};
use crate::adapters::{AdapterResult, ValidationReport};
use crate::extract::{RobotsVerdict, SignalBundle};

const TITLE_CHARS: std::ops::RangeInclusive<usize> = 10..=70;
const DESCRIPTION_CHARS: std::ops::RangeInclusive<usize> = 50..=170;
const VALIDITY_POINTS: f64 = 20.0;
const POINTS_PER_ERROR: f64 = 2.0;

pub fn analyze(bundle: &SignalBundle, validation: &AdapterResult<ValidationReport>) -> FactorScore {
    let mut card = Scorecard::default();

    match bundle.title.as_deref() {
        Some(t) if TITLE_CHARS.contains(&t.chars().count()) => card.award(12.0),
        Some(t) => {
            card.award(6.0);
            card.flag(
                Severity::Warning,
                "title-length",
                format!("title is {} characters, aim for 10-70", t.chars().count()),
                Evidence::Meta("title".into()),
            );
        }
        None => card.flag(Severity::Critical, "title-missing", "page has no <title>", Evidence::Meta("title".into())),
    }

    match bundle.meta("description") {
        Some(d) if DESCRIPTION_CHARS.contains(&d.chars().count()) => card.award(12.0),
        Some(d) => {
            card.award(6.0);
            card.flag(
                Severity::Warning,
                "description-length",
                format!("meta description is {} characters, aim for 50-170", d.chars().count()),
                Evidence::Meta("description".into()),
            );
        }
        None => card.flag(
            Severity::Warning,
            "description-missing",
            "no meta description",
            Evidence::Meta("description".into()),
        ),
    }

    match &bundle.canonical {
        Some(_) => card.award(8.0),
        None => card.flag(Severity::Warning, "canonical-missing", "no canonical link", Evidence::Document),
    }

    match &bundle.language {
        Some(_) => card.award(8.0),
        None => card.flag(Severity::Warning, "lang-missing", "no declared document language", Evidence::Document),
    }

    if bundle.is_noindex() {
        card.flag(
            Severity::Critical,
            "noindex",
            "page asks search engines not to index it",
            Evidence::Meta("robots".into()),
        );
    } else {
        card.award(12.0);
    }

    match bundle.robots {
        RobotsVerdict::Allowed => card.award(8.0),
        RobotsVerdict::Disallowed => card.flag(
            Severity::Critical,
            "robots-disallowed",
            "robots.txt disallows this page for all crawlers",
            Evidence::Robots,
        ),
        RobotsVerdict::Unknown => {
            card.award(4.0);
            card.flag(Severity::Info, "robots-missing", "robots.txt could not be read", Evidence::Robots);
        }
    }

    match &bundle.sitemap {
        Some(s) if s.entries > 0 => card.award(8.0),
        Some(_) => {
            card.award(4.0);
            card.flag(Severity::Info, "sitemap-empty", "sitemap lists no entries", Evidence::Sitemap);
        }
        None => card.flag(Severity::Warning, "sitemap-missing", "no sitemap found", Evidence::Sitemap),
    }

    if bundle.transport.is_https {
        card.award(12.0);
    } else {
        card.flag(Severity::Critical, "not-https", "page is served without TLS", Evidence::Transport);
    }

    let missing = match validation {
        AdapterResult::Value(report) if report.is_valid => {
            card.award(VALIDITY_POINTS);
            0
        }
        AdapterResult::Value(report) => {
            let n = report.errors.len();
            card.award((VALIDITY_POINTS - POINTS_PER_ERROR * n as f64).max(0.0));
            let first = report.errors.first().map(|e| e.message.as_str()).unwrap_or("");
            card.flag(
                Severity::Warning,
                "html-invalid",
                format!("{} markup error(s), first: {}", n, first),
                Evidence::Adapter("validator".into()),
            );
            0
        }
        // Validity is not credited without a validator answer.
        other => {
            card.flag(
                Severity::Info,
                "validator-unavailable",
                format!("markup validity unknown: {}", other.reason().unwrap_or("no answer")),
                Evidence::Adapter("validator".into()),
            );
            1
        }
    };

    card.finish(FactorId::Technical, Confidence::derive(1, missing, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ValidatorMessage;
    use crate::analyzers::fixtures::fixture;

    fn valid() -> AdapterResult<ValidationReport> {
        AdapterResult::Value(ValidationReport { is_valid: true, errors: Vec::new(), warnings: 0 })
    }

    #[test]
    fn full_marks_with_valid_markup() {
        let s = analyze(&fixture("article"), &valid());
        assert_eq!(s.confidence, Confidence::Full);
        assert_eq!(s.score, 100.0);
        assert!(s.findings.is_empty(), "{:?}", s.findings);
    }

    #[test]
    fn validator_timeout_degrades_without_assuming_valid() {
        let bundle = fixture("article");
        let timed_out = AdapterResult::Unavailable("timed out after 30000 ms".into());
        let s = analyze(&bundle, &timed_out);
        assert_eq!(s.confidence, Confidence::Degraded);
        assert!(s.has_finding("validator-unavailable"));
        assert!(s.score < analyze(&bundle, &valid()).score);
        assert_eq!(s.score, 100.0 - VALIDITY_POINTS);
    }

    #[test]
    fn invalid_markup_deducts_per_error() {
        let report = ValidationReport {
            is_valid: false,
            errors: vec![
                ValidatorMessage { message: "Stray end tag".into(), line: Some(3) },
                ValidatorMessage { message: "Duplicate id".into(), line: Some(9) },
            ],
            warnings: 0,
        };
        let s = analyze(&fixture("article"), &AdapterResult::Value(report));
        assert_eq!(s.score, 96.0);
        assert_eq!(s.confidence, Confidence::Full);
        assert!(s.has_finding("html-invalid"));
    }

    #[test]
    fn bare_page_flags_basics() {
        let b = crate::analyzers::fixtures::bundle("<html><body><p>nothing here at all really</p></body></html>");
        let s = analyze(&b, &valid());
        assert!(s.has_finding("title-missing"));
        assert!(s.has_finding("lang-missing"));
        assert_eq!(s.findings[0].severity, Severity::Critical);
    }
}
