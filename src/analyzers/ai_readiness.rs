use std::sync::LazyLock;

use regex::Regex;

use super::{Confidence, Evidence, FactorId, FactorScore, Scorecard, Severity};
use crate::extract::SignalBundle;

/// "X is a ...", "X are the ...", "X refers to ...".
static DEFINITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:is|are)\s+(?:a|an|the)\b|\brefers\s+to\b").unwrap());
static QUESTION_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:how|what|why|when|where|which|who|can|does|do|is|are|should)\b").unwrap()
});

const LEAD_BLOCKS: usize = 3;
const TARGET_SEMANTIC_DENSITY: f64 = 0.05;

/// How easily a machine reader can lift answers out of the page.
pub fn analyze(bundle: &SignalBundle) -> FactorScore {
    let mut card = Scorecard::default();

    let definition = bundle
        .main_blocks()
        .take(LEAD_BLOCKS)
        .find(|(_, b)| DEFINITION.is_match(&b.text));
    match definition {
        Some(_) => card.award(20.0),
        None => card.flag(
            Severity::Warning,
            "no-entity-statement",
            "opening content never states plainly what the subject is",
            Evidence::Document,
        ),
    }

    let questions: Vec<usize> = bundle
        .headings
        .iter()
        .enumerate()
        .filter(|(_, h)| h.text.ends_with('?') || QUESTION_OPENER.is_match(&h.text))
        .map(|(i, _)| i)
        .collect();
    match questions.len() {
        n if n >= 2 => card.award(20.0),
        1 => {
            card.award(10.0);
            card.flag(
                Severity::Info,
                "few-question-headings",
                "one question-style heading",
                Evidence::Heading(questions[0]),
            );
        }
        _ => card.flag(
            Severity::Info,
            "no-question-headings",
            "no headings phrased as the questions readers ask",
            Evidence::Document,
        ),
    }

    if bundle.census.lists + bundle.census.tables > 0 {
        card.award(15.0);
    } else {
        card.flag(
            Severity::Info,
            "no-structured-answers",
            "no lists or tables to extract answers from",
            Evidence::Document,
        );
    }

    let density = if bundle.census.total_elements == 0 {
        0.0
    } else {
        bundle.census.semantic_elements as f64 / bundle.census.total_elements as f64
    };
    if density >= TARGET_SEMANTIC_DENSITY {
        card.award(20.0);
    } else {
        card.award(20.0 * density / TARGET_SEMANTIC_DENSITY);
        card.flag(
            Severity::Warning,
            "low-semantic-density",
            format!(
                "{} of {} elements are semantic HTML5 elements",
                bundle.census.semantic_elements, bundle.census.total_elements
            ),
            Evidence::Document,
        );
    }

    if bundle.structured.is_empty() {
        card.flag(
            Severity::Warning,
            "no-structured-data",
            "no JSON-LD or microdata describing the page",
            Evidence::Document,
        );
    } else {
        card.award(10.0);
    }

    for key in ["og:title", "og:description"] {
        match bundle.meta(key) {
            Some(_) => card.award(5.0),
            None => card.flag(Severity::Info, "open-graph-missing", format!("no {} meta tag", key), Evidence::Meta(key.into())),
        }
    }

    match &bundle.language {
        Some(_) => card.award(5.0),
        None => card.flag(Severity::Info, "lang-missing", "no declared document language", Evidence::Document),
    }

    card.finish(FactorId::AiReadiness, Confidence::Full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::fixtures::{bundle, fixture};

    #[test]
    fn article_is_machine_readable() {
        let s = analyze(&fixture("article"));
        assert!(!s.has_finding("no-entity-statement"), "{:?}", s.findings);
        assert!(!s.has_finding("no-structured-data"));
        assert!(!s.has_finding("no-structured-answers"));
        assert!(s.score >= 80.0, "score {}", s.score);
    }

    #[test]
    fn div_soup_scores_low() {
        let b = bundle(
            "<html><body><div><div><span>Welcome to our wonderful website everyone</span></div></div></body></html>",
        );
        let s = analyze(&b);
        assert!(s.score < 20.0, "score {}", s.score);
        assert!(s.has_finding("low-semantic-density"));
        assert!(s.has_finding("no-question-headings"));
    }

    #[test]
    fn question_headings_detected() {
        let b = bundle("<main><h2>What is a widget?</h2><h2>How do widgets ship</h2><p>A widget is a small part used in assembly.</p></main>");
        let s = analyze(&b);
        assert!(!s.has_finding("no-question-headings"));
        assert!(!s.has_finding("few-question-headings"));
        assert!(!s.has_finding("no-entity-statement"));
    }
}
