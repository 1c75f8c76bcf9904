use std::sync::LazyLock;

use regex::Regex;

use super::{Confidence, Evidence, FactorId, FactorScore, Scorecard, Severity};
use crate::extract::SignalBundle;

static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+(?:\s+|$)").unwrap());

const DEEP_WORDS: usize = 500;
const MODERATE_WORDS: usize = 250;
const THIN_WORDS: usize = 100;
const TARGET_PARAGRAPHS: usize = 5;

/// Main-content blocks only; boilerplate never counts toward depth.
pub fn analyze(bundle: &SignalBundle) -> FactorScore {
    let mut card = Scorecard::default();
    let main: Vec<_> = bundle.main_blocks().collect();
    let words: usize = main.iter().map(|(_, b)| b.word_count()).sum();

    match words {
        w if w >= DEEP_WORDS => card.award(30.0),
        w if w >= MODERATE_WORDS => {
            card.award(22.0);
            card.flag(
                Severity::Info,
                "content-moderate",
                format!("{} words of main content, {}+ reads as in-depth", w, DEEP_WORDS),
                Evidence::Document,
            );
        }
        w if w >= THIN_WORDS => {
            card.award(10.0);
            card.flag(Severity::Warning, "thin-content", format!("only {} words of main content", w), Evidence::Document);
        }
        w => card.flag(
            Severity::Critical,
            "thin-content",
            format!("only {} words of main content", w),
            Evidence::Document,
        ),
    }

    score_headings(bundle, &mut card);

    let text: String = main.iter().map(|(_, b)| b.text.as_str()).collect::<Vec<_>>().join(" ");
    match average_sentence_words(&text) {
        None => card.flag(Severity::Critical, "no-main-content", "no readable main content", Evidence::Document),
        Some(avg) if (8.0..=25.0).contains(&avg) => card.award(20.0),
        Some(avg) if avg < 8.0 => {
            card.award(12.0);
            card.flag(
                Severity::Info,
                "fragmented-text",
                format!("sentences average {:.1} words", avg),
                Evidence::Document,
            );
        }
        Some(avg) if avg <= 32.0 => {
            card.award(12.0);
            card.flag(Severity::Info, "long-sentences", format!("sentences average {:.1} words", avg), Evidence::Document);
        }
        Some(avg) => {
            card.award(5.0);
            card.flag(
                Severity::Warning,
                "long-sentences",
                format!("sentences average {:.1} words", avg),
                Evidence::Document,
            );
        }
    }

    if main.len() >= TARGET_PARAGRAPHS {
        card.award(15.0);
    } else {
        card.award(3.0 * main.len() as f64);
        let evidence = main.first().map(|(i, _)| Evidence::TextBlock(*i)).unwrap_or(Evidence::Document);
        card.flag(
            Severity::Info,
            "few-paragraphs",
            format!("{} main-content blocks", main.len()),
            evidence,
        );
    }

    card.finish(FactorId::Content, Confidence::Full)
}

fn score_headings(bundle: &SignalBundle, card: &mut Scorecard) {
    let h = &bundle.headings;
    let h1: Vec<usize> = h.iter().enumerate().filter(|(_, x)| x.level == 1).map(|(i, _)| i).collect();
    match h1.len() {
        1 => card.award(15.0),
        0 => card.flag(Severity::Critical, "h1-missing", "no <h1> heading", Evidence::Document),
        n => {
            card.award(7.0);
            card.flag(Severity::Warning, "h1-multiple", format!("{} <h1> headings", n), Evidence::Heading(h1[1]));
        }
    }

    let skipped = h
        .windows(2)
        .position(|w| w[1].level > w[0].level + 1)
        .map(|i| i + 1);
    match skipped {
        None if !h.is_empty() => card.award(10.0),
        None => {}
        Some(i) => card.flag(
            Severity::Warning,
            "heading-skip",
            format!("heading jumps from h{} to h{}", h[i - 1].level, h[i].level),
            Evidence::Heading(i),
        ),
    }

    match h.iter().filter(|x| x.level == 2).count() {
        n if n >= 2 => card.award(10.0),
        1 => {
            card.award(5.0);
            card.flag(Severity::Info, "few-sections", "only one <h2> section", Evidence::Document);
        }
        _ => card.flag(Severity::Warning, "no-sections", "no <h2> sections", Evidence::Document),
    }
}

fn average_sentence_words(text: &str) -> Option<f64> {
    let sentences: Vec<&str> = SENTENCE_END
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() {
        return None;
    }
    let words: usize = sentences.iter().map(|s| s.split_whitespace().count()).sum();
    Some(words as f64 / sentences.len() as f64)
}
