//! Seven independent factor analyzers. Each is a pure function of the
//! signal bundle and the adapter results it depends on.

pub mod ai_readiness;
pub mod authority;
pub mod content;
pub mod mobile;
pub mod performance;
pub mod schema;
pub mod technical;

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::adapters::{AdapterResult, PerformanceReport, ValidationReport};
use crate::extract::SignalBundle;
use crate::scoring::round2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FactorId {
    Technical,
    Content,
    AiReadiness,
    Schema,
    Performance,
    Mobile,
    Authority,
}

impl FactorId {
    pub const ALL: [FactorId; 7] = [
        FactorId::Technical,
        FactorId::Content,
        FactorId::AiReadiness,
        FactorId::Schema,
        FactorId::Performance,
        FactorId::Mobile,
        FactorId::Authority,
    ];

    /// Factors scored from the bundle alone.
    pub const LOCAL: [FactorId; 4] = [
        FactorId::Content,
        FactorId::AiReadiness,
        FactorId::Schema,
        FactorId::Authority,
    ];

    /// Factors that also consume an adapter result.
    pub const ADAPTER_BACKED: [FactorId; 3] =
        [FactorId::Technical, FactorId::Performance, FactorId::Mobile];

    pub fn as_str(self) -> &'static str {
        match self {
            FactorId::Technical => "technical",
            FactorId::Content => "content",
            FactorId::AiReadiness => "ai-readiness",
            FactorId::Schema => "schema",
            FactorId::Performance => "performance",
            FactorId::Mobile => "mobile",
            FactorId::Authority => "authority",
        }
    }
}

impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Where in the bundle a finding points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "ref", rename_all = "kebab-case")]
pub enum Evidence {
    Document,
    Transport,
    Robots,
    Sitemap,
    Meta(String),
    Heading(usize),
    TextBlock(usize),
    StructuredData(usize),
    ExtractionWarning(usize),
    Link(usize),
    Image(usize),
    Adapter(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub code: &'static str,
    pub message: String,
    pub severity: Severity,
    pub evidence: Evidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Confidence {
    Full,
    Degraded,
    UnavailableInputs,
}

impl Confidence {
    /// `missing` of `required` adapter inputs were not values. A factor with
    /// a local fallback is degraded rather than without inputs.
    pub fn derive(required: usize, missing: usize, local_fallback: bool) -> Confidence {
        if missing == 0 {
            Confidence::Full
        } else if missing < required || local_fallback {
            Confidence::Degraded
        } else {
            Confidence::UnavailableInputs
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorScore {
    #[serde(rename = "id")]
    pub factor: FactorId,
    pub score: f64,
    pub confidence: Confidence,
    pub findings: Vec<Finding>,
}

impl FactorScore {
    /// Clamps to [0, 100] and orders findings by severity, most severe
    /// first, keeping insertion order among equals.
    pub fn new(factor: FactorId, score: f64, mut findings: Vec<Finding>, confidence: Confidence) -> Self {
        findings.sort_by(|a, b| b.severity.cmp(&a.severity));
        FactorScore {
            factor,
            score: round2(score.clamp(0.0, 100.0)),
            confidence,
            findings,
        }
    }

    pub fn has_finding(&self, code: &str) -> bool {
        self.findings.iter().any(|f| f.code == code)
    }
}

/// Points-based scorecard shared by the analyzers: every deduction carries
/// a finding that explains it.
#[derive(Debug, Default)]
pub(crate) struct Scorecard {
    earned: f64,
    findings: Vec<Finding>,
}

impl Scorecard {
    pub fn award(&mut self, points: f64) {
        self.earned += points;
    }

    pub fn flag(&mut self, severity: Severity, code: &'static str, message: impl Into<String>, evidence: Evidence) {
        self.findings.push(Finding {
            code,
            message: message.into(),
            severity,
            evidence,
        });
    }

    pub fn finish(self, factor: FactorId, confidence: Confidence) -> FactorScore {
        FactorScore::new(factor, self.earned, self.findings, confidence)
    }
}

/// Borrowed inputs for one run's analyzers.
pub struct AnalyzerInputs<'a> {
    pub bundle: &'a SignalBundle,
    pub validation: &'a AdapterResult<ValidationReport>,
    pub performance: &'a AdapterResult<PerformanceReport>,
}

pub fn analyze(factor: FactorId, inputs: &AnalyzerInputs) -> FactorScore {
    match factor {
        FactorId::Technical => technical::analyze(inputs.bundle, inputs.validation),
        FactorId::Content => content::analyze(inputs.bundle),
        FactorId::AiReadiness => ai_readiness::analyze(inputs.bundle),
        FactorId::Schema => schema::analyze(inputs.bundle),
        FactorId::Performance => performance::analyze(inputs.bundle, inputs.performance),
        FactorId::Mobile => mobile::analyze(inputs.bundle, inputs.performance),
        FactorId::Authority => authority::analyze(inputs.bundle),
    }
}

/// Analyzers that need no adapter result, in parallel.
pub fn run_local(bundle: &SignalBundle) -> Vec<FactorScore> {
    FactorId::LOCAL
        .par_iter()
        .map(|f| match f {
            FactorId::Content => content::analyze(bundle),
            FactorId::AiReadiness => ai_readiness::analyze(bundle),
            FactorId::Schema => schema::analyze(bundle),
            _ => authority::analyze(bundle),
        })
        .collect()
}

/// Analyzers that consume adapter results, in parallel.
pub fn run_adapter_backed(inputs: &AnalyzerInputs) -> Vec<FactorScore> {
    FactorId::ADAPTER_BACKED
        .par_iter()
        .map(|f| analyze(*f, inputs))
        .collect()
}

/// All seven, in [`FactorId::ALL`] order.
pub fn run_all(inputs: &AnalyzerInputs) -> Vec<FactorScore> {
    FactorId::ALL.par_iter().map(|f| analyze(*f, inputs)).collect()
}

/// Linear score: `full` points at or below `good`, half at `poor`, zero at
/// twice `poor`. Shared by the timing-based checks.
pub(crate) fn ramp(value: f64, good: f64, poor: f64) -> f64 {
    if value <= good {
        1.0
    } else if value <= poor {
        1.0 - 0.5 * (value - good) / (poor - good)
    } else {
        (0.5 - 0.5 * (value - poor) / poor).max(0.0)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use url::Url;

    use crate::extract::{extract, SignalBundle};
    use crate::fetch::robots::RobotsTxt;
    use crate::fetch::sitemap::{Sitemap, SitemapKind};
    use crate::fetch::{FetchedPage, SiteResources};
    use crate::units::Millis;

    pub fn site(url: &str, html: &str) -> SiteResources {
        let url = Url::parse(url).unwrap();
        SiteResources {
            page: FetchedPage {
                requested_url: url.clone(),
                final_url: url.clone(),
                status: 200,
                content_type: Some("text/html; charset=utf-8".into()),
                x_robots_tag: None,
                body: html.as_bytes().to_vec(),
                elapsed: Millis::from_millis(300),
            },
            robots: Some(RobotsTxt::parse("User-agent: *\nDisallow: /admin/\n")),
            sitemap: Some(Sitemap {
                url: url.join("/sitemap.xml").unwrap().to_string(),
                kind: SitemapKind::Urlset,
                locations: vec![url.to_string()],
            }),
        }
    }

    pub fn bundle(html: &str) -> SignalBundle {
        extract(&site("https://example.com/", html))
    }

    pub fn fixture(name: &str) -> SignalBundle {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        bundle(&html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn findings_sorted_by_severity_stably() {
        let mut card = Scorecard::default();
        card.flag(Severity::Info, "a", "first info", Evidence::Document);
        card.flag(Severity::Critical, "b", "critical", Evidence::Document);
        card.flag(Severity::Info, "c", "second info", Evidence::Document);
        card.flag(Severity::Warning, "d", "warning", Evidence::Document);
        let s = card.finish(FactorId::Content, Confidence::Full);
        let codes: Vec<_> = s.findings.iter().map(|f| f.code).collect();
        assert_eq!(codes, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn confidence_rules() {
        assert_eq!(Confidence::derive(1, 0, false), Confidence::Full);
        assert_eq!(Confidence::derive(1, 1, true), Confidence::Degraded);
        assert_eq!(Confidence::derive(1, 1, false), Confidence::UnavailableInputs);
        assert_eq!(Confidence::derive(2, 1, false), Confidence::Degraded);
    }

    #[test]
    fn score_clamped() {
        let s = FactorScore::new(FactorId::Mobile, 140.0, Vec::new(), Confidence::Full);
        assert_eq!(s.score, 100.0);
    }

    #[test]
    fn ramp_shape() {
        assert_eq!(ramp(1800.0, 2000.0, 4000.0), 1.0);
        assert_eq!(ramp(3000.0, 2000.0, 4000.0), 0.75);
        assert_eq!(ramp(4000.0, 2000.0, 4000.0), 0.5);
        assert_eq!(ramp(8000.0, 2000.0, 4000.0), 0.0);
    }

    #[test]
    fn run_all_covers_every_factor_in_order() {
        let bundle = fixtures::fixture("article");
        let v = AdapterResult::Unavailable("offline".into());
        let p = AdapterResult::Unavailable("offline".into());
        let inputs = AnalyzerInputs { bundle: &bundle, validation: &v, performance: &p };
        let ids: Vec<_> = run_all(&inputs).iter().map(|s| s.factor).collect();
        assert_eq!(ids, FactorId::ALL.to_vec());
    }
}
