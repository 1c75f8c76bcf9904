use serde::Serialize;

use super::{ramp, Confidence, Evidence, FactorId, FactorScore, Scorecard, Severity};
use crate::adapters::{AdapterResult, PerformanceMetrics, PerformanceReport};
use crate::extract::SignalBundle;
use crate::units::Millis;

pub const FAST_LCP: Millis = Millis::from_millis(2000);
pub const SLOW_LCP: Millis = Millis::from_millis(4000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeedBand {
    Fast,
    Moderate,
    Slow,
}

impl SpeedBand {
    pub fn classify(lcp: Millis) -> SpeedBand {
        if lcp < FAST_LCP {
            SpeedBand::Fast
        } else if lcp > SLOW_LCP {
            SpeedBand::Slow
        } else {
            SpeedBand::Moderate
        }
    }
}

/// (good, poor) thresholds per timing metric, in milliseconds.
const LCP_MS: (u64, u64) = (2000, 4000);
const FCP_MS: (u64, u64) = (1800, 3000);
const TBT_MS: (u64, u64) = (200, 600);
const INP_MS: (u64, u64) = (200, 500);
const CLS: (f64, f64) = (0.1, 0.25);

/// Local proxies when the probe has nothing.
const TTFB_PROXY_MS: (u64, u64) = (800, 1800);
const WEIGHT_PROXY_BYTES: (f64, f64) = (500_000.0, 2_000_000.0);

fn timing(value: Millis, (good, poor): (u64, u64)) -> f64 {
    ramp(value.as_millis() as f64, good as f64, poor as f64)
}

pub fn analyze(bundle: &SignalBundle, performance: &AdapterResult<PerformanceReport>) -> FactorScore {
    match performance {
        AdapterResult::Value(report) => from_metrics(&report.metrics),
        other => from_local_proxies(bundle, other.reason().unwrap_or("no answer")),
    }
}

fn from_metrics(m: &PerformanceMetrics) -> FactorScore {
    let mut card = Scorecard::default();
    let evidence = || Evidence::Adapter("performance".into());

    // Weighted mean over whichever metrics the probe reported.
    let interactivity = m.inp.map(|v| timing(v, INP_MS)).or_else(|| m.tbt.map(|v| timing(v, TBT_MS)));
    let parts = [
        (0.40, m.lcp.map(|v| timing(v, LCP_MS))),
        (0.30, interactivity),
        (0.15, m.cls.map(|v| ramp(v, CLS.0, CLS.1))),
        (0.15, m.fcp.map(|v| timing(v, FCP_MS))),
    ];
    let (weighted, total) = parts
        .iter()
        .filter_map(|(w, s)| s.map(|s| (w * s, *w)))
        .fold((0.0, 0.0), |(a, b), (x, y)| (a + x, b + y));
    if total > 0.0 {
        card.award(100.0 * weighted / total);
    }

    match m.lcp {
        Some(lcp) => match SpeedBand::classify(lcp) {
            SpeedBand::Fast => card.flag(Severity::Info, "lcp-fast", format!("largest contentful paint {}", lcp), evidence()),
            SpeedBand::Moderate => card.flag(
                Severity::Warning,
                "lcp-moderate",
                format!("largest contentful paint {}, under {} is fast", lcp, FAST_LCP),
                evidence(),
            ),
            SpeedBand::Slow => card.flag(
                Severity::Critical,
                "lcp-slow",
                format!("largest contentful paint {}, over {}", lcp, SLOW_LCP),
                evidence(),
            ),
        },
        None => card.flag(Severity::Info, "lcp-unmeasured", "probe reported no largest contentful paint", evidence()),
    }

    if let Some(tbt) = m.tbt.filter(|t| t.as_millis() > TBT_MS.0) {
        card.flag(Severity::Warning, "blocking-time", format!("total blocking time {}", tbt), evidence());
    }
    if let Some(inp) = m.inp.filter(|t| t.as_millis() > INP_MS.0) {
        card.flag(Severity::Warning, "slow-interaction", format!("interaction to next paint {}", inp), evidence());
    }
    if let Some(cls) = m.cls.filter(|c| *c > CLS.0) {
        card.flag(Severity::Warning, "layout-shift", format!("cumulative layout shift {:.2}", cls), evidence());
    }

    card.finish(FactorId::Performance, Confidence::Full)
}

/// Coarse stand-in from what the fetch itself observed. Never reported as
/// a measurement.
fn from_local_proxies(bundle: &SignalBundle, reason: &str) -> FactorScore {
    let mut card = Scorecard::default();
    card.flag(
        Severity::Info,
        "probe-unavailable",
        format!("performance probe unavailable ({}); scored from local proxies", reason),
        Evidence::Adapter("performance".into()),
    );

    let response = bundle.transport.response_time;
    card.award(50.0 * timing(response, TTFB_PROXY_MS));
    if response.as_millis() > TTFB_PROXY_MS.0 {
        card.flag(Severity::Warning, "slow-response", format!("server responded in {}", response), Evidence::Transport);
    }

    card.award(30.0 * ramp(bundle.byte_size as f64, WEIGHT_PROXY_BYTES.0, WEIGHT_PROXY_BYTES.1));
    if bundle.byte_size as f64 > WEIGHT_PROXY_BYTES.0 {
        card.flag(
            Severity::Warning,
            "heavy-document",
            format!("document is {} KB", bundle.byte_size / 1024),
            Evidence::Document,
        );
    }

    match bundle.census.blocking_scripts {
        0 => card.award(20.0),
        n => {
            card.award((20.0 - 5.0 * n as f64).max(0.0));
            card.flag(
                Severity::Warning,
                "render-blocking-scripts",
                format!("{} render-blocking script(s) in <head>", n),
                Evidence::Document,
            );
        }
    }

    card.finish(FactorId::Performance, Confidence::derive(1, 1, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MetricSource, MobileHints};
    use crate::analyzers::fixtures::fixture;

    fn probe(metrics: PerformanceMetrics) -> AdapterResult<PerformanceReport> {
        AdapterResult::Value(PerformanceReport {
            source: MetricSource::Lab,
            metrics,
            mobile: MobileHints::default(),
        })
    }

    fn lcp(ms: Millis) -> AdapterResult<PerformanceReport> {
        probe(PerformanceMetrics { lcp: Some(ms), ..Default::default() })
    }

    #[test]
    fn band_edges() {
        assert_eq!(SpeedBand::classify(Millis::from_millis(1999)), SpeedBand::Fast);
        assert_eq!(SpeedBand::classify(Millis::from_millis(2000)), SpeedBand::Moderate);
        assert_eq!(SpeedBand::classify(Millis::from_millis(4000)), SpeedBand::Moderate);
        assert_eq!(SpeedBand::classify(Millis::from_millis(4001)), SpeedBand::Slow);
    }

    #[test]
    fn seconds_and_millis_score_the_same() {
        let b = fixture("article");
        let secs = Millis::from_unit(1.5, "second").unwrap();
        let ms = Millis::from_unit(1500.0, "millisecond").unwrap();
        assert_eq!(analyze(&b, &lcp(secs)), analyze(&b, &lcp(ms)));
    }

    #[test]
    fn fast_lcp() {
        let s = analyze(&fixture("article"), &lcp(Millis::from_millis(1800)));
        assert!(s.has_finding("lcp-fast"));
        assert_eq!(s.score, 100.0);
        assert_eq!(s.confidence, Confidence::Full);
    }

    #[test]
    fn slow_metrics_flagged() {
        let m = PerformanceMetrics {
            lcp: Some(Millis::from_millis(6000)),
            tbt: Some(Millis::from_millis(900)),
            cls: Some(0.3),
            ..Default::default()
        };
        let s = analyze(&fixture("article"), &probe(m));
        assert_eq!(s.findings[0].code, "lcp-slow");
        assert!(s.has_finding("blocking-time"));
        assert!(s.has_finding("layout-shift"));
        assert!(s.score < 40.0, "score {}", s.score);
    }

    #[test]
    fn probe_down_uses_local_proxies() {
        let s = analyze(&fixture("article"), &AdapterResult::Unavailable("timed out after 30000 ms".into()));
        assert_eq!(s.confidence, Confidence::UnavailableInputs);
        assert!(s.has_finding("probe-unavailable"));
        assert!(!s.has_finding("lcp-fast"));
        assert!(s.score > 0.0);
    }
}
