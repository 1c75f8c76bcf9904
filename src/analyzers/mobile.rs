use super::{Confidence, Evidence, FactorId, FactorScore, Scorecard, Severity};
use crate::adapters::{AdapterResult, MobileHints, PerformanceReport};
use crate::extract::SignalBundle;

const HINT_POINTS: f64 = 10.0;

/// `width=device-width, initial-scale=1` into lowercase key/value pairs.
fn viewport_directives(content: &str) -> Vec<(String, String)> {
    content
        .split([',', ';'])
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((k.trim().to_lowercase(), v.trim().to_lowercase()))
        })
        .collect()
}

fn zoom_disabled(directives: &[(String, String)]) -> bool {
    directives.iter().any(|(k, v)| match k.as_str() {
        "user-scalable" => v == "no" || v == "0",
        "maximum-scale" => v.parse::<f64>().is_ok_and(|s| s <= 1.0),
        _ => false,
    })
}

pub fn analyze(bundle: &SignalBundle, performance: &AdapterResult<PerformanceReport>) -> FactorScore {
    let mut card = Scorecard::default();
    let viewport_meta = || Evidence::Meta("viewport".into());

    let directives = bundle.meta("viewport").map(viewport_directives);
    match &directives {
        Some(d) if d.iter().any(|(k, v)| k == "width" && v == "device-width") => card.award(35.0),
        Some(_) => {
            card.award(15.0);
            card.flag(
                Severity::Warning,
                "viewport-fixed-width",
                "viewport does not follow the device width",
                viewport_meta(),
            );
        }
        None => card.flag(Severity::Critical, "viewport-missing", "no viewport meta tag", viewport_meta()),
    }

    if directives.as_deref().is_some_and(zoom_disabled) {
        card.flag(Severity::Warning, "zoom-disabled", "viewport prevents pinch zoom", viewport_meta());
    } else {
        card.award(10.0);
    }

    let images = &bundle.images;
    let responsive = images.iter().filter(|i| i.responsive).count();
    if images.is_empty() || responsive * 2 >= images.len() {
        card.award(15.0);
    } else {
        card.award(15.0 * responsive as f64 / images.len() as f64);
        let first = images.iter().position(|i| !i.responsive).unwrap_or(0);
        card.flag(
            Severity::Info,
            "images-not-responsive",
            format!("{} of {} images offer srcset or <picture> sources", responsive, images.len()),
            Evidence::Image(first),
        );
    }

    if bundle.census.media_queries > 0 {
        card.award(10.0);
    } else if bundle.census.stylesheets > 0 {
        // External stylesheets are not fetched, so their media queries are unknown.
        card.award(5.0);
        card.flag(
            Severity::Info,
            "media-queries-unverified",
            "no media queries in the document; linked stylesheets not inspected",
            Evidence::Document,
        );
    } else {
        card.flag(Severity::Warning, "no-media-queries", "no responsive media queries", Evidence::Document);
    }

    let missing = match performance.value().map(|r| &r.mobile) {
        Some(hints) if has_any_hint(hints) => {
            score_hints(hints, &mut card);
            0
        }
        _ => {
            card.flag(
                Severity::Info,
                "mobile-audits-unavailable",
                format!(
                    "rendered mobile audits unavailable: {}",
                    performance.reason().unwrap_or("probe ran no mobile audits")
                ),
                Evidence::Adapter("performance".into()),
            );
            1
        }
    };

    card.finish(FactorId::Mobile, Confidence::derive(1, missing, true))
}

fn has_any_hint(h: &MobileHints) -> bool {
    h.viewport.is_some() || h.font_size.is_some() || h.tap_targets.is_some()
}

fn score_hints(h: &MobileHints, card: &mut Scorecard) {
    let audits = [
        (h.viewport, "audit-viewport", "rendered viewport audit failed"),
        (h.font_size, "audit-font-size", "text too small to read on mobile"),
        (h.tap_targets, "audit-tap-targets", "tap targets too small or too close"),
    ];
    for (result, code, message) in audits {
        match result {
            Some(true) => card.award(HINT_POINTS),
            Some(false) => card.flag(Severity::Warning, code, message, Evidence::Adapter("performance".into())),
            None => card.flag(
                Severity::Info,
                code,
                "audit did not run",
                Evidence::Adapter("performance".into()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MetricSource, PerformanceMetrics};
    use crate::analyzers::fixtures::{bundle, fixture};

    fn hints(v: Option<bool>, f: Option<bool>, t: Option<bool>) -> AdapterResult<PerformanceReport> {
        AdapterResult::Value(PerformanceReport {
            source: MetricSource::Field,
            metrics: PerformanceMetrics::default(),
            mobile: MobileHints { viewport: v, font_size: f, tap_targets: t },
        })
    }

    #[test]
    fn article_passes_everything() {
        let s = analyze(&fixture("article"), &hints(Some(true), Some(true), Some(true)));
        assert_eq!(s.score, 100.0, "{:?}", s.findings);
        assert_eq!(s.confidence, Confidence::Full);
    }

    #[test]
    fn hints_withheld_when_probe_down() {
        let s = analyze(&fixture("article"), &AdapterResult::Error("bad json".into()));
        assert_eq!(s.confidence, Confidence::Degraded);
        assert_eq!(s.score, 70.0);
        assert!(s.has_finding("mobile-audits-unavailable"));
    }

    #[test]
    fn zoom_lock_and_missing_viewport() {
        let locked = bundle(r#"<head><meta name="viewport" content="width=device-width, maximum-scale=1"></head>"#);
        assert!(analyze(&locked, &hints(None, None, Some(true))).has_finding("zoom-disabled"));

        let bare = analyze(&bundle("<p>plain</p>"), &hints(Some(false), None, None));
        assert_eq!(bare.findings[0].code, "viewport-missing");
        assert!(bare.has_finding("audit-viewport"));
    }

    #[test]
    fn parses_viewport_pairs() {
        let d = viewport_directives("width=device-width; user-scalable=NO");
        assert!(zoom_disabled(&d));
        assert!(!zoom_disabled(&viewport_directives("width=device-width, initial-scale=1")));
    }
}
