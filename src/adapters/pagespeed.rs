use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{unavailable_from, AdapterResult, PerformanceProbe};
use crate::fetch::budget::OutboundBudget;
use crate::units::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricSource {
    /// Real-user field data.
    Field,
    /// Synthetic lab run.
    Lab,
}

/// Page timings, every one in milliseconds, plus the unitless layout shift.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub lcp: Option<Millis>,
    pub fcp: Option<Millis>,
    pub tbt: Option<Millis>,
    pub inp: Option<Millis>,
    pub ttfb: Option<Millis>,
    pub speed_index: Option<Millis>,
    pub cls: Option<f64>,
}

impl PerformanceMetrics {
    pub fn is_empty(&self) -> bool {
        self.lcp.is_none()
            && self.fcp.is_none()
            && self.tbt.is_none()
            && self.inp.is_none()
            && self.cls.is_none()
    }
}

/// Rendered-page mobile audits. `None` when the audit did not run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MobileHints {
    pub viewport: Option<bool>,
    pub font_size: Option<bool>,
    pub tap_targets: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub source: MetricSource,
    pub metrics: PerformanceMetrics,
    pub mobile: MobileHints,
}

/// PageSpeed Insights v5 client, mobile strategy.
pub struct PageSpeedProbe {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    budget: Arc<OutboundBudget>,
}

impl PageSpeedProbe {
    pub fn new(
        client: reqwest::Client,
        endpoint: Url,
        api_key: Option<String>,
        budget: Arc<OutboundBudget>,
    ) -> Self {
        PageSpeedProbe {
            client,
            endpoint,
            api_key,
            budget,
        }
    }
}

#[async_trait]
impl PerformanceProbe for PageSpeedProbe {
    async fn measure(&self, page_url: &Url) -> AdapterResult<PerformanceReport> {
        let host = self.endpoint.host_str().unwrap_or_default().to_string();
        let _permit = match self.budget.acquire(&host).await {
            Ok(p) => p,
            Err(e) => return AdapterResult::Unavailable(e.to_string()),
        };

        let mut query = vec![
            ("url", page_url.as_str()),
            ("strategy", "mobile"),
            ("category", "performance"),
            ("category", "seo"),
        ];
        if let Some(key) = self.api_key.as_deref() {
            query.push(("key", key));
        }

        let resp = self
            .client
            .get(self.endpoint.clone())
            .query(&query)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %page_url, error = %e, "performance probe unavailable");
                return AdapterResult::Unavailable(unavailable_from(e));
            }
        };

        let body: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) if e.is_decode() => {
                return AdapterResult::Error(format!("unreadable probe response: {}", e))
            }
            Err(e) => return AdapterResult::Unavailable(unavailable_from(e)),
        };

        let result = parse_report(&body);
        if let AdapterResult::Value(r) = &result {
            debug!(url = %page_url, source = ?r.source, lcp = ?r.metrics.lcp, "measured performance");
        }
        result
    }
}

/// Field data wins per metric; lab audits fill the gaps. Lab values are
/// normalized through their declared `numericUnit`.
pub fn parse_report(body: &Value) -> AdapterResult<PerformanceReport> {
    if body.get("lighthouseResult").is_none() && body.get("loadingExperience").is_none() {
        return AdapterResult::Error("response has neither field nor lab data".to_string());
    }

    let field = body.pointer("/loadingExperience/metrics");
    let audits = body.pointer("/lighthouseResult/audits");

    let field_ms = |key: &str| {
        field
            .and_then(|m| m.get(key))
            .and_then(|m| m.get("percentile"))
            .and_then(Value::as_f64)
            .and_then(Millis::from_millis_f64)
    };
    let lab_ms = |key: &str| audits.and_then(|a| a.get(key)).and_then(lab_timing);

    let field_metrics = PerformanceMetrics {
        lcp: field_ms("LARGEST_CONTENTFUL_PAINT_MS"),
        fcp: field_ms("FIRST_CONTENTFUL_PAINT_MS"),
        tbt: None,
        inp: field_ms("INTERACTION_TO_NEXT_PAINT"),
        ttfb: field_ms("EXPERIMENTAL_TIME_TO_FIRST_BYTE"),
        speed_index: None,
        // Field CLS percentiles are reported multiplied by 100.
        cls: field
            .and_then(|m| m.pointer("/CUMULATIVE_LAYOUT_SHIFT_SCORE/percentile"))
            .and_then(Value::as_f64)
            .map(|v| v / 100.0),
    };

    let source = if field_metrics.lcp.is_some() {
        MetricSource::Field
    } else {
        MetricSource::Lab
    };

    let metrics = PerformanceMetrics {
        lcp: field_metrics.lcp.or_else(|| lab_ms("largest-contentful-paint")),
        fcp: field_metrics.fcp.or_else(|| lab_ms("first-contentful-paint")),
        tbt: lab_ms("total-blocking-time"),
        inp: field_metrics.inp,
        ttfb: field_metrics.ttfb.or_else(|| lab_ms("server-response-time")),
        speed_index: lab_ms("speed-index"),
        cls: field_metrics.cls.or_else(|| {
            audits
                .and_then(|a| a.pointer("/cumulative-layout-shift/numericValue"))
                .and_then(Value::as_f64)
        }),
    };

    if metrics.is_empty() {
        return AdapterResult::Unavailable("probe returned no metrics".to_string());
    }

    let audit_pass = |key: &str| {
        audits
            .and_then(|a| a.get(key))
            .and_then(|a| a.get("score"))
            .and_then(Value::as_f64)
            .map(|s| s >= 0.9)
    };

    AdapterResult::Value(PerformanceReport {
        source,
        metrics,
        mobile: MobileHints {
            viewport: audit_pass("viewport"),
            font_size: audit_pass("font-size"),
            tap_targets: audit_pass("tap-targets"),
        },
    })
}

fn lab_timing(audit: &Value) -> Option<Millis> {
    let value = audit.get("numericValue")?.as_f64()?;
    let unit = audit.get("numericUnit")?.as_str()?;
    Millis::from_unit(value, unit)
}
