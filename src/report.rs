//! The result handed back to callers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analyzers::{FactorId, FactorScore};
use crate::scoring::{Aggregate, OverallConfidence, StatusBand};

/// One grading run, assembled once and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeReport {
    url: String,
    timestamp: DateTime<Utc>,
    composite_score: f64,
    status_band: StatusBand,
    confidence: OverallConfidence,
    factors: Vec<FactorScore>,
}

impl CompositeReport {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn composite_score(&self) -> f64 {
        self.composite_score
    }

    pub fn status_band(&self) -> StatusBand {
        self.status_band
    }

    pub fn confidence(&self) -> OverallConfidence {
        self.confidence
    }

    pub fn factors(&self) -> &[FactorScore] {
        &self.factors
    }

    pub fn factor(&self, id: FactorId) -> Option<&FactorScore> {
        self.factors.iter().find(|f| f.factor == id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Package already-computed results. Factors are ordered by [`FactorId`].
pub fn assemble(
    url: &str,
    timestamp: DateTime<Utc>,
    mut factors: Vec<FactorScore>,
    aggregate: Aggregate,
) -> CompositeReport {
    factors.sort_by_key(|f| f.factor);
    CompositeReport {
        url: url.to_string(),
        timestamp,
        composite_score: aggregate.composite,
        status_band: aggregate.band,
        confidence: aggregate.confidence,
        factors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::Confidence;
    use crate::config::Settings;
    use crate::scoring::aggregate;
    use chrono::TimeZone;

    fn scores() -> Vec<FactorScore> {
        FactorId::ALL
            .iter()
            .rev()
            .map(|f| FactorScore::new(*f, 80.0, Vec::new(), Confidence::Full))
            .collect()
    }

    #[test]
    fn json_shape() {
        let table = Settings::default().weight_table().unwrap();
        let factors = scores();
        let agg = aggregate(&table, &factors);
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let report = assemble("https://example.com/", ts, factors, agg);

        let v: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(v["url"], "https://example.com/");
        assert_eq!(v["compositeScore"], 80.0);
        assert_eq!(v["statusBand"], "good");
        assert_eq!(v["confidence"], "full");
        assert_eq!(v["timestamp"], "2026-01-02T03:04:05Z");
        assert_eq!(v["factors"][0]["id"], "technical");
        assert_eq!(v["factors"][2]["id"], "ai-readiness");
        assert!(v["factors"][0]["findings"].as_array().unwrap().is_empty());
    }

    #[test]
    fn same_inputs_same_report() {
        let table = Settings::default().weight_table().unwrap();
        let ts = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let a = assemble("u", ts, scores(), aggregate(&table, &scores()));
        let b = assemble("u", ts, scores(), aggregate(&table, &scores()));
        assert_eq!(a, b);
        assert_eq!(a.factor(FactorId::Mobile).map(|f| f.score), Some(80.0));
    }
}
