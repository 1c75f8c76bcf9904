//! The single composite-score computation.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::analyzers::{Confidence, FactorId, FactorScore};
use crate::error::ConfigError;

const SUM_TOLERANCE: f64 = 1e-6;

/// Factor weights validated to sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightTable {
    weights: BTreeMap<FactorId, f64>,
}

impl WeightTable {
    /// Every factor must appear exactly once; a mismatched sum is an error,
    /// never renormalized.
    pub fn new(entries: impl IntoIterator<Item = (FactorId, f64)>) -> Result<Self, ConfigError> {
        let mut weights = BTreeMap::new();
        for (factor, weight) in entries {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::WeightRange {
                    factor: factor.to_string(),
                    weight,
                });
            }
            if weights.insert(factor, weight).is_some() {
                return Err(ConfigError::Invalid(format!("duplicate weight for {}", factor)));
            }
        }
        if let Some(missing) = FactorId::ALL.iter().find(|f| !weights.contains_key(f)) {
            return Err(ConfigError::Invalid(format!("missing weight for {}", missing)));
        }

        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(ConfigError::WeightSum { sum });
        }
        Ok(WeightTable { weights })
    }

    pub fn weight(&self, factor: FactorId) -> f64 {
        self.weights.get(&factor).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FactorId, f64)> + '_ {
        self.weights.iter().map(|(f, w)| (*f, *w))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusBand {
    Excellent,
    Good,
    NeedsWork,
    Poor,
}

impl StatusBand {
    /// Lower bounds, highest first.
    pub const THRESHOLDS: [(StatusBand, f64); 3] = [
        (StatusBand::Excellent, 90.0),
        (StatusBand::Good, 75.0),
        (StatusBand::NeedsWork, 50.0),
    ];

    pub fn from_score(score: f64) -> StatusBand {
        Self::THRESHOLDS
            .iter()
            .find(|(_, min)| score >= *min)
            .map(|(band, _)| *band)
            .unwrap_or(StatusBand::Poor)
    }
}

impl fmt::Display for StatusBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            StatusBand::Excellent => "excellent",
            StatusBand::Good => "good",
            StatusBand::NeedsWork => "needs-work",
            StatusBand::Poor => "poor",
        })
    }
}

/// Overall run confidence: full only when every factor had all its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallConfidence {
    Full,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate {
    pub composite: f64,
    pub band: StatusBand,
    pub confidence: OverallConfidence,
}

/// `composite = Σ weight[f] × score[f]` over the seven factors.
pub fn aggregate(table: &WeightTable, factors: &[FactorScore]) -> Aggregate {
    let composite: f64 = factors
        .iter()
        .map(|f| table.weight(f.factor) * f.score.clamp(0.0, 100.0))
        .sum();
    let composite = round2(composite.clamp(0.0, 100.0));

    let all_full = factors.len() == FactorId::ALL.len()
        && factors.iter().all(|f| f.confidence == Confidence::Full);

    Aggregate {
        composite,
        band: StatusBand::from_score(composite),
        confidence: if all_full {
            OverallConfidence::Full
        } else {
            OverallConfidence::Degraded
        },
    }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
