use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A timing value in whole milliseconds.
///
/// Every timing that crosses a module boundary is carried as `Millis`, so a
/// value reported in seconds and one reported in milliseconds compare equal
/// once constructed. Thresholds are `Millis` too; there is no comparison
/// against a bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Millis(u64);

impl Millis {
    pub const ZERO: Millis = Millis(0);

    pub const fn from_millis(ms: u64) -> Self {
        Millis(ms)
    }

    /// Fractional milliseconds are rounded to the nearest whole millisecond.
    /// Negative and non-finite inputs are rejected.
    pub fn from_millis_f64(ms: f64) -> Option<Self> {
        if !ms.is_finite() || ms < 0.0 {
            return None;
        }
        Some(Millis(ms.round() as u64))
    }

    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        Self::from_millis_f64(secs * 1000.0)
    }

    /// Normalize a number tagged with a unit name as it appears in
    /// measurement APIs ("millisecond", "ms", "second", "s").
    pub fn from_unit(value: f64, unit: &str) -> Option<Self> {
        match unit.trim().to_ascii_lowercase().as_str() {
            "millisecond" | "milliseconds" | "ms" => Self::from_millis_f64(value),
            "second" | "seconds" | "s" | "sec" => Self::from_secs_f64(value),
            _ => None,
        }
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl From<Duration> for Millis {
    fn from(d: Duration) -> Self {
        Millis(d.as_millis().min(u64::MAX as u128) as u64)
    }
}

impl From<Millis> for Duration {
    fn from(m: Millis) -> Self {
        Duration::from_millis(m.0)
    }
}

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_and_millis_agree() {
        assert_eq!(Millis::from_secs_f64(1.5), Some(Millis::from_millis(1500)));
        assert_eq!(Millis::from_unit(1.5, "second"), Millis::from_unit(1500.0, "millisecond"));
    }

    #[test]
    fn fractional_millis_round() {
        assert_eq!(Millis::from_millis_f64(1799.6), Some(Millis::from_millis(1800)));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(Millis::from_secs_f64(-1.0), None);
        assert_eq!(Millis::from_millis_f64(f64::NAN), None);
        assert_eq!(Millis::from_unit(3.0, "unitless"), None);
    }

    #[test]
    fn duration_roundtrip() {
        let m = Millis::from(Duration::from_millis(2500));
        assert_eq!(m.as_millis(), 2500);
        assert_eq!(Duration::from(m), Duration::from_millis(2500));
    }
}
