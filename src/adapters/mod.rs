//! External signal sources. Every call yields an [`AdapterResult`]; failure
//! is data, never a panic or an error returned to the caller.

pub mod pagespeed;
pub mod validator;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::units::Millis;

pub use pagespeed::{MetricSource, MobileHints, PageSpeedProbe, PerformanceMetrics, PerformanceReport};
pub use validator::{NuValidator, ValidationReport, ValidatorMessage};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "kebab-case")]
pub enum AdapterResult<T> {
    Value(T),
    /// The source did not answer in time or answered with a non-success.
    Unavailable(String),
    /// The source answered with something unusable.
    Error(String),
}

impl<T> AdapterResult<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            AdapterResult::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, AdapterResult::Value(_))
    }

    /// Why there is no value, if there is none.
    pub fn reason(&self) -> Option<&str> {
        match self {
            AdapterResult::Value(_) => None,
            AdapterResult::Unavailable(r) | AdapterResult::Error(r) => Some(r),
        }
    }
}

#[async_trait]
pub trait MarkupValidator: Send + Sync {
    async fn validate(&self, page_url: &Url, html: &[u8]) -> AdapterResult<ValidationReport>;
}

#[async_trait]
pub trait PerformanceProbe: Send + Sync {
    async fn measure(&self, page_url: &Url) -> AdapterResult<PerformanceReport>;
}

/// Stands in for an adapter switched off in configuration.
pub struct Disabled;

#[async_trait]
impl MarkupValidator for Disabled {
    async fn validate(&self, _page_url: &Url, _html: &[u8]) -> AdapterResult<ValidationReport> {
        AdapterResult::Unavailable("disabled".to_string())
    }
}

#[async_trait]
impl PerformanceProbe for Disabled {
    async fn measure(&self, _page_url: &Url) -> AdapterResult<PerformanceReport> {
        AdapterResult::Unavailable("disabled".to_string())
    }
}

/// Bound an adapter call; running out of time is `Unavailable`.
pub async fn time_boxed<T, F>(limit: Millis, call: F) -> AdapterResult<T>
where
    F: Future<Output = AdapterResult<T>>,
{
    match tokio::time::timeout(Duration::from(limit), call).await {
        Ok(result) => result,
        Err(_) => AdapterResult::Unavailable(format!("timed out after {}", limit)),
    }
}

/// Shared mapping of transport failures: timeouts, connection failures and
/// non-success statuses all mean the source is unavailable.
pub(crate) fn unavailable_from(err: reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if let Some(status) = err.status() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("request failed: {}", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_becomes_unavailable() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            AdapterResult::Value(1)
        };
        let r = time_boxed(Millis::from_millis(500), slow).await;
        assert_eq!(r, AdapterResult::Unavailable("timed out after 500 ms".to_string()));
        assert!(r.value().is_none());
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let r = time_boxed(Millis::from_millis(500), async { AdapterResult::Value(7) }).await;
        assert_eq!(r.value(), Some(&7));
    }

    #[tokio::test]
    async fn disabled_is_unavailable() {
        let url = Url::parse("https://example.com/").unwrap();
        let r = MarkupValidator::validate(&Disabled, &url, b"<html></html>").await;
        assert_eq!(r.reason(), Some("disabled"));
        assert!(!r.is_value());
    }
}
