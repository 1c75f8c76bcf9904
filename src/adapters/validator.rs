use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::{unavailable_from, AdapterResult, MarkupValidator};
use crate::fetch::budget::OutboundBudget;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidatorMessage>,
    pub warnings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatorMessage {
    pub message: String,
    pub line: Option<u32>,
}

#[derive(Deserialize)]
struct NuResponse {
    #[serde(default)]
    messages: Vec<NuMessage>,
}

#[derive(Deserialize)]
struct NuMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "subType")]
    sub_type: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(rename = "lastLine")]
    last_line: Option<u32>,
}

/// Nu HTML Checker (`?out=json`) client.
pub struct NuValidator {
    client: reqwest::Client,
    endpoint: Url,
    budget: Arc<OutboundBudget>,
}

impl NuValidator {
    pub fn new(client: reqwest::Client, endpoint: Url, budget: Arc<OutboundBudget>) -> Self {
        NuValidator {
            client,
            endpoint,
            budget,
        }
    }
}

#[async_trait]
impl MarkupValidator for NuValidator {
    async fn validate(&self, page_url: &Url, html: &[u8]) -> AdapterResult<ValidationReport> {
        let host = self.endpoint.host_str().unwrap_or_default().to_string();
        let _permit = match self.budget.acquire(&host).await {
            Ok(p) => p,
            Err(e) => return AdapterResult::Unavailable(e.to_string()),
        };

        let resp = self
            .client
            .post(self.endpoint.clone())
            .query(&[("out", "json")])
            .header(reqwest::header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(html.to_vec())
            .send()
            .await
            .and_then(|r| r.error_for_status());
        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %page_url, error = %e, "markup validator unavailable");
                return AdapterResult::Unavailable(unavailable_from(e));
            }
        };

        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return AdapterResult::Unavailable(unavailable_from(e)),
        };
        match parse_report(&body) {
            Ok(report) => {
                debug!(url = %page_url, errors = report.errors.len(), "validated markup");
                AdapterResult::Value(report)
            }
            Err(e) => AdapterResult::Error(format!("unreadable validator response: {}", e)),
        }
    }
}

/// `type: "error"` and `non-document-error` count as errors; `info` messages
/// with `subType: "warning"` count as warnings.
pub fn parse_report(body: &str) -> Result<ValidationReport, serde_json::Error> {
    let resp: NuResponse = serde_json::from_str(body)?;
    let mut errors = Vec::new();
    let mut warnings = 0;
    for m in resp.messages {
        match m.kind.as_str() {
            "error" | "non-document-error" => errors.push(ValidatorMessage {
                message: m.message,
                line: m.last_line,
            }),
            "info" if m.sub_type.as_deref() == Some("warning") => warnings += 1,
            _ => {}
        }
    }
    Ok(ValidationReport {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_errors_and_warnings() {
        let body = r#"{"messages":[
            {"type":"error","lastLine":12,"message":"Stray end tag div."},
            {"type":"info","subType":"warning","message":"Consider adding a lang attribute."},
            {"type":"info","message":"Trailing slash on void elements."}
        ]}"#;
        let r = parse_report(body).unwrap();
        assert!(!r.is_valid);
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.errors[0].line, Some(12));
        assert_eq!(r.warnings, 1);
    }

    #[test]
    fn no_messages_is_valid() {
        let r = parse_report(r#"{"messages":[]}"#).unwrap();
        assert!(r.is_valid);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_report("<html>rate limited</html>").is_err());
    }
}
