//! One grading run: fetch, extract, query adapters, analyze, aggregate.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::adapters::{
    self, AdapterResult, Disabled, MarkupValidator, NuValidator, PageSpeedProbe, PerformanceProbe,
};
use crate::analyzers::{self, AnalyzerInputs};
use crate::config::Settings;
use crate::error::{ConfigError, FetchError, GradeError, GradeResult};
use crate::extract;
use crate::fetch::budget::OutboundBudget;
use crate::fetch::{policy, HttpFetcher, PageSource};
use crate::report::{self, CompositeReport};
use crate::scoring::{self, WeightTable};
use crate::units::Millis;

/// Grades URLs. Holds the run-independent pieces: the weight table, the
/// page source and both adapters. Cheap to share across tasks.
pub struct Grader {
    weights: WeightTable,
    adapter_timeout: Millis,
    source: Arc<dyn PageSource>,
    validator: Arc<dyn MarkupValidator>,
    probe: Arc<dyn PerformanceProbe>,
}

impl Grader {
    /// Validates the settings and wires the HTTP fetcher and adapters to
    /// a fresh outbound budget. No network I/O happens here.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Grader::with_budget(settings, Arc::new(OutboundBudget::new(&settings.budget)))
    }

    /// Like [`Grader::from_settings`], sharing `budget` with other clients.
    pub fn with_budget(settings: &Settings, budget: Arc<OutboundBudget>) -> Result<Self, ConfigError> {
        settings.validate()?;
        let weights = settings.weight_table()?;
        let source = HttpFetcher::new(settings.fetch.clone(), Arc::clone(&budget))?;

        let cfg = &settings.adapters;
        let client = reqwest::Client::builder()
            .user_agent(settings.fetch.user_agent.clone())
            .timeout(Duration::from(cfg.timeout()))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("adapter HTTP client: {}", e)))?;

        let validator: Arc<dyn MarkupValidator> = if cfg.validator_enabled {
            let endpoint = parse_endpoint("adapters.validator_endpoint", &cfg.validator_endpoint)?;
            Arc::new(NuValidator::new(client.clone(), endpoint, Arc::clone(&budget)))
        } else {
            Arc::new(Disabled)
        };
        let probe: Arc<dyn PerformanceProbe> = if cfg.pagespeed_enabled {
            let endpoint = parse_endpoint("adapters.pagespeed_endpoint", &cfg.pagespeed_endpoint)?;
            Arc::new(PageSpeedProbe::new(client, endpoint, cfg.pagespeed_api_key.clone(), budget))
        } else {
            Arc::new(Disabled)
        };

        Ok(Grader::with_components(weights, cfg.timeout(), Arc::new(source), validator, probe))
    }

    pub fn with_components(
        weights: WeightTable,
        adapter_timeout: Millis,
        source: Arc<dyn PageSource>,
        validator: Arc<dyn MarkupValidator>,
        probe: Arc<dyn PerformanceProbe>,
    ) -> Self {
        Grader {
            weights,
            adapter_timeout,
            source,
            validator,
            probe,
        }
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    /// Grade one URL. Dropping the returned future abandons the run and
    /// every request it has in flight.
    pub async fn grade(&self, url: &str) -> GradeResult<CompositeReport> {
        let target = Url::parse(url.trim())
            .map_err(|e| FetchError::Unreachable(format!("invalid URL {:?}: {}", url, e)))?;
        policy::check_url(&target)?;

        let started = Instant::now();
        info!(url = %target, "grading");

        let site = self.source.fetch_site(&target).await?;
        let (bundle, site) = join_blocking(tokio::task::spawn_blocking(move || {
            let bundle = extract::extract(&site);
            (bundle, site)
        }))
        .await?;
        let bundle = Arc::new(bundle);
        let page_url = site.page.final_url.clone();
        let html = site.page.body;

        let local_bundle = Arc::clone(&bundle);
        let local = tokio::task::spawn_blocking(move || analyzers::run_local(&local_bundle));

        let (validation, performance) = tokio::join!(
            adapters::time_boxed(self.adapter_timeout, self.validator.validate(&page_url, &html)),
            adapters::time_boxed(self.adapter_timeout, self.probe.measure(&page_url)),
        );
        log_adapter("validator", &page_url, &validation);
        log_adapter("performance", &page_url, &performance);

        let mut factors = join_blocking(local).await?;
        let backed = tokio::task::spawn_blocking(move || {
            let inputs = AnalyzerInputs {
                bundle: &bundle,
                validation: &validation,
                performance: &performance,
            };
            analyzers::run_adapter_backed(&inputs)
        });
        factors.extend(join_blocking(backed).await?);
        factors.sort_by_key(|f| f.factor);

        let aggregate = scoring::aggregate(&self.weights, &factors);
        let report = report::assemble(target.as_str(), Utc::now(), factors, aggregate);
        info!(
            url = %target,
            composite = report.composite_score(),
            band = %report.status_band(),
            confidence = ?report.confidence(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "graded"
        );
        Ok(report)
    }

    /// Like [`Grader::grade`], abandoned as soon as `cancel` resolves.
    pub async fn grade_until<C>(&self, url: &str, cancel: C) -> GradeResult<CompositeReport>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                info!(url, "grading cancelled");
                Err(GradeError::Cancelled)
            }
            result = self.grade(url) => result,
        }
    }
}

/// Grade with settings from the default file and environment.
pub async fn grade_website(url: &str) -> GradeResult<CompositeReport> {
    let settings = Settings::load(None)?;
    Grader::from_settings(&settings)?.grade(url).await
}

fn parse_endpoint(key: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid(format!("{}: {}", key, e)))
}

fn log_adapter<T>(adapter: &str, url: &Url, result: &AdapterResult<T>) {
    match result {
        AdapterResult::Value(_) => debug!(adapter, url = %url, "adapter answered"),
        AdapterResult::Unavailable(reason) => warn!(adapter, url = %url, reason = %reason, "adapter unavailable"),
        AdapterResult::Error(cause) => warn!(adapter, url = %url, cause = %cause, "adapter error"),
    }
}

/// Analyzer panics are bugs and surface as panics; a task torn down by
/// runtime shutdown counts as cancellation.
async fn join_blocking<T>(handle: JoinHandle<T>) -> GradeResult<T> {
    match handle.await {
        Ok(v) => Ok(v),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(GradeError::Cancelled),
    }
}
