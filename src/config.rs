//! Layered settings: built-in defaults, an optional TOML file, then
//! `GRADER_*` environment variables (`__` separates nesting levels).

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::analyzers::FactorId;
use crate::error::ConfigError;
use crate::scoring::WeightTable;
use crate::units::Millis;

const DEFAULT_FILE: &str = "site_grader";
const ENV_PREFIX: &str = "GRADER";
pub const MAX_REDIRECT_HOPS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub fetch: FetchSettings,
    pub adapters: AdapterSettings,
    pub budget: BudgetSettings,
    pub weights: WeightSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_ms: u64,
    pub aux_timeout_ms: u64,
    pub max_bytes: u64,
    pub max_redirects: usize,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdapterSettings {
    pub timeout_ms: u64,
    pub validator_enabled: bool,
    pub validator_endpoint: String,
    pub pagespeed_enabled: bool,
    pub pagespeed_endpoint: String,
    pub pagespeed_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetSettings {
    pub max_concurrent_requests: usize,
    pub per_host_interval_ms: u64,
    pub queue_timeout_ms: u64,
}

/// Raw factor weights as they appear in configuration. Turned into a
/// validated [`WeightTable`] by [`Settings::weight_table`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeightSettings {
    pub technical: f64,
    pub content: f64,
    pub ai_readiness: f64,
    pub schema: f64,
    pub performance: f64,
    pub mobile: f64,
    pub authority: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            fetch: FetchSettings::default(),
            adapters: AdapterSettings::default(),
            budget: BudgetSettings::default(),
            weights: WeightSettings::default(),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            timeout_ms: 15_000,
            aux_timeout_ms: 5_000,
            max_bytes: 5 * 1024 * 1024,
            max_redirects: MAX_REDIRECT_HOPS,
            user_agent: concat!("site_grader/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for AdapterSettings {
    fn default() -> Self {
        AdapterSettings {
            timeout_ms: 30_000,
            validator_enabled: true,
            validator_endpoint: "https://validator.w3.org/nu/".to_string(),
            pagespeed_enabled: true,
            pagespeed_endpoint: "https://www.googleapis.com/pagespeedonline/v5/runPagespeed"
                .to_string(),
            pagespeed_api_key: None,
        }
    }
}

impl Default for BudgetSettings {
    fn default() -> Self {
        BudgetSettings {
            max_concurrent_requests: 16,
            per_host_interval_ms: 250,
            queue_timeout_ms: 30_000,
        }
    }
}

impl Default for WeightSettings {
    fn default() -> Self {
        WeightSettings {
            technical: 0.18,
            content: 0.18,
            ai_readiness: 0.15,
            schema: 0.12,
            performance: 0.13,
            mobile: 0.12,
            authority: 0.12,
        }
    }
}

impl WeightSettings {
    pub fn get(&self, factor: FactorId) -> f64 {
        match factor {
            FactorId::Technical => self.technical,
            FactorId::Content => self.content,
            FactorId::AiReadiness => self.ai_readiness,
            FactorId::Schema => self.schema,
            FactorId::Performance => self.performance,
            FactorId::Mobile => self.mobile,
            FactorId::Authority => self.authority,
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Millis {
        Millis::from_millis(self.timeout_ms)
    }

    pub fn aux_timeout(&self) -> Millis {
        Millis::from_millis(self.aux_timeout_ms)
    }
}

impl AdapterSettings {
    pub fn timeout(&self) -> Millis {
        Millis::from_millis(self.timeout_ms)
    }
}

impl Settings {
    /// Load settings from defaults, `site_grader.toml` (or `path` when
    /// given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.max_redirects > MAX_REDIRECT_HOPS {
            return Err(ConfigError::RedirectLimit(self.fetch.max_redirects));
        }
        if self.fetch.max_bytes == 0 {
            return Err(ConfigError::Invalid("fetch.max_bytes must be positive".into()));
        }
        if self.budget.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "budget.max_concurrent_requests must be positive".into(),
            ));
        }
        self.weight_table().map(|_| ())
    }

    pub fn weight_table(&self) -> Result<WeightTable, ConfigError> {
        WeightTable::new(FactorId::ALL.map(|f| (f, self.weights.get(f))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.fetch.max_redirects, 5);
    }

    #[test]
    fn redirect_cap_enforced() {
        let mut s = Settings::default();
        s.fetch.max_redirects = 9;
        assert!(matches!(s.validate(), Err(ConfigError::RedirectLimit(9))));
    }

    #[test]
    fn bad_weights_rejected() {
        let mut s = Settings::default();
        s.weights.mobile = 0.5;
        assert!(matches!(s.validate(), Err(ConfigError::WeightSum { .. })));
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let s = Settings::load(None).unwrap();
        assert_eq!(s.weights, WeightSettings::default());
    }
}
