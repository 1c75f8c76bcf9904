//! Website quality grading: fetch a page and its robots.txt and sitemap,
//! extract signals, score seven factors and combine them into one report.

pub mod adapters;
pub mod analyzers;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod grader;
pub mod report;
pub mod scoring;
pub mod units;

pub use analyzers::{Confidence, FactorId, FactorScore, Finding, Severity};
pub use config::Settings;
pub use error::{ConfigError, FetchError, GradeError, GradeResult};
pub use grader::{grade_website, Grader};
pub use report::CompositeReport;
pub use scoring::{StatusBand, WeightTable};
pub use units::Millis;
