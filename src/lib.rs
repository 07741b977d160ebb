//! # ride-insights
//!
//! Filtered aggregate views over a static ride table and statistical anomaly detection.
//!
//! A single filter compiler turns a validated filter selection into a parameterized predicate
//! that every aggregate view embeds, keeping dashboard panels consistent with one another.
//! The anomaly detector works over a bounded snapshot and flags global speed outliers and
//! per-zone fare outliers.

pub mod analytics;
pub mod config;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod http_server;
pub mod logging;
pub mod views;

pub use analytics::{detect_anomalies, AnomalyDetector, AnomalyReport, DetectorConfig, RideRecord};
pub use error::{Error, Result};
pub use filter::{compile, CompiledFilter, FilterCompiler, FilterSpec, RawFilterQuery, TimeOfDay};
pub use handlers::database::RideStore;
pub use views::RideViews;
