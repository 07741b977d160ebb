//! Analytics Module
//!
//! 統計処理・異常検知

pub mod anomaly;
pub mod stats;

pub use anomaly::{detect_anomalies, AnomalyDetector, AnomalyReport, DetectorConfig, RideRecord};
pub use stats::Summary;
