//! Anomaly Detection Module
//!
//! 速度・運賃の統計的外れ値検知

mod detector;
mod ranking;
mod types;

pub use detector::{detect_anomalies, AnomalyDetector, DetectorConfig};
pub use ranking::{rank_by_deviation, Deviation};
pub use types::{
    AnomalyReport, AnomalySummary, AnomalyType, FareAnomaly, RideRecord, SpeedAnomaly,
    ThresholdReport, ZoneThreshold,
};
