//! Anomaly Detection Types
//!
//! 異常検知用の型定義。JSONのフィールド名は既存クライアントとの互換のため固定

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 分析対象の乗車記録（速度・所要時間は算出済み）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideRecord {
    pub trip_id: i64,
    pub pickup_zone_id: i64,
    pub pickup_zone: String,
    pub fare_amount: f64,
    pub trip_distance: f64,
    pub speed_mph: f64,
    pub duration_minutes: f64,
}

impl RideRecord {
    /// 運賃・距離・速度がすべて正なら分析対象
    pub fn is_eligible(&self) -> bool {
        [self.fare_amount, self.trip_distance, self.speed_mph]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

/// 異常分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    SpeedTooFast,
    SpeedTooSlow,
    FareTooHigh,
    FareTooLow,
}

/// 速度異常
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedAnomaly {
    pub trip_id: i64,
    pub speed_mph: f64,
    pub trip_distance: f64,
    pub duration_minutes: f64,
    pub pickup_zone: String,
    #[serde(rename = "zScore")]
    pub z_score: f64,
    #[serde(rename = "anomalyType")]
    pub anomaly_type: AnomalyType,
    pub reason: String,
}

/// 運賃異常
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareAnomaly {
    pub trip_id: i64,
    pub fare_amount: f64,
    pub trip_distance: f64,
    pub pickup_zone: String,
    #[serde(rename = "zScore")]
    pub z_score: f64,
    #[serde(rename = "anomalyType")]
    pub anomaly_type: AnomalyType,
    pub reason: String,
}

/// 判定に使った閾値
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdReport {
    pub mean: f64,
    pub std_dev: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl ThresholdReport {
    pub fn new(mean: f64, std_dev: f64, z_threshold: f64) -> Self {
        Self {
            mean,
            std_dev,
            lower_bound: mean - z_threshold * std_dev,
            upper_bound: mean + z_threshold * std_dev,
        }
    }
}

/// ゾーン別の運賃閾値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneThreshold {
    pub zone_id: i64,
    #[serde(flatten)]
    pub thresholds: ThresholdReport,
    pub trip_count: usize,
}

/// 集計サマリ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalySummary {
    pub total_trips_analyzed: usize,
    pub total_anomalies: usize,
    pub speed_too_fast: usize,
    pub speed_too_slow: usize,
    pub fare_too_high: usize,
    pub fare_too_low: usize,
}

/// 異常検知レポート
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    pub summary: AnomalySummary,
    pub speed_anomalies: Vec<SpeedAnomaly>,
    pub fare_anomalies: Vec<FareAnomaly>,
    /// 対象が0件ならNone
    pub speed_thresholds: Option<ThresholdReport>,
    /// ゾーン名がキー
    pub fare_thresholds_by_zone: BTreeMap<String, ZoneThreshold>,
}
