//! Anomaly Detector Implementation
//!
//! 二段階の外れ値検知
//! - Stage A: 全体の速度分布に対するZスコア
//! - Stage B: 乗車ゾーンごとの運賃分布に対するZスコア

use super::ranking::rank_by_deviation;
use super::types::{
    AnomalyReport, AnomalySummary, AnomalyType, FareAnomaly, RideRecord, SpeedAnomaly,
    ThresholdReport, ZoneThreshold,
};
use crate::analytics::stats::Summary;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// 検知設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// |z| がこれを超えたら異常
    pub z_threshold: f64,
    /// 運賃分析に必要なゾーン内の最小件数
    pub min_zone_trips: usize,
    /// これ未満の標準偏差は分散なしとみなす
    pub variance_epsilon: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            z_threshold: 2.0,
            min_zone_trips: 10,
            variance_epsilon: 1e-9,
        }
    }
}

/// 異常検知器
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: DetectorConfig,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// スナップショットからレポートを生成
    pub fn detect(&self, rides: &[RideRecord]) -> AnomalyReport {
        let eligible: Vec<&RideRecord> = rides.iter().filter(|r| r.is_eligible()).collect();
        if eligible.len() < rides.len() {
            debug!(
                excluded = rides.len() - eligible.len(),
                "excluded ineligible rides from anomaly input"
            );
        }

        let (mut speed_anomalies, speed_thresholds) = self.speed_outliers(&eligible);
        let (mut fare_anomalies, fare_thresholds_by_zone) = self.fare_outliers(&eligible);

        rank_by_deviation(&mut speed_anomalies);
        rank_by_deviation(&mut fare_anomalies);

        let summary = summarize(eligible.len(), &speed_anomalies, &fare_anomalies);
        info!(
            analyzed = summary.total_trips_analyzed,
            anomalies = summary.total_anomalies,
            zones = fare_thresholds_by_zone.len(),
            "anomaly detection completed"
        );

        AnomalyReport {
            summary,
            speed_anomalies,
            fare_anomalies,
            speed_thresholds,
            fare_thresholds_by_zone,
        }
    }

    /// Stage A
    fn speed_outliers(
        &self,
        rides: &[&RideRecord],
    ) -> (Vec<SpeedAnomaly>, Option<ThresholdReport>) {
        let speeds: Vec<f64> = rides.iter().map(|r| r.speed_mph).collect();
        let Some(stats) = Summary::of(&speeds) else {
            return (Vec::new(), None);
        };

        let thresholds = ThresholdReport::new(stats.mean, stats.std_dev, self.config.z_threshold);
        if stats.is_degenerate(self.config.variance_epsilon) {
            debug!(mean = stats.mean, "speed distribution has no variance, skipping");
            return (Vec::new(), Some(thresholds));
        }

        let anomalies = rides
            .iter()
            .filter_map(|ride| {
                let z = stats.z_score(ride.speed_mph);
                let anomaly_type = self.classify(z, AnomalyType::SpeedTooFast, AnomalyType::SpeedTooSlow)?;
                let direction = if z > 0.0 { "above" } else { "below" };
                Some(SpeedAnomaly {
                    trip_id: ride.trip_id,
                    speed_mph: ride.speed_mph,
                    trip_distance: ride.trip_distance,
                    duration_minutes: ride.duration_minutes,
                    pickup_zone: ride.pickup_zone.clone(),
                    z_score: z,
                    anomaly_type,
                    reason: format!(
                        "Speed of {:.1} mph is {:.2} standard deviations {} the mean of {:.1} mph",
                        ride.speed_mph,
                        z.abs(),
                        direction,
                        stats.mean
                    ),
                })
            })
            .collect();

        (anomalies, Some(thresholds))
    }

    /// Stage B
    fn fare_outliers(
        &self,
        rides: &[&RideRecord],
    ) -> (Vec<FareAnomaly>, BTreeMap<String, ZoneThreshold>) {
        let mut fares_by_zone: BTreeMap<i64, (String, Vec<f64>)> = BTreeMap::new();
        for ride in rides {
            fares_by_zone
                .entry(ride.pickup_zone_id)
                .or_insert_with(|| (ride.pickup_zone.clone(), Vec::new()))
                .1
                .push(ride.fare_amount);
        }

        let mut thresholds_by_zone = BTreeMap::new();
        let mut flaggable: HashMap<i64, Summary> = HashMap::new();

        for (zone_id, (zone_name, fares)) in &fares_by_zone {
            if fares.len() < self.config.min_zone_trips {
                debug!(zone_id, trips = fares.len(), "zone below significance floor, skipping");
                continue;
            }
            let Some(stats) = Summary::of(fares) else {
                continue;
            };

            let key = zone_key(&thresholds_by_zone, zone_name, *zone_id);
            thresholds_by_zone.insert(
                key,
                ZoneThreshold {
                    zone_id: *zone_id,
                    thresholds: ThresholdReport::new(
                        stats.mean,
                        stats.std_dev,
                        self.config.z_threshold,
                    ),
                    trip_count: stats.count,
                },
            );

            if stats.is_degenerate(self.config.variance_epsilon) {
                debug!(zone_id, "constant fares in zone, no fare anomalies flagged");
            } else {
                flaggable.insert(*zone_id, stats);
            }
        }

        // 入力順に走査して同値時の順序を保つ
        let anomalies = rides
            .iter()
            .filter_map(|ride| {
                let stats = flaggable.get(&ride.pickup_zone_id)?;
                let z = stats.z_score(ride.fare_amount);
                let anomaly_type = self.classify(z, AnomalyType::FareTooHigh, AnomalyType::FareTooLow)?;
                let direction = if z > 0.0 { "above" } else { "below" };
                Some(FareAnomaly {
                    trip_id: ride.trip_id,
                    fare_amount: ride.fare_amount,
                    trip_distance: ride.trip_distance,
                    pickup_zone: ride.pickup_zone.clone(),
                    z_score: z,
                    anomaly_type,
                    reason: format!(
                        "Fare of ${:.2} is {:.2} standard deviations {} the {} average of ${:.2}",
                        ride.fare_amount,
                        z.abs(),
                        direction,
                        ride.pickup_zone,
                        stats.mean
                    ),
                })
            })
            .collect();

        (anomalies, thresholds_by_zone)
    }

    fn classify(&self, z: f64, high: AnomalyType, low: AnomalyType) -> Option<AnomalyType> {
        if z > self.config.z_threshold {
            Some(high)
        } else if z < -self.config.z_threshold {
            Some(low)
        } else {
            None
        }
    }
}

/// ゾーン名の重複時はIDを付けて区別
fn zone_key(existing: &BTreeMap<String, ZoneThreshold>, zone_name: &str, zone_id: i64) -> String {
    if existing.contains_key(zone_name) {
        format!("{} (#{})", zone_name, zone_id)
    } else {
        zone_name.to_string()
    }
}

fn summarize(
    analyzed: usize,
    speed_anomalies: &[SpeedAnomaly],
    fare_anomalies: &[FareAnomaly],
) -> AnomalySummary {
    let count_speed = |t: AnomalyType| speed_anomalies.iter().filter(|a| a.anomaly_type == t).count();
    let count_fare = |t: AnomalyType| fare_anomalies.iter().filter(|a| a.anomaly_type == t).count();

    AnomalySummary {
        total_trips_analyzed: analyzed,
        total_anomalies: speed_anomalies.len() + fare_anomalies.len(),
        speed_too_fast: count_speed(AnomalyType::SpeedTooFast),
        speed_too_slow: count_speed(AnomalyType::SpeedTooSlow),
        fare_too_high: count_fare(AnomalyType::FareTooHigh),
        fare_too_low: count_fare(AnomalyType::FareTooLow),
    }
}

/// 既定設定で検知
pub fn detect_anomalies(rides: &[RideRecord]) -> AnomalyReport {
    AnomalyDetector::default().detect(rides)
}
