//! Filter Specification
//!
//! ユーザーのフィルタ選択を正規化した型と、境界での検証処理

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// 時間帯バケット
///
/// 各バケットは半開区間 [start, end) の時を表す
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Early,
    Morning,
    Midday,
    Evening,
    Night,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 5] = [
        TimeOfDay::Early,
        TimeOfDay::Morning,
        TimeOfDay::Midday,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ];

    /// 時の半開区間
    pub fn hour_range(&self) -> (u32, u32) {
        match self {
            TimeOfDay::Early => (0, 5),
            TimeOfDay::Morning => (5, 10),
            TimeOfDay::Midday => (10, 16),
            TimeOfDay::Evening => (16, 21),
            TimeOfDay::Night => (21, 24),
        }
    }

    /// キー文字列から解釈。未知のキーはNone
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|bucket| bucket.as_str() == key)
    }

    /// 時(0-23)が属するバケット
    pub fn from_hour(hour: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|bucket| {
            let (start, end) = bucket.hour_range();
            hour >= start && hour < end
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Early => "early",
            TimeOfDay::Morning => "morning",
            TimeOfDay::Midday => "midday",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

/// 時間帯の選択
///
/// 未知のキーはコンパイル時に無視される（fail open）ため、値を保持したまま区別する
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimeOfDaySelection {
    Bucket(TimeOfDay),
    Unrecognized(String),
}

impl TimeOfDaySelection {
    pub fn parse(key: &str) -> Self {
        match TimeOfDay::from_key(key) {
            Some(bucket) => TimeOfDaySelection::Bucket(bucket),
            None => TimeOfDaySelection::Unrecognized(key.to_string()),
        }
    }

    pub fn bucket(&self) -> Option<TimeOfDay> {
        match self {
            TimeOfDaySelection::Bucket(bucket) => Some(*bucket),
            TimeOfDaySelection::Unrecognized(_) => None,
        }
    }
}

/// フィルタ仕様
///
/// すべてのフィールドは省略可能で、省略は「制約なし」を意味する。
/// 集合はBTreeSetで保持するため、同じ選択は常に同じ順序でコンパイルされる。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    /// 乗車・降車どちらかの区に一致
    pub boroughs: BTreeSet<String>,
    /// 乗車・降車どちらかのゾーンに一致
    pub zone_ids: BTreeSet<i64>,
    pub fare_min: Option<f64>,
    pub fare_max: Option<f64>,
    pub start_date: Option<NaiveDate>,
    /// 当日全体を含む
    pub end_date: Option<NaiveDate>,
    pub time_of_day: Option<TimeOfDaySelection>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_boroughs<I, S>(mut self, boroughs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.boroughs = boroughs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_zone_ids<I: IntoIterator<Item = i64>>(mut self, zone_ids: I) -> Self {
        self.zone_ids = zone_ids.into_iter().collect();
        self
    }

    pub fn with_fare_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.fare_min = min;
        self.fare_max = max;
        self
    }

    pub fn with_date_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn with_time_of_day(mut self, key: &str) -> Self {
        self.time_of_day = Some(TimeOfDaySelection::parse(key));
        self
    }

    /// 制約が一つもなければtrue
    pub fn is_unconstrained(&self) -> bool {
        self.boroughs.is_empty()
            && self.zone_ids.is_empty()
            && self.fare_min.is_none()
            && self.fare_max.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.time_of_day.as_ref().and_then(|t| t.bucket()).is_none()
    }
}

/// クエリ文字列由来の未検証フィルタ
///
/// 形の合わない値はエラーにせず捨てる
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFilterQuery {
    /// カンマ区切り
    #[serde(alias = "borough")]
    pub boroughs: Option<String>,
    /// カンマ区切り
    #[serde(alias = "zones", alias = "zone")]
    pub zone_ids: Option<String>,
    pub fare_min: Option<String>,
    pub fare_max: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub time_of_day: Option<String>,
}

impl RawFilterQuery {
    /// クエリ文字列のキーと値の組から構築
    ///
    /// 集合のキーは繰り返しを連結し、スカラーのキーは最後の値を採用する。
    /// 未知のキーは無視する。
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut raw = Self::default();
        for (key, value) in pairs {
            let value = value.into();
            match key.as_ref() {
                "boroughs" | "borough" => append_list(&mut raw.boroughs, value),
                "zoneIds" | "zones" | "zone" => append_list(&mut raw.zone_ids, value),
                "fareMin" => raw.fare_min = Some(value),
                "fareMax" => raw.fare_max = Some(value),
                "startDate" => raw.start_date = Some(value),
                "endDate" => raw.end_date = Some(value),
                "timeOfDay" => raw.time_of_day = Some(value),
                other => debug!(key = other, "ignoring unknown filter key"),
            }
        }
        raw
    }

    /// 検証してFilterSpecに変換
    pub fn into_spec(self) -> FilterSpec {
        let boroughs = split_list(self.boroughs.as_deref())
            .map(str::to_string)
            .collect();

        let zone_ids = split_list(self.zone_ids.as_deref())
            .filter_map(|raw| match raw.parse::<i64>() {
                Ok(id) if id > 0 => Some(id),
                _ => {
                    debug!(value = raw, "dropping malformed zone id");
                    None
                }
            })
            .collect();

        let time_of_day = non_empty(self.time_of_day.as_deref()).map(|key| {
            let selection = TimeOfDaySelection::parse(key);
            if let TimeOfDaySelection::Unrecognized(ref raw) = selection {
                warn!(value = %raw, "unrecognized time of day bucket, no hour constraint applied");
            }
            selection
        });

        FilterSpec {
            boroughs,
            zone_ids,
            fare_min: parse_number(self.fare_min.as_deref(), "fareMin"),
            fare_max: parse_number(self.fare_max.as_deref(), "fareMax"),
            start_date: parse_date(self.start_date.as_deref(), "startDate"),
            end_date: parse_date(self.end_date.as_deref(), "endDate"),
            time_of_day,
        }
    }
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn append_list(slot: &mut Option<String>, value: String) {
    match slot {
        Some(list) => {
            list.push(',');
            list.push_str(&value);
        }
        None => *slot = Some(value),
    }
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_number(raw: Option<&str>, field: &str) -> Option<f64> {
    let raw = non_empty(raw)?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            debug!(field, value = raw, "dropping malformed number");
            None
        }
    }
}

fn parse_date(raw: Option<&str>, field: &str) -> Option<NaiveDate> {
    let raw = non_empty(raw)?;
    // 日時が来た場合は日付部分のみ使う
    let date_part = raw.get(..10).unwrap_or(raw);
    match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(_) => {
            debug!(field, value = raw, "dropping malformed date");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_of_day_buckets_cover_the_day() {
        for hour in 0..24 {
            let bucket = TimeOfDay::from_hour(hour).unwrap();
            let (start, end) = bucket.hour_range();
            assert!(hour >= start && hour < end);
        }
        assert_eq!(TimeOfDay::from_hour(24), None);
        assert_eq!(TimeOfDay::from_hour(4), Some(TimeOfDay::Early));
        assert_eq!(TimeOfDay::from_hour(5), Some(TimeOfDay::Morning));
        assert_eq!(TimeOfDay::from_hour(20), Some(TimeOfDay::Evening));
        assert_eq!(TimeOfDay::from_hour(21), Some(TimeOfDay::Night));
    }

    #[test]
    fn test_time_of_day_key_parsing() {
        assert_eq!(TimeOfDay::from_key("Midday"), Some(TimeOfDay::Midday));
        assert_eq!(TimeOfDay::from_key(" NIGHT "), Some(TimeOfDay::Night));
        assert_eq!(TimeOfDay::from_key("rush"), None);
        for bucket in TimeOfDay::ALL {
            assert_eq!(TimeOfDay::from_key(bucket.as_str()), Some(bucket));
            assert_eq!(
                serde_json::to_value(bucket).unwrap(),
                serde_json::Value::from(bucket.as_str())
            );
        }
        assert_eq!(
            TimeOfDaySelection::parse("rush"),
            TimeOfDaySelection::Unrecognized("rush".to_string())
        );
    }

    #[test]
    fn test_empty_spec_is_unconstrained() {
        assert!(FilterSpec::new().is_unconstrained());
        assert!(FilterSpec::new().with_time_of_day("brunch").is_unconstrained());
        assert!(!FilterSpec::new().with_time_of_day("night").is_unconstrained());
    }

    #[test]
    fn test_raw_query_coerces_and_ignores() {
        let raw = RawFilterQuery {
            boroughs: Some("Manhattan, Bronx,,".to_string()),
            zone_ids: Some("132,abc,-4,0,161".to_string()),
            fare_min: Some("10".to_string()),
            fare_max: Some("lots".to_string()),
            start_date: Some("2019-01-01".to_string()),
            end_date: Some("2019-01-31T00:00:00".to_string()),
            time_of_day: Some("evening".to_string()),
        };

        let spec = raw.into_spec();
        assert_eq!(
            spec.boroughs.iter().collect::<Vec<_>>(),
            vec!["Bronx", "Manhattan"]
        );
        assert_eq!(spec.zone_ids.iter().copied().collect::<Vec<_>>(), vec![132, 161]);
        assert_eq!(spec.fare_min, Some(10.0));
        assert_eq!(spec.fare_max, None);
        assert_eq!(spec.start_date, NaiveDate::from_ymd_opt(2019, 1, 1));
        assert_eq!(spec.end_date, NaiveDate::from_ymd_opt(2019, 1, 31));
        assert_eq!(
            spec.time_of_day,
            Some(TimeOfDaySelection::Bucket(TimeOfDay::Evening))
        );
    }

    #[test]
    fn test_raw_query_blank_fields_are_absent() {
        let raw = RawFilterQuery {
            boroughs: Some("  ".to_string()),
            fare_min: Some("".to_string()),
            start_date: Some("01/02/2019".to_string()),
            ..Default::default()
        };
        assert!(raw.into_spec().is_unconstrained());
    }

    #[test]
    fn test_raw_query_deserializes_aliases() {
        let raw: RawFilterQuery =
            serde_json::from_str(r#"{"borough":"Queens","zones":"1,2","fareMin":"3.5"}"#).unwrap();
        let spec = raw.into_spec();
        assert!(spec.boroughs.contains("Queens"));
        assert_eq!(spec.zone_ids.len(), 2);
        assert_eq!(spec.fare_min, Some(3.5));
    }

    #[test]
    fn test_raw_query_from_repeated_pairs() {
        let pairs = [
            ("boroughs", "Manhattan"),
            ("borough", "Queens,Bronx"),
            ("zone", "4"),
            ("zoneIds", "7"),
            ("fareMin", "10"),
            ("fareMin", "12"),
            ("limit", "abc"),
        ];

        let spec = RawFilterQuery::from_pairs(pairs).into_spec();
        assert_eq!(
            spec.boroughs.iter().collect::<Vec<_>>(),
            vec!["Bronx", "Manhattan", "Queens"]
        );
        assert_eq!(spec.zone_ids.iter().copied().collect::<Vec<_>>(), vec![4, 7]);
        assert_eq!(spec.fare_min, Some(12.0));
        assert_eq!(spec.fare_max, None);
    }
}
