//! Aggregate Views
//!
//! コンパイル済み述語を各集計クエリに埋め込むビュー群。
//! すべてのフィルタ付きビューは同じFROM句と同じコンパイラを通るため、
//! 同一のFilterSpecに対して各パネルの母集団は一致する。

use crate::analytics::RideRecord;
use crate::error::Result;
use crate::filter::{CompiledFilter, FilterCompiler, FilterSpec, TimeOfDay};
use crate::handlers::database::types::{DatabaseError, QueryResult, RowReader, SqlDialect, Value};
use crate::handlers::database::RideStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// フィルタ付きビュー共通のFROM句（乗車・降車ゾーンを結合）
const JOINED_TRIPS: &str = "FROM trips t \
     JOIN zones pz ON t.pickup_zone_id = pz.zone_id \
     JOIN zones dz ON t.dropoff_zone_id = dz.zone_id";

pub const HOURS_PER_DAY: usize = 24;

/// 実行可能なSQLとパラメータ
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// ルート別件数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteCount {
    pub pickup_zone_id: i64,
    pub dropoff_zone_id: i64,
    pub trip_count: i64,
}

/// 区×時ヒートマップのセル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub borough: String,
    pub hour: u32,
    pub trip_count: i64,
    pub passenger_count: i64,
}

/// 日別件数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    /// ISO日付
    pub day: String,
    pub trip_count: i64,
}

/// 件数と平均
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripTotals {
    pub total_trips: i64,
    pub avg_fare: Option<f64>,
    pub avg_distance: Option<f64>,
}

/// 一覧の1行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripListing {
    pub trip_id: i64,
    pub pickup_datetime: String,
    pub time_of_day: Option<TimeOfDay>,
    pub pickup_zone: String,
    pub pickup_borough: String,
    pub dropoff_zone: String,
    pub dropoff_borough: String,
    pub passenger_count: Option<i64>,
    pub trip_distance: f64,
    pub fare_amount: f64,
}

/// ゾーン単位の統計
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStats {
    pub zone_id: i64,
    pub zone_name: String,
    pub borough: String,
    pub total_trips: i64,
    pub avg_fare: Option<f64>,
    pub avg_distance: Option<f64>,
    pub avg_tip_percentage: Option<f64>,
    pub avg_speed_mph: Option<f64>,
}

/// ゾーン参照データ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub zone_id: i64,
    pub borough: String,
    pub zone_name: String,
}

/// 一覧のページ指定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// 集計ビュー
#[derive(Clone)]
pub struct RideViews {
    store: Arc<dyn RideStore>,
    compiler: FilterCompiler,
    route_limit: u32,
}

impl RideViews {
    pub fn new(store: Arc<dyn RideStore>) -> Self {
        let compiler = FilterCompiler::new(store.dialect());
        Self {
            store,
            compiler,
            route_limit: 10,
        }
    }

    /// ルートランキングの上限件数
    pub fn with_route_limit(mut self, limit: u32) -> Self {
        self.route_limit = limit;
        self
    }

    pub fn store(&self) -> &Arc<dyn RideStore> {
        &self.store
    }

    pub fn compile(&self, spec: &FilterSpec) -> CompiledFilter {
        self.compiler.compile(spec)
    }

    async fn run(&self, view: &str, statement: Statement) -> Result<QueryResult> {
        debug!(view, params = statement.params.len(), sql = %statement.sql, "executing view");
        let result = self.store.query(&statement.sql, &statement.params).await?;
        debug!(view, rows = result.rows.len(), elapsed_ms = result.execution_time_ms, "view completed");
        Ok(result)
    }

    /// 件数上位のルート
    pub async fn route_ranking(&self, spec: &FilterSpec) -> Result<Vec<RouteCount>> {
        let filter = self.compile(spec);
        let statement = route_ranking_statement(&filter, self.compiler.dialect(), self.route_limit);
        let result = self.run("route_ranking", statement).await?;

        result
            .rows
            .iter()
            .map(|row| {
                let r = RowReader::new(row);
                Ok(RouteCount {
                    pickup_zone_id: r.i64(0)?,
                    dropoff_zone_id: r.i64(1)?,
                    trip_count: r.i64(2)?,
                })
            })
            .collect()
    }

    /// 区×時のヒートマップ（各区24時間分をゼロ埋め）
    pub async fn heat_map(&self, spec: &FilterSpec) -> Result<Vec<HeatmapCell>> {
        let filter = self.compile(spec);
        let statement = heat_map_statement(&filter, self.compiler.dialect());
        let result = self.run("heat_map", statement).await?;
        Ok(zero_fill_heat_map(&result)?)
    }

    /// 日別件数（昇順）
    pub async fn time_series(&self, spec: &FilterSpec) -> Result<Vec<DailyCount>> {
        let filter = self.compile(spec);
        let result = self.run("time_series", time_series_statement(&filter)).await?;

        result
            .rows
            .iter()
            .map(|row| {
                let r = RowReader::new(row);
                Ok(DailyCount {
                    day: r.string(0)?,
                    trip_count: r.i64(1)?,
                })
            })
            .collect()
    }

    /// フィルタ後の件数・平均運賃・平均距離
    pub async fn filtered_totals(&self, spec: &FilterSpec) -> Result<TripTotals> {
        let filter = self.compile(spec);
        let statement = totals_statement(JOINED_TRIPS, &filter);
        let result = self.run("filtered_totals", statement).await?;
        Ok(read_totals(&result)?)
    }

    /// 市全体の概要。フィルタは意図的に受け取らない
    pub async fn city_overview(&self) -> Result<TripTotals> {
        let statement = totals_statement("FROM trips t", &CompiledFilter::default());
        let result = self.run("city_overview", statement).await?;
        Ok(read_totals(&result)?)
    }

    /// trip_id順の一覧
    pub async fn filtered_listing(&self, spec: &FilterSpec, page: Page) -> Result<Vec<TripListing>> {
        let filter = self.compile(spec);
        let statement = listing_statement(&filter, self.compiler.dialect(), page);
        let result = self.run("filtered_listing", statement).await?;

        result
            .rows
            .iter()
            .map(|row| {
                let r = RowReader::new(row);
                let hour = r.i64(2)?;
                Ok(TripListing {
                    trip_id: r.i64(0)?,
                    pickup_datetime: r.string(1)?,
                    time_of_day: u32::try_from(hour).ok().and_then(TimeOfDay::from_hour),
                    pickup_zone: r.string(3)?,
                    pickup_borough: r.string(4)?,
                    dropoff_zone: r.string(5)?,
                    dropoff_borough: r.string(6)?,
                    passenger_count: r.opt_f64(7)?.map(|v| v as i64),
                    trip_distance: r.f64(8)?,
                    fare_amount: r.f64(9)?,
                })
            })
            .collect()
    }

    /// 乗車ゾーン単位の統計。ゾーンが存在しなければNone
    pub async fn zone_stats(&self, zone_id: i64) -> Result<Option<ZoneStats>> {
        let statement = zone_stats_statement(self.compiler.dialect(), zone_id);
        let result = self.run("zone_stats", statement).await?;

        let Some(row) = result.rows.first() else {
            return Ok(None);
        };
        let r = RowReader::new(row);
        Ok(Some(ZoneStats {
            zone_id: r.i64(0)?,
            zone_name: r.opt_string(1)?.unwrap_or_default(),
            borough: r.opt_string(2)?.unwrap_or_default(),
            total_trips: r.i64(3)?,
            avg_fare: r.opt_f64(4)?,
            avg_distance: r.opt_f64(5)?,
            avg_tip_percentage: r.opt_f64(6)?,
            avg_speed_mph: r.opt_f64(7)?,
        }))
    }

    /// ゾーン参照データ（ID順）
    pub async fn list_zones(&self) -> Result<Vec<Zone>> {
        let statement = Statement {
            sql: "SELECT zone_id, borough, zone_name FROM zones ORDER BY zone_id".to_string(),
            params: Vec::new(),
        };
        let result = self.run("list_zones", statement).await?;

        result
            .rows
            .iter()
            .map(|row| {
                let r = RowReader::new(row);
                Ok(Zone {
                    zone_id: r.i64(0)?,
                    borough: r.opt_string(1)?.unwrap_or_default(),
                    zone_name: r.opt_string(2)?.unwrap_or_default(),
                })
            })
            .collect()
    }

    /// 異常検知用スナップショット（最大limit件、順序不定、フィルタ非依存）
    pub async fn fetch_anomaly_snapshot(&self, limit: u32) -> Result<Vec<RideRecord>> {
        let statement = snapshot_statement(self.compiler.dialect(), limit);
        let result = self.run("fetch_anomaly_snapshot", statement).await?;

        let rides = result
            .rows
            .iter()
            .map(|row| decode_ride(row))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rides)
    }
}

pub fn route_ranking_statement(filter: &CompiledFilter, dialect: SqlDialect, limit: u32) -> Statement {
    let sql = format!(
        "SELECT t.pickup_zone_id, t.dropoff_zone_id, COUNT(*) AS trip_count \
         {} {} \
         GROUP BY t.pickup_zone_id, t.dropoff_zone_id \
         ORDER BY trip_count DESC, t.pickup_zone_id ASC, t.dropoff_zone_id ASC \
         LIMIT {}",
        JOINED_TRIPS,
        filter.where_clause(),
        dialect.placeholder(filter.next_param_index())
    );
    let mut params = filter.params.clone();
    params.push(Value::Int(limit as i64));
    Statement { sql, params }
}

pub fn heat_map_statement(filter: &CompiledFilter, dialect: SqlDialect) -> Statement {
    let sql = format!(
        "SELECT pz.borough AS borough, {} AS hour, COUNT(*) AS trip_count, \
         CAST(SUM(COALESCE(t.passenger_count, 0)) AS BIGINT) AS passenger_count \
         {} {} \
         GROUP BY 1, 2 \
         ORDER BY 1, 2",
        dialect.pickup_hour_expr(),
        JOINED_TRIPS,
        filter.where_clause()
    );
    Statement {
        sql,
        params: filter.params.clone(),
    }
}

pub fn time_series_statement(filter: &CompiledFilter) -> Statement {
    let sql = format!(
        "SELECT CAST(DATE(t.pickup_datetime) AS TEXT) AS day, COUNT(*) AS trip_count \
         {} {} \
         GROUP BY 1 \
         ORDER BY 1 ASC",
        JOINED_TRIPS,
        filter.where_clause()
    );
    Statement {
        sql,
        params: filter.params.clone(),
    }
}

pub fn totals_statement(from: &str, filter: &CompiledFilter) -> Statement {
    let sql = format!(
        "SELECT COUNT(*) AS total_trips, \
         CAST(AVG(t.fare_amount) AS DOUBLE PRECISION) AS avg_fare, \
         CAST(AVG(t.trip_distance) AS DOUBLE PRECISION) AS avg_distance \
         {} {}",
        from,
        filter.where_clause()
    );
    Statement {
        sql,
        params: filter.params.clone(),
    }
}

pub fn listing_statement(filter: &CompiledFilter, dialect: SqlDialect, page: Page) -> Statement {
    let limit_index = filter.next_param_index();
    let sql = format!(
        "SELECT t.trip_id, CAST(t.pickup_datetime AS TEXT) AS pickup_datetime, {} AS pickup_hour, \
         pz.zone_name AS pickup_zone, pz.borough AS pickup_borough, \
         dz.zone_name AS dropoff_zone, dz.borough AS dropoff_borough, \
         CAST(t.passenger_count AS BIGINT) AS passenger_count, \
         CAST(t.trip_distance AS DOUBLE PRECISION) AS trip_distance, \
         CAST(t.fare_amount AS DOUBLE PRECISION) AS fare_amount \
         {} {} \
         ORDER BY t.trip_id ASC \
         LIMIT {} OFFSET {}",
        dialect.pickup_hour_expr(),
        JOINED_TRIPS,
        filter.where_clause(),
        dialect.placeholder(limit_index),
        dialect.placeholder(limit_index + 1)
    );
    let mut params = filter.params.clone();
    params.push(Value::Int(page.limit as i64));
    params.push(Value::Int(page.offset as i64));
    Statement { sql, params }
}

pub fn zone_stats_statement(dialect: SqlDialect, zone_id: i64) -> Statement {
    let sql = format!(
        "SELECT z.zone_id, z.zone_name, z.borough, COUNT(t.trip_id) AS total_trips, \
         CAST(AVG(t.fare_amount) AS DOUBLE PRECISION) AS avg_fare, \
         CAST(AVG(t.trip_distance) AS DOUBLE PRECISION) AS avg_distance, \
         CAST(AVG(df.tip_percentage) AS DOUBLE PRECISION) AS avg_tip_percentage, \
         CAST(AVG(df.trip_speed_mph) AS DOUBLE PRECISION) AS avg_speed_mph \
         FROM zones z \
         LEFT JOIN trips t ON t.pickup_zone_id = z.zone_id \
         LEFT JOIN derived_features df ON df.trip_id = t.trip_id \
         WHERE z.zone_id = {} \
         GROUP BY z.zone_id, z.zone_name, z.borough",
        dialect.placeholder(1)
    );
    Statement {
        sql,
        params: vec![Value::Int(zone_id)],
    }
}

pub fn snapshot_statement(dialect: SqlDialect, limit: u32) -> Statement {
    let sql = format!(
        "SELECT t.trip_id, t.pickup_zone_id, pz.zone_name AS pickup_zone, \
         CAST(t.fare_amount AS DOUBLE PRECISION) AS fare_amount, \
         CAST(t.trip_distance AS DOUBLE PRECISION) AS trip_distance, \
         CAST(df.trip_speed_mph AS DOUBLE PRECISION) AS speed_mph, \
         CAST(df.trip_duration_minutes AS DOUBLE PRECISION) AS duration_minutes \
         FROM trips t \
         JOIN derived_features df ON df.trip_id = t.trip_id \
         JOIN zones pz ON t.pickup_zone_id = pz.zone_id \
         WHERE df.trip_speed_mph > 0 AND t.trip_distance > 0 AND t.fare_amount > 0 \
         LIMIT {}",
        dialect.placeholder(1)
    );
    Statement {
        sql,
        params: vec![Value::Int(limit as i64)],
    }
}

fn read_totals(result: &QueryResult) -> std::result::Result<TripTotals, DatabaseError> {
    let row = result
        .rows
        .first()
        .ok_or_else(|| DatabaseError::ConversionError("aggregate returned no row".to_string()))?;
    let r = RowReader::new(row);
    Ok(TripTotals {
        total_trips: r.i64(0)?,
        avg_fare: r.opt_f64(1)?,
        avg_distance: r.opt_f64(2)?,
    })
}

/// 欠けた時間帯を0で埋め、区の昇順・時の昇順で返す
fn zero_fill_heat_map(result: &QueryResult) -> std::result::Result<Vec<HeatmapCell>, DatabaseError> {
    let mut grid: BTreeMap<String, [(i64, i64); HOURS_PER_DAY]> = BTreeMap::new();

    for row in &result.rows {
        let r = RowReader::new(row);
        let borough = r.opt_string(0)?.unwrap_or_else(|| "Unknown".to_string());
        let hour = r.i64(1)?;
        let Some(slot) = usize::try_from(hour).ok().filter(|h| *h < HOURS_PER_DAY) else {
            warn!(hour, borough = %borough, "heatmap hour out of range, dropping row");
            continue;
        };

        let cells = grid.entry(borough).or_insert([(0, 0); HOURS_PER_DAY]);
        cells[slot].0 += r.i64(2)?;
        cells[slot].1 += r.opt_f64(3)?.map(|v| v as i64).unwrap_or(0);
    }

    Ok(grid
        .into_iter()
        .flat_map(|(borough, cells)| {
            cells
                .into_iter()
                .enumerate()
                .map(move |(hour, (trip_count, passenger_count))| HeatmapCell {
                    borough: borough.clone(),
                    hour: hour as u32,
                    trip_count,
                    passenger_count,
                })
        })
        .collect())
}

fn decode_ride(row: &[Value]) -> std::result::Result<RideRecord, DatabaseError> {
    let r = RowReader::new(row);
    Ok(RideRecord {
        trip_id: r.i64(0)?,
        pickup_zone_id: r.i64(1)?,
        pickup_zone: r.string(2)?,
        fare_amount: r.f64(3)?,
        trip_distance: r.f64(4)?,
        speed_mph: r.f64(5)?,
        duration_minutes: r.f64(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::compile;

    fn result(rows: Vec<Vec<Value>>) -> QueryResult {
        QueryResult {
            columns: Vec::new(),
            rows,
            execution_time_ms: 0,
        }
    }

    #[test]
    fn test_route_limit_follows_filter_params() {
        let filter = compile(&FilterSpec::new().with_fare_range(Some(10.0), Some(40.0)));
        let statement = route_ranking_statement(&filter, SqlDialect::Postgres, 10);

        assert!(statement
            .sql
            .contains("WHERE t.fare_amount >= $1 AND t.fare_amount <= $2"));
        assert!(statement.sql.ends_with("LIMIT $3"));
        assert_eq!(
            statement.params,
            vec![Value::Float(10.0), Value::Float(40.0), Value::Int(10)]
        );
    }

    #[test]
    fn test_unfiltered_views_have_no_where() {
        let filter = compile(&FilterSpec::new());
        for statement in [
            heat_map_statement(&filter, SqlDialect::Postgres),
            time_series_statement(&filter),
            totals_statement(JOINED_TRIPS, &filter),
        ] {
            assert!(!statement.sql.contains("WHERE"));
            assert!(statement.params.is_empty());
        }
    }

    #[test]
    fn test_every_view_embeds_identical_predicate() {
        let spec = FilterSpec::new()
            .with_boroughs(["Manhattan"])
            .with_time_of_day("morning");
        let filter = compile(&spec);
        let predicate = filter.predicate();

        let statements = [
            route_ranking_statement(&filter, SqlDialect::Postgres, 10),
            heat_map_statement(&filter, SqlDialect::Postgres),
            time_series_statement(&filter),
            totals_statement(JOINED_TRIPS, &filter),
            listing_statement(&filter, SqlDialect::Postgres, Page::default()),
        ];
        for statement in statements {
            assert!(statement.sql.contains(&predicate));
            assert_eq!(&statement.params[..filter.params.len()], &filter.params[..]);
        }
    }

    #[test]
    fn test_listing_pages_after_filter_params() {
        let filter = compile(&FilterSpec::new().with_zone_ids([161]));
        let statement = listing_statement(
            &filter,
            SqlDialect::Sqlite,
            Page {
                limit: 25,
                offset: 50,
            },
        );

        assert!(statement.sql.contains("ORDER BY t.trip_id ASC"));
        assert!(statement.sql.ends_with("LIMIT ?3 OFFSET ?4"));
        assert_eq!(&statement.params[2..], &[Value::Int(25), Value::Int(50)]);
    }

    #[test]
    fn test_zero_fill_produces_24_hours_per_borough() {
        let rows = vec![
            vec![Value::from("Queens"), Value::Int(8), Value::Int(3), Value::Int(4)],
            vec![Value::from("Bronx"), Value::Int(23), Value::Int(1), Value::Int(1)],
            vec![Value::from("Queens"), Value::Int(0), Value::Int(2), Value::Int(2)],
        ];
        let cells = zero_fill_heat_map(&result(rows)).unwrap();

        assert_eq!(cells.len(), 2 * HOURS_PER_DAY);
        assert!(cells[..24].iter().all(|c| c.borough == "Bronx"));
        assert!(cells[24..].iter().all(|c| c.borough == "Queens"));
        for (i, cell) in cells[24..].iter().enumerate() {
            assert_eq!(cell.hour as usize, i);
        }
        assert_eq!(cells[23].trip_count, 1);
        assert_eq!(cells[24].trip_count, 2);
        assert_eq!(cells[24 + 8].passenger_count, 4);
        assert_eq!(cells[24 + 9].trip_count, 0);
    }

    #[test]
    fn test_zero_fill_drops_out_of_range_hours() {
        let rows = vec![vec![Value::from("Queens"), Value::Int(24), Value::Int(3), Value::Int(4)]];
        assert!(zero_fill_heat_map(&result(rows)).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_ride_row_is_conversion_error() {
        let row = vec![
            Value::Int(1),
            Value::Int(4),
            Value::from("Alphabet City"),
            Value::Null,
            Value::Float(1.0),
            Value::Float(12.0),
            Value::Float(5.0),
        ];
        assert!(matches!(
            decode_ride(&row),
            Err(DatabaseError::ConversionError(_))
        ));
    }

    #[test]
    fn test_totals_with_null_averages() {
        let rows = vec![vec![Value::Int(0), Value::Null, Value::Null]];
        let totals = read_totals(&result(rows)).unwrap();
        assert_eq!(totals.total_trips, 0);
        assert_eq!(totals.avg_fare, None);
    }
}
