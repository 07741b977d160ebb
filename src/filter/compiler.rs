//! Filter Compiler
//!
//! FilterSpecをパラメータ化された述語へ変換する。I/Oなし。
//!
//! 述語は各集計ビューで共通に使われ、節の順序とパラメータの順序は常に一致する。
//! プレースホルダ番号は畳み込みの途中結果（それまでのパラメータ数）から決まるので、
//! 呼び出し間で状態は共有されない。

use super::spec::FilterSpec;
use crate::handlers::database::types::{SqlDialect, Value};
use chrono::Days;

/// 集計ビューが前提とするFROM句のカラム
pub mod columns {
    pub const FARE: &str = "t.fare_amount";
    pub const PICKUP_AT: &str = "t.pickup_datetime";
    pub const PICKUP_ZONE: &str = "t.pickup_zone_id";
    pub const DROPOFF_ZONE: &str = "t.dropoff_zone_id";
    pub const PICKUP_BOROUGH: &str = "pz.borough";
    pub const DROPOFF_BOROUGH: &str = "dz.borough";
}

/// コンパイル済みフィルタ
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    /// ANDで結合される条件
    pub clauses: Vec<String>,
    /// 位置パラメータ（節の出現順）
    pub params: Vec<Value>,
}

impl CompiledFilter {
    pub fn is_universal(&self) -> bool {
        self.clauses.is_empty()
    }

    /// 述語本体。節がなければ全件一致
    pub fn predicate(&self) -> String {
        if self.clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }

    /// "WHERE ..." または空文字列
    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.predicate())
        }
    }

    /// フィルタの後ろに追加するパラメータの番号（1始まり）
    pub fn next_param_index(&self) -> usize {
        self.params.len() + 1
    }

    fn push(mut self, fragment: Fragment, dialect: SqlDialect) -> Self {
        let base = self.params.len();
        let clause = fragment.render(|offset| dialect.placeholder(base + offset + 1));
        self.clauses.push(clause);
        self.params.extend(fragment.into_params());
        self
    }
}

/// 一つの節とそのパラメータ
#[derive(Debug, Clone)]
enum Fragment {
    /// `column op ?`
    Compare {
        column: String,
        op: &'static str,
        value: Value,
    },
    /// `(pickup IN (...) OR dropoff IN (...))`
    EitherEndpointIn {
        pickup: &'static str,
        dropoff: &'static str,
        values: Vec<Value>,
    },
}

impl Fragment {
    fn render(&self, placeholder: impl Fn(usize) -> String) -> String {
        match self {
            Fragment::Compare { column, op, .. } => {
                format!("{} {} {}", column, op, placeholder(0))
            }
            Fragment::EitherEndpointIn {
                pickup,
                dropoff,
                values,
            } => {
                let n = values.len();
                let pickup_list = (0..n).map(&placeholder).collect::<Vec<_>>().join(", ");
                let dropoff_list = (n..2 * n).map(&placeholder).collect::<Vec<_>>().join(", ");
                format!(
                    "({} IN ({}) OR {} IN ({}))",
                    pickup, pickup_list, dropoff, dropoff_list
                )
            }
        }
    }

    fn into_params(self) -> Vec<Value> {
        match self {
            Fragment::Compare { value, .. } => vec![value],
            // 乗車側と降車側でそれぞれ実体化する
            Fragment::EitherEndpointIn { values, .. } => {
                let mut params = values.clone();
                params.extend(values);
                params
            }
        }
    }
}

/// フィルタコンパイラ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCompiler {
    dialect: SqlDialect,
}

impl FilterCompiler {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// 仕様を述語へコンパイル
    pub fn compile(&self, spec: &FilterSpec) -> CompiledFilter {
        self.fragments(spec)
            .into_iter()
            .fold(CompiledFilter::default(), |acc, fragment| {
                acc.push(fragment, self.dialect)
            })
    }

    fn fragments(&self, spec: &FilterSpec) -> Vec<Fragment> {
        let mut fragments = Vec::new();

        if !spec.boroughs.is_empty() {
            fragments.push(Fragment::EitherEndpointIn {
                pickup: columns::PICKUP_BOROUGH,
                dropoff: columns::DROPOFF_BOROUGH,
                values: spec.boroughs.iter().cloned().map(Value::String).collect(),
            });
        }

        if !spec.zone_ids.is_empty() {
            fragments.push(Fragment::EitherEndpointIn {
                pickup: columns::PICKUP_ZONE,
                dropoff: columns::DROPOFF_ZONE,
                values: spec.zone_ids.iter().copied().map(Value::Int).collect(),
            });
        }

        if let Some(min) = spec.fare_min.filter(|v| v.is_finite()) {
            fragments.push(compare(columns::FARE, ">=", Value::Float(min)));
        }

        if let Some(max) = spec.fare_max.filter(|v| v.is_finite()) {
            fragments.push(compare(columns::FARE, "<=", Value::Float(max)));
        }

        if let Some(start) = spec.start_date {
            fragments.push(compare(columns::PICKUP_AT, ">=", Value::Date(start)));
        }

        // 翌日0時未満で終了日を丸ごと含める
        if let Some(next_day) = spec.end_date.and_then(|end| end.checked_add_days(Days::new(1))) {
            fragments.push(compare(columns::PICKUP_AT, "<", Value::Date(next_day)));
        }

        if let Some(bucket) = spec.time_of_day.as_ref().and_then(|t| t.bucket()) {
            let (start, end) = bucket.hour_range();
            let hour = self.dialect.pickup_hour_expr();
            fragments.push(compare(hour, ">=", Value::Int(start as i64)));
            fragments.push(compare(hour, "<", Value::Int(end as i64)));
        }

        fragments
    }
}

fn compare(column: &str, op: &'static str, value: Value) -> Fragment {
    Fragment::Compare {
        column: column.to_string(),
        op,
        value,
    }
}

/// PostgreSQL方言でコンパイル
pub fn compile(spec: &FilterSpec) -> CompiledFilter {
    FilterCompiler::default().compile(spec)
}
