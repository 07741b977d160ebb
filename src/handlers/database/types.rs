//! Database Types and Common Structures
//!
//! ストアとの境界で使用される共通の型定義

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// SQL方言
///
/// プレースホルダ記法と時刻抽出式だけが異なる
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Postgres,
    Sqlite,
}

impl SqlDialect {
    /// 1始まりの位置パラメータを描画
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::Postgres => format!("${}", index),
            SqlDialect::Sqlite => format!("?{}", index),
        }
    }

    /// 乗車時刻から時(0-23)を取り出す式
    pub fn pickup_hour_expr(&self) -> &'static str {
        match self {
            SqlDialect::Postgres => "CAST(EXTRACT(HOUR FROM t.pickup_datetime) AS INTEGER)",
            SqlDialect::Sqlite => "CAST(strftime('%H', t.pickup_datetime) AS INTEGER)",
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlDialect::Postgres => write!(f, "postgres"),
            SqlDialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// ストア接続設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 接続URL (postgres://... または sqlite:...)
    pub url: String,
    /// SQL方言
    pub dialect: SqlDialect,
    /// 最大接続数
    pub max_connections: u32,
    /// 接続タイムアウト（秒）
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://postgres@localhost:5432/nyc_taxi".to_string(),
            dialect: SqlDialect::Postgres,
            max_connections: 10,
            connect_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    /// インメモリSQLite設定（テスト・組み込み用）
    pub fn in_memory_sqlite() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            dialect: SqlDialect::Sqlite,
            max_connections: 1,
            connect_timeout_secs: 5,
        }
    }

    /// 設定を検証
    pub fn validate(&self) -> Result<(), DatabaseError> {
        if self.url.is_empty() {
            return Err(DatabaseError::ConfigurationError(
                "database url cannot be empty".to_string(),
            ));
        }

        let expected_scheme = match self.dialect {
            SqlDialect::Postgres => ["postgres://", "postgresql://"].as_slice(),
            SqlDialect::Sqlite => ["sqlite:"].as_slice(),
        };
        if !expected_scheme.iter().any(|s| self.url.starts_with(s)) {
            return Err(DatabaseError::ConfigurationError(format!(
                "url does not match dialect {}",
                self.dialect
            )));
        }

        if self.max_connections == 0 || self.max_connections > 1000 {
            return Err(DatabaseError::ConfigurationError(format!(
                "max_connections must be 1-1000, got {}",
                self.max_connections
            )));
        }

        Ok(())
    }
}

/// バインド値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// 整数も浮動小数として読む
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

/// クエリ結果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// カラム名
    pub columns: Vec<String>,
    /// 行データ
    pub rows: Vec<Vec<Value>>,
    /// 実行時間（ミリ秒）
    pub execution_time_ms: u64,
}

/// 行アクセス補助
///
/// カラム位置で型付きの値を取り出す。型が合わなければ変換エラー
pub struct RowReader<'a> {
    row: &'a [Value],
}

impl<'a> RowReader<'a> {
    pub fn new(row: &'a [Value]) -> Self {
        Self { row }
    }

    fn get(&self, idx: usize) -> Result<&'a Value, DatabaseError> {
        self.row.get(idx).ok_or_else(|| {
            DatabaseError::ConversionError(format!("missing column at index {}", idx))
        })
    }

    pub fn i64(&self, idx: usize) -> Result<i64, DatabaseError> {
        let value = self.get(idx)?;
        value.as_i64().ok_or_else(|| {
            DatabaseError::ConversionError(format!("expected integer at {}, got {:?}", idx, value))
        })
    }

    pub fn f64(&self, idx: usize) -> Result<f64, DatabaseError> {
        let value = self.get(idx)?;
        value.as_f64().ok_or_else(|| {
            DatabaseError::ConversionError(format!("expected number at {}, got {:?}", idx, value))
        })
    }

    /// NULLはNoneとして返す
    pub fn opt_f64(&self, idx: usize) -> Result<Option<f64>, DatabaseError> {
        if self.get(idx)?.is_null() {
            return Ok(None);
        }
        self.f64(idx).map(Some)
    }

    /// 日付は ISO 形式の文字列として読む
    pub fn string(&self, idx: usize) -> Result<String, DatabaseError> {
        let value = self.get(idx)?;
        if let Value::Date(d) = value {
            return Ok(d.to_string());
        }
        value.as_str().map(str::to_string).ok_or_else(|| {
            DatabaseError::ConversionError(format!("expected text at {}, got {:?}", idx, value))
        })
    }

    pub fn opt_string(&self, idx: usize) -> Result<Option<String>, DatabaseError> {
        if self.get(idx)?.is_null() {
            return Ok(None);
        }
        self.string(idx).map(Some)
    }
}

/// データベースエラー
#[derive(Debug, Clone, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Data conversion error: {0}")]
    ConversionError(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DatabaseError::TimeoutError(err.to_string()),
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                DatabaseError::ConnectionFailed(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseError::ConversionError(err.to_string())
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}
