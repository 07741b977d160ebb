//! PostgreSQL Ride Store
//!
//! sqlxの接続プールを使うPostgreSQL実装

use crate::handlers::database::{
    engine::RideStore,
    types::{DatabaseConfig, DatabaseError, QueryResult, SqlDialect, Value},
};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, TypeInfo, ValueRef};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// PostgreSQLストア
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    /// 接続プールを作成
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn bind_params<'q>(
        mut query: Query<'q, Postgres, PgArguments>,
        params: &[Value],
    ) -> Query<'q, Postgres, PgArguments> {
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<i64>),
                Value::Int(i) => query.bind(*i),
                Value::Float(f) => query.bind(*f),
                Value::String(s) => query.bind(s.clone()),
                Value::Date(d) => query.bind(*d),
            };
        }
        query
    }

    /// 行をValueに変換
    fn extract_value(row: &PgRow, idx: usize) -> Result<Value, DatabaseError> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }

        let type_name = row.columns()[idx].type_info().name().to_string();
        let value = match type_name.as_str() {
            "INT2" => Value::Int(row.try_get::<i16, _>(idx)? as i64),
            "INT4" => Value::Int(row.try_get::<i32, _>(idx)? as i64),
            "INT8" => Value::Int(row.try_get::<i64, _>(idx)?),
            "FLOAT4" => Value::Float(row.try_get::<f32, _>(idx)? as f64),
            "FLOAT8" => Value::Float(row.try_get::<f64, _>(idx)?),
            "BOOL" => Value::Int(row.try_get::<bool, _>(idx)? as i64),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => Value::String(row.try_get(idx)?),
            "DATE" => Value::Date(row.try_get(idx)?),
            "TIMESTAMP" => {
                let ts: chrono::NaiveDateTime = row.try_get(idx)?;
                Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string())
            }
            other => {
                // NUMERIC等はクエリ側でCASTしておく
                return Err(DatabaseError::ConversionError(format!(
                    "unsupported column type {} at index {}",
                    other, idx
                )));
            }
        };

        Ok(value)
    }
}

#[async_trait]
impl RideStore for PostgresStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DatabaseError> {
        let start = Instant::now();

        let rows = Self::bind_params(sqlx::query(sql), params)
            .fetch_all(&*self.pool)
            .await?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let mut result_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let values = (0..row.len())
                .map(|idx| Self::extract_value(row, idx))
                .collect::<Result<Vec<_>, _>>()?;
            result_rows.push(values);
        }

        let execution_time_ms = start.elapsed().as_millis() as u64;
        debug!(rows = result_rows.len(), execution_time_ms, "postgres query completed");

        Ok(QueryResult {
            columns,
            rows: result_rows,
            execution_time_ms,
        })
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }
}
