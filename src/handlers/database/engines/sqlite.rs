//! SQLite Ride Store
//!
//! ローカル実行と結合テストで使う組み込みストア。
//! 値は宣言された型ではなく、実行時のストレージクラスから復元する

use crate::handlers::database::{
    engine::RideStore,
    types::{DatabaseConfig, DatabaseError, QueryResult, SqlDialect, Value},
};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// SQLiteストア
pub struct SqliteStore {
    pool: Arc<SqlitePool>,
}

impl SqliteStore {
    /// 接続プールを作成
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        // :memory: は接続ごとに別DBになるため1本に固定
        let max_connections = if config.url.contains(":memory:") {
            1
        } else {
            config.max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// インメモリストアを作成
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        Self::connect(&DatabaseConfig::in_memory_sqlite()).await
    }

    /// スキーマ作成・データ投入用にSQLスクリプトを実行
    pub async fn execute_script(&self, sql: &str) -> Result<(), DatabaseError> {
        sqlx::raw_sql(sql).execute(&*self.pool).await?;
        Ok(())
    }

    fn bind_params<'q>(
        mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
        params: &[Value],
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<i64>),
                Value::Int(i) => query.bind(*i),
                Value::Float(f) => query.bind(*f),
                Value::String(s) => query.bind(s.clone()),
                // TEXT日時と辞書順で比較できる形式
                Value::Date(d) => query.bind(d.format("%Y-%m-%d").to_string()),
            };
        }
        query
    }

    fn extract_value(row: &SqliteRow, idx: usize) -> Result<Value, DatabaseError> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }

        let storage_class = raw.type_info().name().to_string();
        let value = match storage_class.as_str() {
            "INTEGER" => Value::Int(row.try_get(idx)?),
            "REAL" => Value::Float(row.try_get(idx)?),
            "TEXT" => Value::String(row.try_get(idx)?),
            other => {
                return Err(DatabaseError::ConversionError(format!(
                    "unsupported SQLite storage class {} at index {}",
                    other, idx
                )));
            }
        };

        Ok(value)
    }
}

#[async_trait]
impl RideStore for SqliteStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
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
        debug!(rows = result_rows.len(), execution_time_ms, "sqlite query completed");

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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping() {
        let store = SqliteStore::in_memory().await.unwrap();
        tokio_test::assert_ok!(store.ping().await);
    }

    #[tokio::test]
    async fn test_missing_table_is_query_failure() {
        let store = SqliteStore::in_memory().await.unwrap();
        let result = store.query("SELECT COUNT(*) FROM trips", &[]).await;
        assert!(matches!(result, Err(DatabaseError::QueryFailed(_))));
    }

    #[tokio::test]
    async fn test_query_decodes_storage_classes() {
        let store = SqliteStore::in_memory().await.unwrap();

        let result = store
            .query("SELECT 1 AS num, 2.5 AS real_num, 'abc' AS text, NULL AS nothing", &[])
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["num", "real_num", "text", "nothing"]);
        assert_eq!(
            result.rows[0],
            vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::String("abc".to_string()),
                Value::Null
            ]
        );
    }

    #[tokio::test]
    async fn test_numbered_placeholders_bind_in_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .execute_script(
                "CREATE TABLE fares (id INTEGER PRIMARY KEY, amount REAL);
                 INSERT INTO fares (amount) VALUES (5.0), (15.0), (25.0), (35.0);",
            )
            .await
            .unwrap();

        let result = store
            .query(
                "SELECT COUNT(*) FROM fares WHERE amount >= ?1 AND amount <= ?2",
                &[Value::Float(10.0), Value::Float(30.0)],
            )
            .await
            .unwrap();

        assert_eq!(result.rows[0][0], Value::Int(2));
    }

    #[tokio::test]
    async fn test_date_binds_compare_with_text_timestamps() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .execute_script(
                "CREATE TABLE t (ts TEXT);
                 INSERT INTO t VALUES ('2019-01-01 23:59:00'), ('2019-01-02 00:00:00');",
            )
            .await
            .unwrap();

        let day = chrono::NaiveDate::from_ymd_opt(2019, 1, 2).unwrap();
        let result = store
            .query("SELECT COUNT(*) FROM t WHERE ts < ?1", &[Value::Date(day)])
            .await
            .unwrap();

        assert_eq!(result.rows[0][0], Value::Int(1));
    }
}
