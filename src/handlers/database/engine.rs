//! Ride Store Abstraction Layer
//!
//! 集計ビューと異常検知が利用するストアの統一インターフェース

use super::engines::{postgresql::PostgresStore, sqlite::SqliteStore};
use super::types::{DatabaseConfig, DatabaseError, QueryResult, SqlDialect, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// ストア抽象化トレイト
///
/// 読み取り専用。接続プールの受け入れ方針は実装側が持つ
#[async_trait]
pub trait RideStore: Send + Sync {
    /// このストアが解釈するSQL方言
    fn dialect(&self) -> SqlDialect;

    /// SELECTクエリを位置パラメータ付きで実行
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DatabaseError>;

    /// 接続の健全性をチェック
    async fn ping(&self) -> Result<(), DatabaseError>;
}

/// 設定からストアを構築
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn RideStore>, DatabaseError> {
    config.validate()?;

    match config.dialect {
        SqlDialect::Postgres => Ok(Arc::new(PostgresStore::connect(config).await?)),
        SqlDialect::Sqlite => Ok(Arc::new(SqliteStore::connect(config).await?)),
    }
}
