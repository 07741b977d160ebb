//! Database Handler Module
//!
//! 集計ビューが読み取るストアへの統一インターフェースを提供

pub mod engine;
pub mod types;

// エンジン実装
pub mod engines {
    pub mod postgresql;
    pub mod sqlite;
}

// 公開API
pub use engine::{connect, RideStore};
pub use engines::{postgresql::PostgresStore, sqlite::SqliteStore};
pub use types::{DatabaseConfig, DatabaseError, QueryResult, RowReader, SqlDialect, Value};
