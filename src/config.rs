use crate::analytics::DetectorConfig;
use crate::error::Result;
use crate::handlers::database::types::DatabaseConfig;
use crate::logging::LogRotation;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// 設定ファイルの探索順
pub const CONFIG_PATHS: [&str; 3] = [
    "ride-insights.toml",
    "config.toml",
    "config/ride-insights.toml",
];

pub const SAMPLE_CONFIG_PATH: &str = "ride-insights.toml.example";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub log_level: String,
    /// 指定時はローテーション付きのファイル出力を追加
    pub log_dir: Option<String>,
    pub log_json: bool,
    /// daily | hourly | never
    pub log_rotation: LogRotation,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            log_level: "info".to_string(),
            log_dir: None,
            log_json: false,
            log_rotation: LogRotation::Daily,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyticsConfig {
    /// 異常検知スナップショットの上限件数
    pub snapshot_limit: u32,
    pub z_threshold: f64,
    /// 運賃分析に必要なゾーン内の最小件数
    pub min_zone_trips: usize,
    pub fare_epsilon: f64,
    pub route_limit: u32,
    pub listing_page_size: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            snapshot_limit: 10_000,
            z_threshold: 2.0,
            min_zone_trips: 10,
            fare_epsilon: 1e-9,
            route_limit: 10,
            listing_page_size: 50,
        }
    }
}

impl AnalyticsConfig {
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            z_threshold: self.z_threshold,
            min_zone_trips: self.min_zone_trips,
            variance_epsilon: self.fare_epsilon,
        }
    }
}

impl AppConfig {
    /// 設定ファイルから読み込み、環境変数で上書き
    pub fn load() -> Result<Self> {
        let path = CONFIG_PATHS.iter().copied().find(|p| Path::new(p).exists());
        Self::load_from(path)
    }

    /// 指定パスの設定ファイルと環境変数から読み込み
    ///
    /// UTF-8として表せないパスは黙って無視せずエラーにする
    pub fn load_path(path: &Path) -> Result<Self> {
        let path = path.to_str().ok_or_else(|| {
            crate::error::Error::Config(format!(
                "configuration path is not valid UTF-8: {}",
                path.display()
            ))
        })?;
        Self::load_from(Some(path))
    }

    /// 指定ファイル（任意）と環境変数から読み込み
    pub fn load_from(path: Option<&str>) -> Result<Self> {
        let mut settings = config::Config::builder();

        // デフォルト値を設定
        settings = settings.add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            info!(path, "loading configuration file");
            settings = settings.add_source(config::File::with_name(path));
        }

        // 環境変数で上書き (例: RIDES__DATABASE__URL)
        settings = settings.add_source(
            config::Environment::with_prefix("RIDES")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = settings.build()?.try_deserialize()?;

        // 慣例的な環境変数も直接対応
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(bind_addr) = std::env::var("BIND_ADDR") {
            config.server.bind_addr = bind_addr;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.database
            .validate()
            .map_err(|e| crate::error::Error::Config(e.to_string()))?;

        let analytics = &self.analytics;
        if !(analytics.z_threshold.is_finite() && analytics.z_threshold > 0.0) {
            return Err(crate::error::Error::Config(format!(
                "analytics.z_threshold must be positive, got {}",
                analytics.z_threshold
            )));
        }
        if analytics.min_zone_trips == 0 {
            return Err(crate::error::Error::Config(
                "analytics.min_zone_trips must be at least 1".to_string(),
            ));
        }
        if analytics.snapshot_limit == 0 || analytics.listing_page_size == 0 {
            return Err(crate::error::Error::Config(
                "analytics limits must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// サンプル設定の内容
    pub fn sample_config() -> Result<String> {
        let toml_content = toml::to_string_pretty(&AppConfig::default())
            .map_err(|e| crate::error::Error::Config(e.to_string()))?;

        Ok(format!(
            r#"# ride-insights Configuration File
#
# このファイルは ride-insights.toml として保存してください
# 環境変数での上書きも可能です (例: RIDES__SERVER__BIND_ADDR=0.0.0.0:8080)
# DATABASE_URL と BIND_ADDR は直接参照されます

{}
# 設定説明:
#
# [server]
# bind_addr = HTTP サーバーのバインドアドレス
# log_level = ログレベル (trace, debug, info, warn, error)。RUST_LOG が優先
# log_dir = 指定するとログをファイルにも出力
# log_json = true で JSON 形式のログ
# log_rotation = ファイルのローテーション (daily, hourly, never)
#
# [database]
# url = 接続URL (postgres://... または sqlite:...)
# dialect = postgres | sqlite
#
# [analytics]
# snapshot_limit = 異常検知で取得する最大件数
# z_threshold = 異常とみなす |Zスコア| の閾値
# min_zone_trips = 運賃分析の対象となるゾーン内最小件数
# fare_epsilon = 標準偏差がこれ未満なら判定しない
# route_limit = ルートランキングの件数
# listing_page_size = 一覧の既定ページサイズ
"#,
            toml_content
        ))
    }

    /// サンプル設定ファイルを生成
    pub fn generate_sample_config(path: &Path) -> Result<()> {
        std::fs::write(path, Self::sample_config()?)?;
        info!(path = %path.display(), "sample configuration written");
        Ok(())
    }
}
