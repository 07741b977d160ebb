use crate::config::ServerConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

pub const LOG_FILE_PREFIX: &str = "ride-insights.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル (trace, debug, info, warn, error)。RUST_LOGが優先
    pub level: String,
    /// 指定時のみファイル出力
    pub log_dir: Option<PathBuf>,
    /// ファイルローテーション設定
    pub rotation: LogRotation,
    /// コンソール出力有効
    pub console_enabled: bool,
    /// JSON形式で出力
    pub json: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// 日次ローテーション
    #[default]
    Daily,
    /// 時間毎ローテーション
    Hourly,
    /// ローテーションなし
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            rotation: LogRotation::default(),
            console_enabled: true,
            json: false,
        }
    }
}

impl LogConfig {
    /// 設定からログ設定を作成
    pub fn from_server_config(server_config: &ServerConfig) -> Self {
        Self {
            level: server_config.log_level.clone(),
            log_dir: server_config.log_dir.as_ref().map(PathBuf::from),
            json: server_config.log_json,
            ..Self::default()
        }
        .with_rotation(server_config.log_rotation)
    }

    /// カスタムログディレクトリを設定
    pub fn with_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// ローテーション設定
    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// RUST_LOGがあればそれを、なければ設定値を使う
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn file_appender(dir: &Path, rotation: LogRotation) -> rolling::RollingFileAppender {
    match rotation {
        LogRotation::Daily => rolling::daily(dir, LOG_FILE_PREFIX),
        LogRotation::Hourly => rolling::hourly(dir, LOG_FILE_PREFIX),
        LogRotation::Never => rolling::never(dir, LOG_FILE_PREFIX),
    }
}

/// ログシステムを初期化
///
/// ファイル出力時は返されたガードを保持し続けること（dropでフラッシュ停止）
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.console_enabled {
        let console = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true);
        layers.push(if config.json {
            console.json().boxed()
        } else {
            console.boxed()
        });
    }

    if let Some(dir) = &config.log_dir {
        ensure_log_dir(dir)?;
        let (writer, worker_guard) = non_blocking(file_appender(dir, config.rotation));
        guard = Some(worker_guard);

        let file = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        layers.push(if config.json {
            file.json().boxed()
        } else {
            file.boxed()
        });
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(config.env_filter())
        .try_init()
        .map_err(|e| Error::Config(format!("failed to initialize logging: {}", e)))?;

    tracing::info!(
        level = %config.level,
        log_dir = ?config.log_dir,
        rotation = ?config.rotation,
        json = config.json,
        "logging initialized"
    );

    Ok(guard)
}
