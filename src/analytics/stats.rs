//! Statistics Helper
//!
//! 平均と母標準偏差（Nで割る）

use serde::{Deserialize, Serialize};

/// 算術平均
///
/// 空の入力は呼び出し側で除外すること（NaNになる）
pub fn mean(values: &[f64]) -> f64 {
    debug_assert!(!values.is_empty(), "mean of an empty sequence");
    values.iter().sum::<f64>() / values.len() as f64
}

/// 与えられた平均からの母標準偏差
pub fn std_dev(values: &[f64], mean: f64) -> f64 {
    debug_assert!(!values.is_empty(), "std_dev of an empty sequence");
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// 要約統計量
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl Summary {
    /// 空ならNone
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mean = mean(values);
        Some(Self {
            count: values.len(),
            mean,
            std_dev: std_dev(values, mean),
        })
    }

    /// 分散が実質ゼロか
    pub fn is_degenerate(&self, epsilon: f64) -> bool {
        self.std_dev < epsilon
    }

    /// 符号付きZスコア。縮退時は呼ばないこと
    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.std_dev
    }
}
