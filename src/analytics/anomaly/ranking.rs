//! Deviation Ranking
//!
//! |Zスコア|の降順で安定ソート。同値は入力順を保つ

use super::types::{FareAnomaly, SpeedAnomaly};

/// Zスコアを持つ要素
pub trait Deviation {
    fn z_score(&self) -> f64;
}

impl Deviation for SpeedAnomaly {
    fn z_score(&self) -> f64 {
        self.z_score
    }
}

impl Deviation for FareAnomaly {
    fn z_score(&self) -> f64 {
        self.z_score
    }
}

/// 偏差の大きい順に並べ替え
pub fn rank_by_deviation<T: Deviation>(items: &mut [T]) {
    // slice::sort_by は安定ソート
    items.sort_by(|a, b| b.z_score().abs().total_cmp(&a.z_score().abs()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Scored(&'static str, f64);

    impl Deviation for Scored {
        fn z_score(&self) -> f64 {
            self.1
        }
    }

    #[test]
    fn test_descending_by_magnitude() {
        let mut items = vec![Scored("a", 2.1), Scored("b", -3.5), Scored("c", 2.8)];
        rank_by_deviation(&mut items);

        let order: Vec<_> = items.iter().map(|s| s.0).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let mut items = vec![
            Scored("first", 2.5),
            Scored("big", 4.0),
            Scored("second", -2.5),
            Scored("third", 2.5),
        ];
        rank_by_deviation(&mut items);

        let order: Vec<_> = items.iter().map(|s| s.0).collect();
        assert_eq!(order, vec!["big", "first", "second", "third"]);
    }

    #[test]
    fn test_adjacent_pairs_non_increasing() {
        let mut items: Vec<Scored> = [2.2, -5.0, 3.3, -2.05, 4.4, 2.2, -3.3]
            .into_iter()
            .map(|z| Scored("x", z))
            .collect();
        rank_by_deviation(&mut items);

        for pair in items.windows(2) {
            assert!(pair[0].1.abs() >= pair[1].1.abs());
        }
    }
}
