//! NPS scoring
//!
//! Pure function from raw 0-10 scores to a classified summary.
//! Percentages are rounded to one decimal first, then the NPS difference is
//! rounded to an integer. Arithmetic runs in integer tenths so the same input
//! always gives the same output.

use serde::Serialize;
use std::fmt;

/// Highest valid NPS answer
pub const MAX_SCORE: i64 = 10;

/// Interpretation band for an NPS value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NpsBand {
    /// nps >= 75
    Excellent,
    /// 50 <= nps < 75
    VeryGood,
    /// 0 <= nps < 50
    Reasonable,
    /// nps < 0
    Critical,
}

impl NpsBand {
    pub fn from_nps(nps: i32) -> Self {
        match nps {
            n if n >= 75 => NpsBand::Excellent,
            n if n >= 50 => NpsBand::VeryGood,
            n if n >= 0 => NpsBand::Reasonable,
            _ => NpsBand::Critical,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NpsBand::Excellent => "Excellent",
            NpsBand::VeryGood => "Very Good",
            NpsBand::Reasonable => "Reasonable",
            NpsBand::Critical => "Critical",
        }
    }
}

impl fmt::Display for NpsBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Category of a single score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Promoter,
    Neutral,
    Detractor,
}

impl Category {
    pub fn of(score: u8) -> Self {
        match score {
            9..=u8::MAX => Category::Promoter,
            7 | 8 => Category::Neutral,
            _ => Category::Detractor,
        }
    }
}

/// Derived, never persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub nps: i32,
    pub total: usize,
    pub promoters: usize,
    pub neutrals: usize,
    pub detractors: usize,
    pub promoter_pct: f64,
    pub neutral_pct: f64,
    pub detractor_pct: f64,
    pub band: NpsBand,
}

impl ScoreSummary {
    /// Summarize scores; order is irrelevant and empty input yields zeros
    pub fn from_scores(scores: &[u8]) -> Self {
        let (mut promoters, mut neutrals, mut detractors) = (0usize, 0usize, 0usize);
        for &score in scores {
            match Category::of(score) {
                Category::Promoter => promoters += 1,
                Category::Neutral => neutrals += 1,
                Category::Detractor => detractors += 1,
            }
        }
        let total = scores.len();

        let promoter_tenths = pct_tenths(promoters, total);
        let neutral_tenths = pct_tenths(neutrals, total);
        let detractor_tenths = pct_tenths(detractors, total);
        let nps = round_tenths_to_int(promoter_tenths - detractor_tenths);

        Self {
            nps,
            total,
            promoters,
            neutrals,
            detractors,
            promoter_pct: promoter_tenths as f64 / 10.0,
            neutral_pct: neutral_tenths as f64 / 10.0,
            detractor_pct: detractor_tenths as f64 / 10.0,
            band: NpsBand::from_nps(nps),
        }
    }
}

/// `100 * count / total` in tenths of a percent, rounded half up
fn pct_tenths(count: usize, total: usize) -> i64 {
    if total == 0 {
        return 0;
    }
    let (count, total) = (count as i64, total as i64);
    (2000 * count + total) / (2 * total)
}

/// Tenths to nearest integer, ties toward positive infinity (-87.5 -> -87)
///
/// Matches reports already computed with `Math.round` semantics.
fn round_tenths_to_int(tenths: i64) -> i32 {
    (tenths + 5).div_euclid(10) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_promoters() {
        let s = ScoreSummary::from_scores(&[9; 10]);
        assert_eq!(s.nps, 100);
        assert_eq!(s.promoters, 10);
        assert_eq!(s.band, NpsBand::Excellent);
    }

    #[test]
    fn test_all_detractors() {
        let s = ScoreSummary::from_scores(&[0; 5]);
        assert_eq!(s.nps, -100);
        assert_eq!(s.detractor_pct, 100.0);
        assert_eq!(s.band, NpsBand::Critical);
    }

    #[test]
    fn test_empty_input() {
        let s = ScoreSummary::from_scores(&[]);
        assert_eq!(s.nps, 0);
        assert_eq!(s.total, 0);
        assert_eq!((s.promoters, s.neutrals, s.detractors), (0, 0, 0));
        assert_eq!(s.promoter_pct, 0.0);
        assert_eq!(s.band, NpsBand::Reasonable);
    }

    #[test]
    fn test_mixed_scores_round_percentages_first() {
        let s = ScoreSummary::from_scores(&[9, 8, 7, 6, 9, 9]);
        assert_eq!((s.promoters, s.neutrals, s.detractors), (3, 2, 1));
        assert_eq!(s.promoter_pct, 50.0);
        assert_eq!(s.neutral_pct, 33.3);
        assert_eq!(s.detractor_pct, 16.7);
        // 50.0 - 16.7 = 33.3
        assert_eq!(s.nps, 33);
        assert_eq!(s.band, NpsBand::Reasonable);
    }

    #[test]
    fn test_percentages_round_half_up() {
        // 1/16 = 6.25% -> 6.3; 15/16 = 93.75% -> 93.8; diff 87.5 -> 88
        let mut scores = vec![10u8; 15];
        scores.push(3);
        let s = ScoreSummary::from_scores(&scores);
        assert_eq!(s.promoter_pct, 93.8);
        assert_eq!(s.detractor_pct, 6.3);
        assert_eq!(s.nps, 88);
    }

    #[test]
    fn test_every_score_counted_once() {
        let scores: Vec<u8> = (0..=10).cycle().take(97).collect();
        let s = ScoreSummary::from_scores(&scores);
        assert_eq!(s.promoters + s.neutrals + s.detractors, s.total);
        assert_eq!(s.total, 97);
    }

    #[test]
    fn test_order_irrelevant_and_reproducible() {
        let a = ScoreSummary::from_scores(&[1, 9, 7, 10, 3, 8]);
        let b = ScoreSummary::from_scores(&[8, 3, 10, 7, 9, 1]);
        assert_eq!(a, b);
        assert_eq!(a, ScoreSummary::from_scores(&[1, 9, 7, 10, 3, 8]));
    }

    #[test]
    fn test_category_thresholds() {
        assert_eq!(Category::of(9), Category::Promoter);
        assert_eq!(Category::of(10), Category::Promoter);
        assert_eq!(Category::of(8), Category::Neutral);
        assert_eq!(Category::of(7), Category::Neutral);
        assert_eq!(Category::of(6), Category::Detractor);
        assert_eq!(Category::of(0), Category::Detractor);
    }

    #[test]
    fn test_bands_are_contiguous() {
        assert_eq!(NpsBand::from_nps(100), NpsBand::Excellent);
        assert_eq!(NpsBand::from_nps(75), NpsBand::Excellent);
        assert_eq!(NpsBand::from_nps(74), NpsBand::VeryGood);
        assert_eq!(NpsBand::from_nps(50), NpsBand::VeryGood);
        assert_eq!(NpsBand::from_nps(49), NpsBand::Reasonable);
        assert_eq!(NpsBand::from_nps(0), NpsBand::Reasonable);
        assert_eq!(NpsBand::from_nps(-1), NpsBand::Critical);
        assert_eq!(NpsBand::from_nps(-100), NpsBand::Critical);
        assert_eq!(NpsBand::VeryGood.label(), "Very Good");
    }

    #[test]
    fn test_half_rounds_toward_positive() {
        assert_eq!(round_tenths_to_int(-5), 0);
        assert_eq!(round_tenths_to_int(5), 1);
        assert_eq!(round_tenths_to_int(-4), 0);
        assert_eq!(round_tenths_to_int(-6), -1);
        assert_eq!(round_tenths_to_int(-875), -87);
        assert_eq!(round_tenths_to_int(333), 33);
    }

    #[test]
    fn test_negative_tie_from_scores() {
        // 6.3 - 93.8 = -87.5 -> -87
        let mut scores = vec![2u8; 15];
        scores.push(10);
        let s = ScoreSummary::from_scores(&scores);
        assert_eq!(s.nps, -87);
        assert_eq!(s.band, NpsBand::Critical);
    }
}
