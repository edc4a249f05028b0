use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::config::{BlendWeights, LegacyFormula, ScoringConfig};
use crate::engine::normalize::MinMax;
use crate::models::CompanyFeatureVector;

/// Only acceleration counts: a company cooling off scores like a flat one.
pub fn positive_momentum(recent: u32, prior: u32) -> u32 {
    recent.saturating_sub(prior)
}

/// `new_multiplier * new + min(open, open_cap)`. Unbounded above.
pub fn legacy_score(new_count: u32, open_count: u32, formula: &LegacyFormula) -> u32 {
    formula
        .new_multiplier
        .saturating_mul(new_count)
        .saturating_add(open_count.min(formula.open_cap))
}

/// Normalizers for the three population-relative metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationNorms {
    pub fresh: MinMax,
    pub momentum: MinMax,
    pub open: MinMax,
}

impl PopulationNorms {
    pub fn fit(vectors: &[CompanyFeatureVector]) -> Self {
        Self {
            fresh: MinMax::fit(vectors.iter().map(|v| f64::from(v.fresh_count))),
            momentum: MinMax::fit(vectors.iter().map(|v| f64::from(v.momentum))),
            open: MinMax::fit(vectors.iter().map(|v| f64::from(v.open_count))),
        }
    }
}

/// Weighted sum before clamping. May fall below 0 or exceed 1.
pub fn live_raw(vector: &CompanyFeatureVector, norms: &PopulationNorms, weights: &BlendWeights) -> f64 {
    let community = if vector.community_presence { 1.0 } else { 0.0 };
    weights.fresh * norms.fresh.apply(f64::from(vector.fresh_count))
        + weights.momentum * norms.momentum.apply(f64::from(vector.momentum))
        + weights.open * norms.open.apply(f64::from(vector.open_count))
        + weights.community * community
        - weights.layoff * vector.layoff_decay
}

/// Clamps `raw` to `[0, 1]` and scales to 0..=100. Rounds half away from
/// zero, which is half-up here since the clamped value is never negative.
pub fn live_score(raw: f64) -> u32 {
    let clamped = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };
    (clamped * 100.0).round() as u32
}

/// How a population of feature vectors becomes integer scores. Both
/// strategies consume the same extracted features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStrategy {
    /// Normalized, weighted blend bounded to 0..=100.
    Live,
    /// `3 * new + min(open, 50)`; unbounded, no normalization.
    Legacy,
}

impl ScoringStrategy {
    /// Scores in the same order as `vectors`.
    pub fn score_all(&self, vectors: &[CompanyFeatureVector], config: &ScoringConfig) -> Vec<u32> {
        match self {
            ScoringStrategy::Live => {
                let norms = PopulationNorms::fit(vectors);
                vectors
                    .iter()
                    .map(|v| live_score(live_raw(v, &norms, &config.weights)))
                    .collect()
            }
            ScoringStrategy::Legacy => vectors
                .iter()
                .map(|v| legacy_score(v.new_count, v.open_count, &config.legacy))
                .collect(),
        }
    }
}

impl fmt::Display for ScoringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringStrategy::Live => f.write_str("live"),
            ScoringStrategy::Legacy => f.write_str("legacy"),
        }
    }
}

impl FromStr for ScoringStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(ScoringStrategy::Live),
            "legacy" => Ok(ScoringStrategy::Legacy),
            other => Err(format!("unknown scoring strategy '{}'. Available: live, legacy", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(company_id: i64) -> CompanyFeatureVector {
        CompanyFeatureVector {
            company_id,
            ..CompanyFeatureVector::default()
        }
    }

    #[test]
    fn test_momentum_never_negative() {
        assert_eq!(positive_momentum(10, 4), 6);
        assert_eq!(positive_momentum(4, 10), 0);
        assert_eq!(positive_momentum(5, 5), 0);
    }

    #[test]
    fn test_legacy_caps_open_count() {
        let formula = LegacyFormula::default();
        assert_eq!(legacy_score(0, 60, &formula), 50);
        assert_eq!(legacy_score(1, 2, &formula), 5);
        assert_eq!(legacy_score(10, 10, &formula), 40);
    }

    #[test]
    fn test_live_score_rounds_and_clamps() {
        assert_eq!(live_score(-0.15), 0);
        assert_eq!(live_score(1.4), 100);
        assert_eq!(live_score(0.306), 31);
        assert_eq!(live_score(0.294), 29);
        assert_eq!(live_score(0.5), 50);
        assert_eq!(live_score(f64::NAN), 0);
    }

    #[test]
    fn test_open_heavy_company_with_community_bonus() {
        let mut busy = vector(1);
        busy.open_count = 60;
        busy.community_presence = true;
        let quiet = vector(2);
        let config = ScoringConfig::default();

        let live = ScoringStrategy::Live.score_all(&[busy.clone(), quiet.clone()], &config);
        assert_eq!(live, vec![30, 0]);

        let legacy = ScoringStrategy::Legacy.score_all(&[busy, quiet], &config);
        assert_eq!(legacy, vec![50, 0]);
    }

    #[test]
    fn test_layoff_penalty_is_clamped_at_zero() {
        let mut hurt = vector(1);
        hurt.layoff_decay = 1.0;
        let config = ScoringConfig::default();
        let norms = PopulationNorms::fit(&[hurt.clone()]);
        assert!((live_raw(&hurt, &norms, &config.weights) + 0.15).abs() < 1e-12);
        assert_eq!(ScoringStrategy::Live.score_all(&[hurt], &config), vec![0]);
    }

    #[test]
    fn test_weights_summing_above_one_saturate() {
        let mut top = vector(1);
        top.fresh_count = 5;
        top.momentum = 5;
        top.open_count = 5;
        top.community_presence = true;
        let config = ScoringConfig {
            weights: BlendWeights {
                fresh: 0.5,
                momentum: 0.5,
                open: 0.5,
                community: 0.5,
                layoff: 0.0,
            },
            ..ScoringConfig::default()
        };
        let scores = ScoringStrategy::Live.score_all(&[top, vector(2)], &config);
        assert_eq!(scores, vec![100, 0]);
    }

    #[test]
    fn test_full_blend_mid_population() {
        let mut a = vector(1);
        a.fresh_count = 10;
        a.momentum = 4;
        a.open_count = 20;
        let mut b = vector(2);
        b.fresh_count = 5;
        b.momentum = 2;
        b.open_count = 10;
        b.layoff_decay = 0.5;
        let c = vector(3);
        let config = ScoringConfig::default();
        // b: 0.35*0.5 + 0.30*0.5 + 0.20*0.5 - 0.15*0.5 = 0.35
        let scores = ScoringStrategy::Live.score_all(&[a, b, c], &config);
        assert_eq!(scores, vec![85, 35, 0]);
    }

    #[test]
    fn test_strategy_parses_case_insensitively() {
        assert_eq!("LIVE".parse::<ScoringStrategy>(), Ok(ScoringStrategy::Live));
        assert_eq!("legacy".parse::<ScoringStrategy>(), Ok(ScoringStrategy::Legacy));
        assert!("fancy".parse::<ScoringStrategy>().is_err());
    }
}
