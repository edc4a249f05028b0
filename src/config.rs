use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::features::Window;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scoring config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scoring config {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid scoring config: {0}")]
    Invalid(String),
}

/// Process-level settings: where the store lives and how loud to log.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    pub scoring_path: Option<PathBuf>,
}

impl AppConfig {
    /// Reads `.env` and the `RADAR_*` variables. An explicit scoring config
    /// path wins over `RADAR_SCORING_CONFIG`. The file itself is only read by
    /// [`AppConfig::scoring`].
    pub fn load(scoring_path: Option<&Path>) -> Self {
        dotenvy::dotenv().ok();

        let db_path = env::var("RADAR_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_db_path());
        let log_level = env::var("RADAR_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());

        let scoring_path = scoring_path
            .map(Path::to_path_buf)
            .or_else(|| env::var("RADAR_SCORING_CONFIG").ok().map(PathBuf::from));

        Self {
            db_path,
            log_level,
            scoring_path,
        }
    }

    pub fn scoring(&self) -> Result<ScoringConfig, ConfigError> {
        match &self.scoring_path {
            Some(path) => ScoringConfig::from_json_file(path),
            None => Ok(ScoringConfig::default()),
        }
    }
}

fn default_db_path() -> PathBuf {
    // XDG data directory, or the working directory when there is no home
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "radar") {
        proj_dirs.data_dir().join("radar.db")
    } else {
        PathBuf::from("radar.db")
    }
}

/// Blend weights for the live score. `layoff` is subtracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendWeights {
    pub fresh: f64,
    pub momentum: f64,
    pub open: f64,
    pub community: f64,
    pub layoff: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            fresh: 0.35,
            momentum: 0.30,
            open: 0.20,
            community: 0.10,
            layoff: 0.15,
        }
    }
}

/// `new_multiplier * new + min(open, open_cap)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyFormula {
    pub new_multiplier: u32,
    pub open_cap: u32,
}

impl Default for LegacyFormula {
    fn default() -> Self {
        Self {
            new_multiplier: 3,
            open_cap: 50,
        }
    }
}

/// Closed range a caller-supplied parameter must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: u32,
    pub max: u32,
}

impl ParamRange {
    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Windows, weights and limits the engine runs with. Built once and handed
/// to the engine; nothing in the engine reads global constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub fresh_window_days: u32,
    pub momentum_recent: Window,
    pub momentum_prior: Window,
    pub community_lookback_days: u32,
    pub layoff_half_life_days: f64,
    /// `None` considers every layoff on record.
    pub layoff_lookback_days: Option<u32>,
    pub weights: BlendWeights,
    pub legacy: LegacyFormula,
    pub legacy_new_window_days: u32,
    pub limit_range: ParamRange,
    pub window_days_range: ParamRange,
    pub role_family_synonyms: Vec<Vec<String>>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            fresh_window_days: 7,
            momentum_recent: Window::new(0, 14),
            momentum_prior: Window::new(14, 28),
            community_lookback_days: 35,
            layoff_half_life_days: 90.0,
            layoff_lookback_days: None,
            weights: BlendWeights::default(),
            legacy: LegacyFormula::default(),
            legacy_new_window_days: 28,
            limit_range: ParamRange { min: 1, max: 200 },
            window_days_range: ParamRange { min: 1, max: 90 },
            role_family_synonyms: vec![vec![
                "software".to_string(),
                "swe".to_string(),
                "sde".to_string(),
            ]],
        }
    }
}

impl ScoringConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ScoringConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.layoff_half_life_days.is_finite() && self.layoff_half_life_days > 0.0) {
            return Err(ConfigError::Invalid(
                "layoff_half_life_days must be a positive number".to_string(),
            ));
        }
        for (name, days) in [
            ("fresh_window_days", self.fresh_window_days),
            ("community_lookback_days", self.community_lookback_days),
            ("legacy_new_window_days", self.legacy_new_window_days),
        ] {
            if days == 0 {
                return Err(ConfigError::Invalid(format!("{} must be at least 1", name)));
            }
        }
        if self.layoff_lookback_days == Some(0) {
            return Err(ConfigError::Invalid(
                "layoff_lookback_days must be at least 1 when set".to_string(),
            ));
        }
        for (name, window) in [
            ("momentum_recent", self.momentum_recent),
            ("momentum_prior", self.momentum_prior),
        ] {
            if window.start_days >= window.end_days {
                return Err(ConfigError::Invalid(format!(
                    "{} must start before it ends ({}..{})",
                    name, window.start_days, window.end_days
                )));
            }
        }
        for (name, range) in [
            ("limit_range", self.limit_range),
            ("window_days_range", self.window_days_range),
        ] {
            if range.min == 0 || range.min > range.max {
                return Err(ConfigError::Invalid(format!(
                    "{} must satisfy 1 <= min <= max (got {}..={})",
                    name, range.min, range.max
                )));
            }
        }
        let weights = &self.weights;
        if [
            weights.fresh,
            weights.momentum,
            weights.open,
            weights.community,
            weights.layoff,
        ]
        .iter()
        .any(|w| !w.is_finite())
        {
            return Err(ConfigError::Invalid("blend weights must be finite".to_string()));
        }
        Ok(())
    }
}
