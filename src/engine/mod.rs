//! Hiring-activity scoring engine.
//!
//! Every call reads one snapshot from a [`SnapshotSource`], derives features
//! in memory and returns ranked records. Nothing is cached between calls and
//! the store is never written.

pub mod blend;
pub mod decay;
pub mod features;
pub mod normalize;
pub mod rank;
pub mod signals;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::{ConfigError, ParamRange, ScoringConfig};
use crate::db::StoreError;
use crate::models::{CompanyFeatureVector, FeatureRecord, NewRecord, Snapshot, TopRecord};

pub use blend::ScoringStrategy;
use features::{RoleFilter, Window};

/// Read-only view of the posting/signal store.
pub trait SnapshotSource {
    /// Companies, open postings and signals from one consistent read.
    fn load_snapshot(&self) -> Result<Snapshot, StoreError>;
}

impl SnapshotSource for Snapshot {
    fn load_snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(self.clone())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{name} must be between {min} and {max} (got {value})")]
    InvalidParameter {
        name: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error("data unavailable")]
    DataUnavailable(#[from] StoreError),
}

impl EngineError {
    /// Stable short name for error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidParameter { .. } => "invalid_parameter",
            EngineError::InvalidConfig(_) => "invalid_config",
            EngineError::DataUnavailable(_) => "data_unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopQuery {
    pub role_family: String,
    pub limit: u32,
    pub strategy: ScoringStrategy,
    /// Restrict the population to companies with at least one open matching
    /// posting. The restricted set is also the normalization frame.
    pub active_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuery {
    pub role_family: String,
    pub days: u32,
    pub limit: u32,
}

pub struct Engine {
    config: ScoringConfig,
}

impl Engine {
    pub fn new(config: ScoringConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Named feature vectors for the whole population, ordered by company id.
    pub fn features<S: SnapshotSource + ?Sized>(
        &self,
        source: &S,
        role_family: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<FeatureRecord>, EngineError> {
        let snapshot = source.load_snapshot()?;
        let filter = self.role_filter(role_family);
        let names = display_names(&snapshot);
        Ok(self
            .feature_vectors(&snapshot, &filter, now)
            .into_iter()
            .map(|features| FeatureRecord {
                company_name: name_for(&names, features.company_id),
                features,
            })
            .collect())
    }

    /// Leaderboard of the population by live or legacy score.
    pub fn top<S: SnapshotSource + ?Sized>(
        &self,
        source: &S,
        query: &TopQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<TopRecord>, EngineError> {
        let limit = check_param("limit", query.limit, self.config.limit_range)?;

        let snapshot = source.load_snapshot()?;
        let filter = self.role_filter(&query.role_family);
        let mut vectors = self.feature_vectors(&snapshot, &filter, now);
        if query.active_only {
            vectors.retain(|v| v.open_count > 0);
        }

        let scores = query.strategy.score_all(&vectors, &self.config);
        let names = display_names(&snapshot);
        let records: Vec<TopRecord> = vectors
            .iter()
            .zip(scores)
            .map(|(vector, score)| TopRecord {
                company_id: vector.company_id,
                company_name: name_for(&names, vector.company_id),
                score,
                features: vector.into(),
            })
            .collect();

        let population = records.len();
        let ranked = rank::rank_top(records, limit as usize);
        tracing::info!(
            strategy = %query.strategy,
            role_family = %query.role_family,
            population,
            returned = ranked.len(),
            "ranked top companies"
        );
        Ok(ranked)
    }

    /// Recently created companies ordered by new postings.
    pub fn new_companies<S: SnapshotSource + ?Sized>(
        &self,
        source: &S,
        query: &NewQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<NewRecord>, EngineError> {
        let limit = check_param("limit", query.limit, self.config.limit_range)?;
        let days = check_param("window_days", query.days, self.config.window_days_range)?;

        let snapshot = source.load_snapshot()?;
        let window = Window::last(days);
        let population: Vec<_> = snapshot
            .companies
            .iter()
            .filter(|c| window.contains_age(features::age_days(c.created_at, now)))
            .cloned()
            .collect();

        let filter = self.role_filter(&query.role_family);
        let counts = features::extract(&population, &snapshot.postings, &filter, &[window], now);

        let records: Vec<NewRecord> = population
            .iter()
            .map(|company| {
                let acc = counts.get(&company.id);
                let sde_openings = acc.map_or(0, |c| c.total);
                let sde_new = acc.and_then(|c| c.windows.first().copied()).unwrap_or(0);
                NewRecord {
                    company_id: company.id,
                    company_name: company.display_name(),
                    sde_new,
                    sde_openings,
                    score: blend::legacy_score(sde_new, sde_openings, &self.config.legacy),
                    window_days: days,
                }
            })
            .collect();

        let created = records.len();
        let ranked = rank::rank_new(records, limit as usize);
        tracing::info!(
            role_family = %query.role_family,
            window_days = days,
            created,
            returned = ranked.len(),
            "ranked new companies"
        );
        Ok(ranked)
    }

    fn role_filter(&self, role_family: &str) -> RoleFilter {
        RoleFilter::new(role_family, &self.config.role_family_synonyms)
    }

    fn feature_vectors(
        &self,
        snapshot: &Snapshot,
        filter: &RoleFilter,
        now: DateTime<Utc>,
    ) -> Vec<CompanyFeatureVector> {
        let config = &self.config;
        let windows = [
            Window::last(config.fresh_window_days),
            config.momentum_recent,
            config.momentum_prior,
            Window::last(config.legacy_new_window_days),
        ];
        let counts = features::extract(&snapshot.companies, &snapshot.postings, filter, &windows, now);
        let summaries = signals::aggregate(
            &snapshot.companies,
            &snapshot.signals,
            Window::last(config.community_lookback_days),
            config.layoff_lookback_days.map(Window::last),
            now,
        );

        counts
            .into_iter()
            .map(|(company_id, acc)| {
                let slot = |i: usize| acc.windows.get(i).copied().unwrap_or(0);
                let summary = summaries.get(&company_id).cloned().unwrap_or_default();
                CompanyFeatureVector {
                    company_id,
                    open_count: acc.total,
                    fresh_count: slot(0),
                    momentum_recent: slot(1),
                    momentum_prior: slot(2),
                    momentum: blend::positive_momentum(slot(1), slot(2)),
                    new_count: slot(3),
                    community_presence: summary.community_presence,
                    layoff_decay: decay::event_decay(
                        summary.latest_layoff,
                        now,
                        config.layoff_half_life_days,
                    ),
                }
            })
            .collect()
    }
}

fn check_param(name: &'static str, value: u32, range: ParamRange) -> Result<u32, EngineError> {
    if range.contains(value) {
        Ok(value)
    } else {
        Err(EngineError::InvalidParameter {
            name,
            value,
            min: range.min,
            max: range.max,
        })
    }
}

fn display_names(snapshot: &Snapshot) -> std::collections::HashMap<i64, String> {
    snapshot
        .companies
        .iter()
        .map(|c| (c.id, c.display_name()))
        .collect()
}

fn name_for(names: &std::collections::HashMap<i64, String>, company_id: i64) -> String {
    names
        .get(&company_id)
        .cloned()
        .unwrap_or_else(|| format!("Company #{}", company_id))
}
