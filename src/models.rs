use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub careers_url: Option<String>,
    pub ats_kind: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Company {
    /// Name shown to consumers; blank names get a placeholder so one bad row
    /// never sinks a whole result set.
    pub fn display_name(&self) -> String {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            tracing::warn!(company_id = self.id, "company has no display name");
            format!("Company #{}", self.id)
        } else {
            trimmed.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: i64,
    pub company_id: i64,
    pub source_job_id: String,
    pub title: String,
    pub department: Option<String>,
    pub location: Option<String>,
    pub apply_url: Option<String>,
    pub role_family: Option<String>,
    pub status: String, // "open", "closed"
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobPosting {
    /// Update time, falling back to creation time.
    pub fn effective_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    #[serde(alias = "hn_whos_hiring")]
    CommunityHiring,
    Layoff,
    Funding,
    Earnings,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::CommunityHiring => "community_hiring",
            SignalKind::Layoff => "layoff",
            SignalKind::Funding => "funding",
            SignalKind::Earnings => "earnings",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "community_hiring" | "hn_whos_hiring" => Ok(SignalKind::CommunityHiring),
            "layoff" => Ok(SignalKind::Layoff),
            "funding" => Ok(SignalKind::Funding),
            "earnings" => Ok(SignalKind::Earnings),
            other => Err(format!(
                "unknown signal kind '{}'. Available: community_hiring (hn_whos_hiring), layoff, funding, earnings",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: i64,
    pub company_id: i64,
    pub kind: SignalKind,
    pub happened_at: DateTime<Utc>,
    pub payload: Option<serde_json::Value>,
}

/// One consistent read of the store: the population plus everything the
/// engine derives features from.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub companies: Vec<Company>,
    pub postings: Vec<JobPosting>,
    pub signals: Vec<Signal>,
}

/// Per-company features for one scoring invocation. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompanyFeatureVector {
    pub company_id: i64,
    pub open_count: u32,
    pub fresh_count: u32,
    pub momentum_recent: u32,
    pub momentum_prior: u32,
    /// `max(0, momentum_recent - momentum_prior)`
    pub momentum: u32,
    /// Postings inside the legacy "new" window.
    pub new_count: u32,
    pub community_presence: bool,
    pub layoff_decay: f64,
}

/// A feature vector paired with the company name from the same snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub company_name: String,
    #[serde(flatten)]
    pub features: CompanyFeatureVector,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopFeatures {
    pub open_count: u32,
    pub fresh_7d: u32,
    pub momentum_positive: u32,
    pub community_presence: bool,
    pub layoff_decay: f64,
}

impl From<&CompanyFeatureVector> for TopFeatures {
    fn from(v: &CompanyFeatureVector) -> Self {
        Self {
            open_count: v.open_count,
            fresh_7d: v.fresh_count,
            momentum_positive: v.momentum,
            community_presence: v.community_presence,
            layoff_decay: v.layoff_decay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopRecord {
    pub company_id: i64,
    pub company_name: String,
    pub score: u32,
    pub features: TopFeatures,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRecord {
    pub company_id: i64,
    pub company_name: String,
    pub sde_new: u32,
    pub sde_openings: u32,
    pub score: u32,
    pub window_days: u32,
}
