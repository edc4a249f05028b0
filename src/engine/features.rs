//! Feature extraction: per-company posting counts over age windows.
//!
//! Postings are bulk-loaded once (see [`crate::models::Snapshot`]) and folded
//! into per-company accumulators in a single pass, so every window for every
//! company is counted from the same read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{Company, JobPosting};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Half-open age range `[start_days, end_days)` measured back from the
/// invocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start_days: u32,
    pub end_days: u32,
}

impl Window {
    pub const fn new(start_days: u32, end_days: u32) -> Self {
        Self {
            start_days,
            end_days,
        }
    }

    /// "last N days"
    pub const fn last(days: u32) -> Self {
        Self::new(0, days)
    }

    pub fn contains_age(&self, age_days: f64) -> bool {
        age_days >= f64::from(self.start_days) && age_days < f64::from(self.end_days)
    }
}

/// Fractional days between `at` and `now`. Timestamps ahead of `now` count
/// as age zero.
pub fn age_days(at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - at).num_milliseconds().max(0);
    millis as f64 / 1000.0 / SECONDS_PER_DAY
}

/// Case-insensitive role-family match against a requested tag plus its
/// synonyms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleFilter {
    accepted: Option<Vec<String>>,
}

impl RoleFilter {
    /// Expands `requested` to every synonym group it belongs to. A blank
    /// request matches every posting.
    pub fn new(requested: &str, synonyms: &[Vec<String>]) -> Self {
        let requested = requested.trim().to_lowercase();
        if requested.is_empty() {
            return Self::any();
        }

        let mut accepted = vec![requested.clone()];
        for group in synonyms {
            let lowered: Vec<String> = group.iter().map(|s| s.trim().to_lowercase()).collect();
            if lowered.contains(&requested) {
                for tag in lowered {
                    if !accepted.contains(&tag) {
                        accepted.push(tag);
                    }
                }
            }
        }
        Self {
            accepted: Some(accepted),
        }
    }

    pub fn any() -> Self {
        Self { accepted: None }
    }

    pub fn accepted(&self) -> Option<&[String]> {
        self.accepted.as_deref()
    }

    pub fn matches(&self, role_family: Option<&str>) -> bool {
        match &self.accepted {
            None => true,
            Some(accepted) => {
                let Some(family) = role_family else {
                    return false;
                };
                let family = family.trim().to_lowercase();
                accepted.iter().any(|tag| *tag == family)
            }
        }
    }
}

/// Counts for one company: total matching open postings, plus one slot per
/// requested window (same order as the request).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowCounts {
    pub total: u32,
    pub windows: Vec<u32>,
}

/// Folds `postings` into per-company counts for every company in
/// `population`. Companies without a matching posting get zeros; postings of
/// companies outside the population are ignored.
pub fn extract(
    population: &[Company],
    postings: &[JobPosting],
    filter: &RoleFilter,
    windows: &[Window],
    now: DateTime<Utc>,
) -> BTreeMap<i64, WindowCounts> {
    let mut counts: BTreeMap<i64, WindowCounts> = population
        .iter()
        .map(|company| {
            (
                company.id,
                WindowCounts {
                    total: 0,
                    windows: vec![0; windows.len()],
                },
            )
        })
        .collect();

    let mut matched = 0usize;
    for posting in postings {
        if !filter.matches(posting.role_family.as_deref()) {
            continue;
        }
        let Some(acc) = counts.get_mut(&posting.company_id) else {
            continue;
        };
        matched += 1;
        acc.total = acc.total.saturating_add(1);

        let age = age_days(posting.effective_at(), now);
        for (slot, window) in acc.windows.iter_mut().zip(windows) {
            if window.contains_age(age) {
                *slot = slot.saturating_add(1);
            }
        }
    }

    tracing::debug!(
        companies = counts.len(),
        postings = postings.len(),
        matched,
        windows = windows.len(),
        "extracted window counts"
    );
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap()
    }

    fn company(id: i64) -> Company {
        Company {
            id,
            name: format!("Company {}", id),
            careers_url: None,
            ats_kind: None,
            created_at: now() - Duration::days(365),
        }
    }

    fn posting(company_id: i64, family: Option<&str>, created_days_ago: i64, updated_days_ago: Option<i64>) -> JobPosting {
        JobPosting {
            id: 0,
            company_id,
            source_job_id: "x".to_string(),
            title: "Engineer".to_string(),
            department: None,
            location: None,
            apply_url: None,
            role_family: family.map(str::to_string),
            status: "open".to_string(),
            created_at: now() - Duration::days(created_days_ago),
            updated_at: updated_days_ago.map(|d| now() - Duration::days(d)),
        }
    }

    fn synonyms() -> Vec<Vec<String>> {
        vec![vec!["software".into(), "swe".into(), "sde".into()]]
    }

    #[test]
    fn test_role_filter_expands_synonyms_case_insensitively() {
        let filter = RoleFilter::new("Software", &synonyms());
        assert!(filter.matches(Some("SDE")));
        assert!(filter.matches(Some(" swe ")));
        assert!(filter.matches(Some("software")));
        assert!(!filter.matches(Some("sales")));
        assert!(!filter.matches(None));
    }

    #[test]
    fn test_role_filter_without_synonym_group() {
        let filter = RoleFilter::new("design", &synonyms());
        assert_eq!(filter.accepted(), Some(&["design".to_string()][..]));
        assert!(filter.matches(Some("Design")));
        assert!(!filter.matches(Some("sde")));
    }

    #[test]
    fn test_blank_role_filter_matches_everything() {
        let filter = RoleFilter::new("  ", &synonyms());
        assert!(filter.matches(None));
        assert!(filter.matches(Some("anything")));
    }

    #[test]
    fn test_window_is_half_open() {
        let window = Window::new(14, 28);
        assert!(!window.contains_age(13.99));
        assert!(window.contains_age(14.0));
        assert!(window.contains_age(27.99));
        assert!(!window.contains_age(28.0));
    }

    #[test]
    fn test_future_timestamps_have_zero_age() {
        assert_eq!(age_days(now() + Duration::days(3), now()), 0.0);
        assert_eq!(age_days(now() - Duration::hours(36), now()), 1.5);
    }

    #[test]
    fn test_extract_counts_windows_and_zero_fills() {
        let population = vec![company(1), company(2)];
        let postings = vec![
            posting(1, Some("sde"), 2, None),
            posting(1, Some("SWE"), 20, Some(10)), // effective age 10
            posting(1, Some("software"), 20, None),
            posting(1, Some("sales"), 1, None),
            posting(3, Some("sde"), 1, None), // outside the population
        ];
        let filter = RoleFilter::new("software", &synonyms());
        let windows = [Window::last(7), Window::new(0, 14), Window::new(14, 28)];

        let counts = extract(&population, &postings, &filter, &windows, now());

        assert_eq!(counts.len(), 2);
        assert_eq!(
            counts[&1],
            WindowCounts {
                total: 3,
                windows: vec![1, 2, 1]
            }
        );
        assert_eq!(
            counts[&2],
            WindowCounts {
                total: 0,
                windows: vec![0, 0, 0]
            }
        );
        assert!(!counts.contains_key(&3));
    }

    #[test]
    fn test_extract_empty_population() {
        let postings = vec![posting(1, Some("sde"), 1, None)];
        let filter = RoleFilter::any();
        let counts = extract(&[], &postings, &filter, &[Window::last(7)], now());
        assert!(counts.is_empty());
    }
}
