use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::engine::features::{age_days, Window};
use crate::models::{Company, Signal, SignalKind};

/// Discrete market signals for one company.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalSummary {
    /// Any community-hiring mention inside the lookback window. The raw
    /// count is deliberately not kept.
    pub community_presence: bool,
    pub latest_layoff: Option<DateTime<Utc>>,
}

/// Per-company signal presence and recency. `layoff_lookback` of `None`
/// keeps every layoff on record.
pub fn aggregate(
    population: &[Company],
    signals: &[Signal],
    community_lookback: Window,
    layoff_lookback: Option<Window>,
    now: DateTime<Utc>,
) -> BTreeMap<i64, SignalSummary> {
    let mut summaries: BTreeMap<i64, SignalSummary> = population
        .iter()
        .map(|company| (company.id, SignalSummary::default()))
        .collect();

    for signal in signals {
        let Some(summary) = summaries.get_mut(&signal.company_id) else {
            continue;
        };
        let age = age_days(signal.happened_at, now);
        match signal.kind {
            SignalKind::CommunityHiring => {
                if community_lookback.contains_age(age) {
                    summary.community_presence = true;
                }
            }
            SignalKind::Layoff => {
                if layoff_lookback.is_some_and(|w| !w.contains_age(age)) {
                    continue;
                }
                if summary.latest_layoff.is_none_or(|seen| signal.happened_at > seen) {
                    summary.latest_layoff = Some(signal.happened_at);
                }
            }
            SignalKind::Funding | SignalKind::Earnings => {}
        }
    }

    summaries
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
            created_at: now(),
        }
    }

    fn signal(company_id: i64, kind: SignalKind, days_ago: i64) -> Signal {
        Signal {
            id: 0,
            company_id,
            kind,
            happened_at: now() - Duration::days(days_ago),
            payload: None,
        }
    }

    #[test]
    fn test_community_presence_respects_lookback() {
        let population = vec![company(1), company(2), company(3)];
        let signals = vec![
            signal(1, SignalKind::CommunityHiring, 10),
            signal(1, SignalKind::CommunityHiring, 12),
            signal(2, SignalKind::CommunityHiring, 40),
        ];
        let out = aggregate(&population, &signals, Window::last(35), None, now());
        assert!(out[&1].community_presence);
        assert!(!out[&2].community_presence);
        assert!(!out[&3].community_presence);
    }

    #[test]
    fn test_latest_layoff_wins() {
        let population = vec![company(1)];
        let signals = vec![
            signal(1, SignalKind::Layoff, 200),
            signal(1, SignalKind::Layoff, 45),
            signal(1, SignalKind::Layoff, 90),
        ];
        let out = aggregate(&population, &signals, Window::last(35), None, now());
        assert_eq!(out[&1].latest_layoff, Some(now() - Duration::days(45)));
    }

    #[test]
    fn test_layoff_lookback_drops_old_events() {
        let population = vec![company(1)];
        let signals = vec![signal(1, SignalKind::Layoff, 200)];
        let out = aggregate(
            &population,
            &signals,
            Window::last(35),
            Some(Window::last(120)),
            now(),
        );
        assert_eq!(out[&1].latest_layoff, None);
    }

    #[test]
    fn test_other_kinds_are_ignored() {
        let population = vec![company(1)];
        let signals = vec![
            signal(1, SignalKind::Funding, 1),
            signal(1, SignalKind::Earnings, 1),
            signal(9, SignalKind::Layoff, 1),
        ];
        let out = aggregate(&population, &signals, Window::last(35), None, now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[&1], SignalSummary::default());
    }
}
