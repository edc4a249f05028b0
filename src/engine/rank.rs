use std::cmp::Ordering;

use crate::models::{NewRecord, TopRecord};

// Names compare byte-wise (`str` ordering); the company id is the last key so
// the order stays total even if two companies share a name.

fn by_name_then_id(a_name: &str, a_id: i64, b_name: &str, b_id: i64) -> Ordering {
    a_name.cmp(b_name).then_with(|| a_id.cmp(&b_id))
}

/// Score descending, then name ascending.
pub fn top_order(a: &TopRecord, b: &TopRecord) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| by_name_then_id(&a.company_name, a.company_id, &b.company_name, b.company_id))
}

/// New-count descending, then total descending, then name ascending.
pub fn new_order(a: &NewRecord, b: &NewRecord) -> Ordering {
    b.sde_new
        .cmp(&a.sde_new)
        .then_with(|| b.sde_openings.cmp(&a.sde_openings))
        .then_with(|| by_name_then_id(&a.company_name, a.company_id, &b.company_name, b.company_id))
}

pub fn rank_top(mut records: Vec<TopRecord>, limit: usize) -> Vec<TopRecord> {
    records.sort_by(top_order);
    records.truncate(limit);
    records
}

/// Drops companies with neither new nor open postings before ordering.
pub fn rank_new(records: Vec<NewRecord>, limit: usize) -> Vec<NewRecord> {
    let mut records: Vec<NewRecord> = records
        .into_iter()
        .filter(|r| r.sde_new > 0 || r.sde_openings > 0)
        .collect();
    records.sort_by(new_order);
    records.truncate(limit);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TopFeatures;

    fn top(id: i64, name: &str, score: u32) -> TopRecord {
        TopRecord {
            company_id: id,
            company_name: name.to_string(),
            score,
            features: TopFeatures {
                open_count: 0,
                fresh_7d: 0,
                momentum_positive: 0,
                community_presence: false,
                layoff_decay: 0.0,
            },
        }
    }

    fn new(id: i64, name: &str, sde_new: u32, sde_openings: u32) -> NewRecord {
        NewRecord {
            company_id: id,
            company_name: name.to_string(),
            sde_new,
            sde_openings,
            score: 0,
            window_days: 7,
        }
    }

    fn names<T>(records: &[T], name: impl Fn(&T) -> &str) -> Vec<String> {
        records.iter().map(|r| name(r).to_string()).collect()
    }

    #[test]
    fn test_top_ties_break_on_name_bytewise() {
        let ranked = rank_top(
            vec![
                top(1, "beta", 40),
                top(2, "Zeta", 40),
                top(3, "alpha", 40),
                top(4, "Omega", 90),
            ],
            10,
        );
        // uppercase sorts before lowercase byte-wise
        assert_eq!(
            names(&ranked, |r| &r.company_name),
            vec!["Omega", "Zeta", "alpha", "beta"]
        );
    }

    #[test]
    fn test_top_order_is_stable_across_resorts() {
        let input = vec![
            top(5, "Same", 10),
            top(2, "Same", 10),
            top(9, "Other", 10),
            top(1, "Low", 3),
        ];
        let once = rank_top(input.clone(), 10);
        let mut reversed = input;
        reversed.reverse();
        let twice = rank_top(rank_top(reversed, 10), 10);
        assert_eq!(once, twice);
        assert_eq!(once[1].company_id, 2);
        assert_eq!(once[2].company_id, 5);
    }

    #[test]
    fn test_top_limit_truncates() {
        let ranked = rank_top(vec![top(1, "a", 1), top(2, "b", 2), top(3, "c", 3)], 2);
        assert_eq!(names(&ranked, |r| &r.company_name), vec!["c", "b"]);
    }

    #[test]
    fn test_new_view_ordering_and_inclusion() {
        let ranked = rank_new(
            vec![
                new(1, "Idle", 0, 0),
                new(2, "Busy", 3, 4),
                new(3, "Steady", 1, 9),
                new(4, "Also Steady", 1, 9),
                new(5, "Busier", 3, 7),
            ],
            10,
        );
        assert_eq!(
            names(&ranked, |r| &r.company_name),
            vec!["Busier", "Busy", "Also Steady", "Steady"]
        );
    }
}
