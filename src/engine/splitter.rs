//! Decomposition of tests that hold several values on one budget.

use crate::domain::{SplitDimension, TestDraft};

/// Split `test` until no dimension violates its "one budget for all" flag.
///
/// Offers are split first, then traffic sources, then geo. Every clone keeps
/// the parent's budget, balance, category, dates and flags. A test that is
/// already split comes back unchanged as the only element.
pub fn split_test(test: &TestDraft) -> Vec<TestDraft> {
    let Some(dimension) = test.split_violation() else {
        return vec![test.clone()];
    };

    let clones: Vec<TestDraft> = match dimension {
        SplitDimension::Offers => test
            .offer_ids
            .iter()
            .map(|offer| TestDraft {
                offer_ids: [*offer].into_iter().collect(),
                ..test.clone()
            })
            .collect(),
        SplitDimension::TrafficSources => test
            .traffic_source_ids
            .iter()
            .map(|ts| TestDraft {
                traffic_source_ids: [*ts].into_iter().collect(),
                ..test.clone()
            })
            .collect(),
        SplitDimension::Geo => test
            .geos
            .iter()
            .map(|geo| TestDraft {
                geos: [geo.clone()].into_iter().collect(),
                ..test.clone()
            })
            .collect(),
    };

    clones.iter().flat_map(split_test).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decimal, OfferId, TrafficCategory, TrafficSourceId, UserId};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn draft(offers: &[i64], sources: &[i64], geos: &[&str]) -> TestDraft {
        TestDraft {
            user_id: UserId::new(3),
            category: TrafficCategory::Native,
            budget: Decimal::from(200),
            balance: Decimal::from(150),
            offer_ids: offers.iter().map(|o| OfferId::new(*o)).collect(),
            traffic_source_ids: sources.iter().map(|t| TrafficSourceId::new(*t)).collect(),
            geos: geos.iter().map(|g| g.to_string()).collect(),
            one_budget_for_all_offers: false,
            one_budget_for_all_traffic_sources: false,
            one_budget_for_all_geo: false,
            adding_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            lifetime_days: 30,
            archived: false,
        }
    }

    #[test]
    fn test_already_split_is_unchanged() {
        let t = draft(&[1], &[2], &["Peru"]);
        assert_eq!(split_test(&t), vec![t]);
    }

    #[test]
    fn test_splits_every_dimension() {
        let parts = split_test(&draft(&[1, 2], &[10, 11], &["Peru", "Chile"]));
        assert_eq!(parts.len(), 8);
        assert!(parts.iter().all(|p| p.split_violation().is_none()));
        assert!(parts
            .iter()
            .all(|p| p.balance == Decimal::from(150) && p.budget == Decimal::from(200)));

        let combos: BTreeSet<_> = parts
            .iter()
            .map(|p| (p.offer_ids.clone(), p.traffic_source_ids.clone(), p.geos.clone()))
            .collect();
        assert_eq!(combos.len(), 8);
    }

    #[test]
    fn test_offers_split_first() {
        let parts = split_test(&draft(&[1, 2], &[10, 11], &[]));
        let offers: Vec<i64> = parts
            .iter()
            .map(|p| p.offer_ids.iter().next().unwrap().as_i64())
            .collect();
        assert_eq!(offers, vec![1, 1, 2, 2]);
    }

    #[test]
    fn test_flagged_dimension_is_kept_together() {
        let mut t = draft(&[1, 2], &[10, 11], &[]);
        t.one_budget_for_all_offers = true;
        let parts = split_test(&t);
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.offer_ids.len() == 2));
    }
}
