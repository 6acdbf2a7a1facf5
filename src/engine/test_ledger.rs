//! Test-budget ledger: matches losing campaigns against a user's tests and
//! consumes their balances.

use crate::domain::{
    AuditTrail, Campaign, CampaignId, Decimal, SplitDimension, TestBudget, TestId,
    TrafficCategory,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Dominant geo per campaign for the calculation window. `None` means no clicks.
pub type DominantGeos = HashMap<CampaignId, Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Test with id {test_id} isn't split by {dimension}.")]
    NotSplit {
        test_id: TestId,
        dimension: SplitDimension,
    },
    #[error("Dominant geo of campaign {0} was not resolved.")]
    GeoUnresolved(CampaignId),
}

/// Balance movement of one test during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestBalanceChange {
    pub test_id: TestId,
    pub start_balance: Decimal,
    /// May be negative when the last loss exceeded the remaining balance.
    pub end_balance: Decimal,
}

impl TestBalanceChange {
    pub fn is_exhausted(&self) -> bool {
        !self.end_balance.is_positive()
    }

    /// Whether a committing run must write this test back.
    pub fn needs_persist(&self) -> bool {
        self.end_balance != self.start_balance || self.is_exhausted()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerOutcome {
    pub by_category: BTreeMap<TrafficCategory, AuditTrail>,
    pub changes: Vec<TestBalanceChange>,
}

impl LedgerOutcome {
    pub fn total(&self, category: TrafficCategory) -> Decimal {
        self.by_category
            .get(&category)
            .map(AuditTrail::total)
            .unwrap_or_default()
    }
}

/// Reject tests holding several offers, traffic sources or geos on one budget
/// without the matching "one budget for all" flag.
pub fn ensure_split<'t>(
    tests: impl IntoIterator<Item = &'t TestBudget>,
) -> Result<(), LedgerError> {
    for test in tests {
        if let Some(dimension) = test.draft.split_violation() {
            tracing::error!("Test with id {} doesn't split by {}.", test.id, dimension);
            return Err(LedgerError::NotSplit {
                test_id: test.id,
                dimension,
            });
        }
    }
    Ok(())
}

/// Walks active tests against the period's campaigns.
pub struct TestLedger<'a> {
    categories: &'a BTreeSet<TrafficCategory>,
}

impl<'a> TestLedger<'a> {
    pub fn new(categories: &'a BTreeSet<TrafficCategory>) -> Self {
        Self { categories }
    }

    fn relevant<'t>(&self, tests: &'t [TestBudget]) -> Vec<&'t TestBudget> {
        let mut relevant: Vec<&TestBudget> = tests
            .iter()
            .filter(|t| !t.draft.archived && self.categories.contains(&t.draft.category))
            .collect();
        relevant.sort_by_key(|t| t.id);
        relevant
    }

    /// Campaigns matching `test` on category, traffic source and offers, by id.
    fn offer_matches<'c>(&self, test: &TestBudget, campaigns: &'c [Campaign]) -> Vec<&'c Campaign> {
        let mut matched: Vec<&Campaign> = campaigns
            .iter()
            .filter(|c| {
                c.in_categories(self.categories)
                    && test.draft.traffic_source_ids.contains(&c.traffic_source_id)
                    && !c.offer_ids.is_disjoint(&test.draft.offer_ids)
            })
            .collect();
        matched.sort_by_key(|c| c.id);
        matched
    }

    /// Campaigns whose dominant geo must be looked up before [`apply`](Self::apply).
    pub fn geo_lookups_needed(
        &self,
        tests: &[TestBudget],
        campaigns: &[Campaign],
    ) -> BTreeSet<CampaignId> {
        self.relevant(tests)
            .into_iter()
            .filter(|t| !t.draft.geos.is_empty())
            .flat_map(|t| self.offer_matches(t, campaigns))
            .map(|c| c.id)
            .collect()
    }

    /// Consume test balances with the period's losing campaigns.
    ///
    /// A campaign is drawn against at most one test per pass. Each test
    /// absorbs the full loss while its balance covers it, then whatever
    /// balance remains.
    pub fn apply(
        &self,
        tests: &[TestBudget],
        campaigns: &[Campaign],
        geos: &DominantGeos,
    ) -> Result<LedgerOutcome, LedgerError> {
        let relevant = self.relevant(tests);
        ensure_split(relevant.iter().copied())?;

        let mut outcome = LedgerOutcome {
            by_category: self
                .categories
                .iter()
                .map(|c| (*c, AuditTrail::new()))
                .collect(),
            changes: Vec::with_capacity(relevant.len()),
        };
        let mut consumed: HashSet<CampaignId> = HashSet::new();

        for test in relevant {
            let mut matched = Vec::new();
            for campaign in self.offer_matches(test, campaigns) {
                if test.draft.geos.is_empty() {
                    matched.push(campaign);
                    continue;
                }
                let dominant = geos
                    .get(&campaign.id)
                    .ok_or(LedgerError::GeoUnresolved(campaign.id))?;
                if dominant
                    .as_ref()
                    .map(|g| test.draft.geos.contains(g))
                    .unwrap_or(false)
                {
                    matched.push(campaign);
                }
            }

            let start_balance = test.draft.balance;
            let mut balance = start_balance;

            for campaign in matched {
                if !campaign.profit.is_negative() || consumed.contains(&campaign.id) {
                    continue;
                }
                if !balance.is_positive() {
                    break;
                }
                let Some(category) = campaign.category else {
                    continue;
                };

                let loss = campaign.profit.abs();
                let absorbed = if balance < loss { balance } else { loss };
                if let Some(trail) = outcome.by_category.get_mut(&category) {
                    trail.push(absorbed, campaign.id.to_string());
                }
                balance = balance + campaign.profit;
                consumed.insert(campaign.id);
            }

            outcome.changes.push(TestBalanceChange {
                test_id: test.id,
                start_balance,
                end_balance: balance.round_money(),
            });
        }

        Ok(outcome)
    }
}

/// Period profit plus test contributions, without touching any balances.
pub fn profit_with_tests(
    campaigns: &[Campaign],
    tests: &[TestBudget],
    categories: &BTreeSet<TrafficCategory>,
    geos: &DominantGeos,
) -> Result<BTreeMap<TrafficCategory, Decimal>, LedgerError> {
    let profit = super::reconciliation::profit_for_period(campaigns, categories);
    let ledger = TestLedger::new(categories).apply(tests, campaigns, geos)?;

    Ok(categories
        .iter()
        .map(|c| (*c, (profit.profit_of(*c) + ledger.total(*c)).round_money()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OfferId, TestDraft, TrafficSourceId, UserId};
    use chrono::NaiveDate;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn campaign(id: i64, ts: i64, offer: i64, profit: &str) -> Campaign {
        Campaign {
            id: CampaignId::new(id),
            name: format!("camp-{}", id),
            category: Some(TrafficCategory::Push),
            traffic_source_id: TrafficSourceId::new(ts),
            user_id: UserId::new(1),
            revenue: Decimal::zero(),
            cost: -d(profit),
            profit: d(profit),
            offer_ids: [OfferId::new(offer)].into_iter().collect(),
        }
    }

    fn test_budget(id: i64, ts: i64, offer: i64, balance: &str) -> TestBudget {
        TestBudget::new(
            TestId::new(id),
            TestDraft {
                user_id: UserId::new(1),
                category: TrafficCategory::Push,
                budget: d("100"),
                balance: d(balance),
                offer_ids: [OfferId::new(offer)].into_iter().collect(),
                traffic_source_ids: [TrafficSourceId::new(ts)].into_iter().collect(),
                geos: BTreeSet::new(),
                one_budget_for_all_offers: false,
                one_budget_for_all_traffic_sources: false,
                one_budget_for_all_geo: false,
                adding_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                lifetime_days: 60,
                archived: false,
            },
        )
    }

    fn push_only() -> BTreeSet<TrafficCategory> {
        [TrafficCategory::Push].into_iter().collect()
    }

    #[test]
    fn test_full_loss_absorbed_within_balance() {
        let categories = push_only();
        let outcome = TestLedger::new(&categories)
            .apply(
                &[test_budget(1, 5, 10, "100")],
                &[campaign(77, 5, 10, "-40")],
                &DominantGeos::new(),
            )
            .unwrap();

        assert_eq!(outcome.total(TrafficCategory::Push), d("40"));
        assert_eq!(outcome.by_category[&TrafficCategory::Push].render(), "40.0 [77]");
        assert_eq!(outcome.changes[0].end_balance, d("60"));
        assert!(outcome.changes[0].needs_persist());
        assert!(!outcome.changes[0].is_exhausted());
    }

    #[test]
    fn test_remaining_balance_absorbed_when_loss_exceeds_it() {
        let categories = push_only();
        let outcome = TestLedger::new(&categories)
            .apply(
                &[test_budget(1, 5, 10, "25")],
                &[campaign(1, 5, 10, "-40"), campaign(2, 5, 10, "-10")],
                &DominantGeos::new(),
            )
            .unwrap();

        assert_eq!(outcome.total(TrafficCategory::Push), d("25"));
        assert_eq!(outcome.changes[0].end_balance, d("-15"));
        assert!(outcome.changes[0].is_exhausted());
    }

    #[test]
    fn test_profitable_and_unmatched_campaigns_are_skipped() {
        let categories = push_only();
        let outcome = TestLedger::new(&categories)
            .apply(
                &[test_budget(1, 5, 10, "100")],
                &[
                    campaign(1, 5, 10, "30"),
                    campaign(2, 6, 10, "-20"),
                    campaign(3, 5, 11, "-20"),
                ],
                &DominantGeos::new(),
            )
            .unwrap();

        assert_eq!(outcome.total(TrafficCategory::Push), Decimal::zero());
        assert_eq!(outcome.by_category[&TrafficCategory::Push].render(), "0.0");
        assert!(!outcome.changes[0].needs_persist());
    }

    #[test]
    fn test_campaign_consumed_by_one_test_only() {
        let categories = push_only();
        let outcome = TestLedger::new(&categories)
            .apply(
                &[test_budget(1, 5, 10, "10"), test_budget(2, 5, 10, "100")],
                &[campaign(1, 5, 10, "-30")],
                &DominantGeos::new(),
            )
            .unwrap();

        assert_eq!(outcome.total(TrafficCategory::Push), d("10"));
        assert_eq!(outcome.changes[1].end_balance, d("100"));
    }

    #[test]
    fn test_unsplit_test_aborts() {
        let categories = push_only();
        let mut test = test_budget(9, 5, 10, "100");
        test.draft.offer_ids.insert(OfferId::new(11));

        let err = TestLedger::new(&categories)
            .apply(&[test], &[], &DominantGeos::new())
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::NotSplit {
                test_id: TestId::new(9),
                dimension: SplitDimension::Offers
            }
        );
    }

    #[test]
    fn test_geo_scoped_test_uses_dominant_geo() {
        let categories = push_only();
        let mut test = test_budget(1, 5, 10, "100");
        test.draft.geos.insert("Brazil".to_string());
        let campaigns = vec![campaign(1, 5, 10, "-10"), campaign(2, 5, 10, "-20")];

        let ledger = TestLedger::new(&categories);
        let needed = ledger.geo_lookups_needed(std::slice::from_ref(&test), &campaigns);
        assert_eq!(
            needed,
            [CampaignId::new(1), CampaignId::new(2)].into_iter().collect()
        );

        let mut geos = DominantGeos::new();
        geos.insert(CampaignId::new(1), Some("Brazil".to_string()));
        geos.insert(CampaignId::new(2), None);

        let outcome = ledger.apply(&[test], &campaigns, &geos).unwrap();
        assert_eq!(outcome.total(TrafficCategory::Push), d("10"));
    }

    #[test]
    fn test_missing_geo_lookup_is_an_error() {
        let categories = push_only();
        let mut test = test_budget(1, 5, 10, "100");
        test.draft.geos.insert("Brazil".to_string());

        let err = TestLedger::new(&categories)
            .apply(&[test], &[campaign(1, 5, 10, "-10")], &DominantGeos::new())
            .unwrap_err();
        assert_eq!(err, LedgerError::GeoUnresolved(CampaignId::new(1)));
    }

    #[test]
    fn test_inactive_category_tests_are_ignored() {
        let categories: BTreeSet<_> = [TrafficCategory::Pop].into_iter().collect();
        let mut unsplit = test_budget(1, 5, 10, "100");
        unsplit.draft.offer_ids.insert(OfferId::new(11));

        let outcome = TestLedger::new(&categories)
            .apply(&[unsplit], &[campaign(1, 5, 10, "-10")], &DominantGeos::new())
            .unwrap();
        assert!(outcome.changes.is_empty());
    }

    #[test]
    fn test_profit_with_tests_adds_contributions() {
        let categories = push_only();
        let profit = profit_with_tests(
            &[campaign(1, 5, 10, "-40"), campaign(2, 6, 12, "100")],
            &[test_budget(1, 5, 10, "100")],
            &categories,
            &DominantGeos::new(),
        )
        .unwrap();
        assert_eq!(profit[&TrafficCategory::Push], d("100"));
    }
}
