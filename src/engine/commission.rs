//! Commission tiers and team-lead overrides.

use crate::domain::{AuditTrail, Decimal, PercentDependency, TrafficCategory, UserId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Stepped percent of the period's total revenue for a salary group.
///
/// Thresholds are strict, so a tie stays on the lower step.
pub fn tier_percent(revenue: Decimal, salary_group: i32) -> Decimal {
    let over = |threshold: i64| revenue > Decimal::from(threshold);

    match salary_group {
        1 if over(10_000) => Decimal::from_parts(6, 1),
        1 if over(5_000) => Decimal::from_parts(55, 2),
        1 => Decimal::from_parts(5, 1),
        2 if over(20_000) => Decimal::from_parts(4, 1),
        2 if over(10_000) => Decimal::from_parts(35, 2),
        2 => Decimal::from_parts(3, 1),
        3 => Decimal::from_parts(15, 2),
        _ => Decimal::zero(),
    }
}

/// A subordinate's profit-with-tests and the share its lead earns on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubordinateProfit {
    pub login: String,
    pub percent: Decimal,
    pub profit_by_category: BTreeMap<TrafficCategory, Decimal>,
}

/// Sum the lead's share of each subordinate's positive profit.
///
/// Zero and negative profits contribute nothing; they never reduce the override.
pub fn override_from_subordinates(
    subordinates: &[SubordinateProfit],
    categories: &BTreeSet<TrafficCategory>,
) -> BTreeMap<TrafficCategory, AuditTrail> {
    let mut trails: BTreeMap<TrafficCategory, AuditTrail> =
        categories.iter().map(|c| (*c, AuditTrail::new())).collect();

    for subordinate in subordinates {
        for (category, trail) in trails.iter_mut() {
            let profit = subordinate
                .profit_by_category
                .get(category)
                .copied()
                .unwrap_or_default();
            let share = (profit * subordinate.percent).round_money();
            if share.is_positive() {
                trail.push(share, subordinate.login.as_str());
            }
        }
    }

    trails
}

/// Look for a cycle among the dependency edges reachable from `lead`.
///
/// Walks from each lead to the users it earns from. Returns the first user
/// found twice on the current path.
pub fn find_dependency_cycle(lead: UserId, edges: &[PercentDependency]) -> Option<UserId> {
    let mut subordinates: HashMap<UserId, Vec<UserId>> = HashMap::new();
    for edge in edges {
        subordinates.entry(edge.to_user).or_default().push(edge.from_user);
    }

    fn visit(
        user: UserId,
        subordinates: &HashMap<UserId, Vec<UserId>>,
        on_path: &mut HashSet<UserId>,
        done: &mut HashSet<UserId>,
    ) -> Option<UserId> {
        if on_path.contains(&user) {
            return Some(user);
        }
        if done.contains(&user) {
            return None;
        }
        on_path.insert(user);
        for next in subordinates.get(&user).into_iter().flatten() {
            if let Some(found) = visit(*next, subordinates, on_path, done) {
                return Some(found);
            }
        }
        on_path.remove(&user);
        done.insert(user);
        None
    }

    visit(lead, &subordinates, &mut HashSet::new(), &mut HashSet::new())
}
