//! Salary orchestration: fetches tracker data, runs the engine in order and
//! commits the outcome.

use crate::cache::{geo_key, offers_key, MemoStore};
use crate::config::{Config, DeltaMode};
use crate::datasource::{DataSource, DataSourceError};
use crate::db::{CommitPlan, NewReport, Repository};
use crate::domain::{
    AuditTrail, AuditedAmount, Campaign, CampaignId, CampaignSnapshot, Decimal, OfferId, Period,
    Report, ReportCategory, ReportId, SplitDimension, TestBudget, TestId, TrafficCategory, User,
    UserId,
};
use crate::engine::{
    combine_report_deltas, compute_deltas, ensure_split, find_dependency_cycle,
    override_from_subordinates, profit_for_period, profit_with_tests, settle, tier_percent,
    CalculationResult, CategoryBreakdown, CategoryInputs, DeltaOutcome, DominantGeos,
    LedgerError, LedgerOutcome, SubordinateProfit, TestLedger,
};
use crate::orchestration::sync::{SyncError, Synchronizer};
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum SalaryError {
    #[error("Tracker unavailable: {0}")]
    GatewayUnavailable(#[from] DataSourceError),
    #[error("Test with id {test_id} isn't split by {dimension}. Split it before counting.")]
    TestNotSplit {
        test_id: TestId,
        dimension: SplitDimension,
    },
    #[error("Offer {offer_id} is unknown even after re-syncing the catalogue")]
    UnresolvableOffer { offer_id: OfferId },
    #[error("Percent dependencies form a cycle through user {user_id}")]
    DependencyCycle { user_id: UserId },
    #[error("User {0} not found")]
    UserNotFound(UserId),
    #[error("Invalid period {0}: start is after end")]
    InvalidPeriod(Period),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl From<LedgerError> for SalaryError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotSplit { test_id, dimension } => {
                SalaryError::TestNotSplit { test_id, dimension }
            }
            LedgerError::GeoUnresolved(campaign) => {
                SalaryError::GatewayUnavailable(DataSourceError::Other(format!(
                    "dominant geo of campaign {} was not fetched",
                    campaign
                )))
            }
        }
    }
}

impl From<SyncError> for SalaryError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::DataSource(e) => SalaryError::GatewayUnavailable(e),
            SyncError::Db(e) => SalaryError::Db(e),
        }
    }
}

/// One calculation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalaryRequest {
    pub user_id: UserId,
    pub period: Period,
    pub commit: bool,
    pub categories: BTreeSet<TrafficCategory>,
    /// Day against which test lifetimes are checked.
    pub as_of: NaiveDate,
}

/// Delta trails plus the snapshot rows they raise.
struct Deltas {
    by_category: BTreeMap<TrafficCategory, AuditTrail>,
    snapshot_updates: Vec<(ReportId, CampaignId, Decimal)>,
}

/// Runs salary calculations for one user at a time.
///
/// The engine holds no locks; callers must serialize calculations of the
/// same user.
#[derive(Clone)]
pub struct SalaryOrchestrator {
    datasource: Arc<dyn DataSource>,
    repo: Arc<Repository>,
    memo: Arc<dyn MemoStore>,
    synchronizer: Synchronizer,
    config: Config,
}

impl SalaryOrchestrator {
    pub fn new(
        datasource: Arc<dyn DataSource>,
        repo: Arc<Repository>,
        memo: Arc<dyn MemoStore>,
        config: Config,
    ) -> Self {
        let synchronizer = Synchronizer::new(datasource.clone(), repo.clone());
        Self {
            datasource,
            repo,
            memo,
            synchronizer,
            config,
        }
    }

    /// Calculate `user_id`'s salary for `start..=end`, tests checked against today.
    pub async fn calculate_user_salary(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
        commit: bool,
        categories: &BTreeSet<TrafficCategory>,
    ) -> Result<CalculationResult, SalaryError> {
        self.calculate(SalaryRequest {
            user_id,
            period: Period::new(start, end),
            commit,
            categories: categories.clone(),
            as_of: Utc::now().date_naive(),
        })
        .await
    }

    /// Run one calculation. The memo store is cleared afterwards whatever the outcome.
    pub async fn calculate(&self, request: SalaryRequest) -> Result<CalculationResult, SalaryError> {
        let result = self.run(&request).await;
        self.memo.clear();
        if let Err(e) = &result {
            error!(user = %request.user_id, "Calculation for {} aborted: {}", request.period, e);
        }
        result
    }

    async fn run(&self, request: &SalaryRequest) -> Result<CalculationResult, SalaryError> {
        let period = request.period;
        let categories = &request.categories;
        if !period.is_valid() {
            return Err(SalaryError::InvalidPeriod(period));
        }

        let user = self
            .repo
            .get_user(request.user_id)
            .await?
            .ok_or(SalaryError::UserNotFound(request.user_id))?;
        info!(user = %user.id, "Counting salary of {} for {}", user.login, period);

        let (tests, expired) = self.live_tests(user.id, request.as_of).await?;
        ensure_split(tests.iter().filter(|t| categories.contains(&t.draft.category)))?;

        let campaigns = self.load_campaigns(user.id, period).await?;
        let deltas = self.deltas(&user, period, categories).await?;
        let profit = profit_for_period(&campaigns, categories);

        let ledger = TestLedger::new(categories);
        let geos = self
            .dominant_geos(ledger.geo_lookups_needed(&tests, &campaigns), period)
            .await?;
        let ledger_outcome = ledger.apply(&tests, &campaigns, &geos)?;

        let percent = tier_percent(profit.total_revenue(), user.salary_group);
        let overrides = if user.is_lead {
            Some(self.team_lead_override(&user, period, categories, request.as_of).await?)
        } else {
            None
        };

        let mut breakdown = BTreeMap::new();
        let mut balances = BTreeMap::new();
        for category in categories {
            let delta = deltas
                .by_category
                .get(category)
                .map(AuditTrail::to_audited)
                .unwrap_or_else(AuditedAmount::zero);
            let tests_audit = ledger_outcome
                .by_category
                .get(category)
                .map(AuditTrail::to_audited)
                .unwrap_or_else(AuditedAmount::zero);
            let team_lead_override = overrides.as_ref().map(|o| {
                o.get(category)
                    .map(AuditTrail::to_audited)
                    .unwrap_or_else(AuditedAmount::zero)
            });

            let settlement = settle(&CategoryInputs {
                start_balance: user.balance(*category),
                profit: profit.profit_of(*category),
                delta: delta.amount,
                tests: tests_audit.amount,
                percent,
                override_amount: team_lead_override.as_ref().map(|o| o.amount),
            });
            debug!(category = category.as_str(), "{}", settlement.calculation);

            balances.insert(*category, settlement.carried_balance);
            breakdown.insert(
                *category,
                CategoryBreakdown {
                    start_balance: user.balance(*category),
                    revenue: profit.revenue_of(*category),
                    profit: profit.profit_of(*category),
                    delta,
                    tests: tests_audit,
                    team_lead_override,
                    result: AuditedAmount {
                        amount: settlement.amount,
                        calculation: settlement.calculation,
                    },
                },
            );
        }

        let result = CalculationResult {
            user_id: user.id,
            login: user.login.clone(),
            period,
            committed: request.commit,
            total_revenue: profit.total_revenue(),
            percent,
            categories: breakdown,
        };

        if request.commit {
            self.commit(&user, &result, balances, campaigns, ledger_outcome, expired, deltas)
                .await?;
        }

        info!(
            user = %user.id,
            committed = request.commit,
            "Salary of {} for {} counted at {}",
            user.login,
            period,
            percent.to_canonical_string()
        );
        Ok(result)
    }

    /// Active tests that are still within their lifetime, and the ids of the expired ones.
    async fn live_tests(
        &self,
        user: UserId,
        as_of: NaiveDate,
    ) -> Result<(Vec<TestBudget>, Vec<TestId>), SalaryError> {
        let (expired, live): (Vec<TestBudget>, Vec<TestBudget>) = self
            .repo
            .active_tests(user)
            .await?
            .into_iter()
            .partition(|t| t.draft.is_expired(as_of));
        if !expired.is_empty() {
            info!(user = %user, "{} expired tests will be archived", expired.len());
        }
        Ok((live, expired.into_iter().map(|t| t.id).collect()))
    }

    /// Campaigns of `user` over `period` with their offer ids filled in.
    async fn load_campaigns(
        &self,
        user: UserId,
        period: Period,
    ) -> Result<Vec<Campaign>, SalaryError> {
        let mut campaigns = self.datasource.fetch_campaigns(user, period).await?;
        for campaign in &mut campaigns {
            campaign.offer_ids = self.campaign_offers(campaign.id).await?;
        }
        Ok(campaigns)
    }

    /// Memo first, then the local mirror, then the tracker.
    async fn campaign_offers(&self, campaign: CampaignId) -> Result<BTreeSet<OfferId>, SalaryError> {
        let key = offers_key(campaign);
        if let Some(cached) = self.memo.get(&key) {
            if let Ok(ids) = serde_json::from_str::<BTreeSet<OfferId>>(&cached) {
                return Ok(ids);
            }
        }

        let ids = match self.repo.campaign_offer_ids(campaign).await? {
            Some(ids) => ids,
            None => self
                .datasource
                .fetch_campaign_offers(campaign)
                .await?
                .into_iter()
                .collect(),
        };
        if let Ok(encoded) = serde_json::to_string(&ids) {
            self.memo.set(&key, encoded);
        }
        Ok(ids)
    }

    async fn dominant_geos(
        &self,
        campaigns: BTreeSet<CampaignId>,
        period: Period,
    ) -> Result<DominantGeos, SalaryError> {
        let mut geos = DominantGeos::new();
        for campaign in campaigns {
            let key = geo_key(campaign, period);
            let cached = self
                .memo
                .get(&key)
                .and_then(|v| serde_json::from_str::<Option<String>>(&v).ok());
            let geo = match cached {
                Some(geo) => geo,
                None => {
                    let geo = self.datasource.fetch_dominant_geo(campaign, period).await?;
                    if let Ok(encoded) = serde_json::to_string(&geo) {
                        self.memo.set(&key, encoded);
                    }
                    geo
                }
            };
            geos.insert(campaign, geo);
        }
        Ok(geos)
    }

    async fn deltas(
        &self,
        user: &User,
        period: Period,
        categories: &BTreeSet<TrafficCategory>,
    ) -> Result<Deltas, SalaryError> {
        match self.config.delta_mode {
            DeltaMode::History => self.history_deltas(user, period, categories).await,
            DeltaMode::Lookback => self.lookback_deltas(user, period, categories).await,
        }
    }

    /// Re-fetch every earlier report period and compare with its snapshots.
    ///
    /// Reports sharing a period are merged first, so a campaign's rise is paid
    /// once per period however many times that period was committed. The raised
    /// profit is written back to every report holding the campaign.
    async fn history_deltas(
        &self,
        user: &User,
        period: Period,
        categories: &BTreeSet<TrafficCategory>,
    ) -> Result<Deltas, SalaryError> {
        let mut by_period: BTreeMap<Period, Vec<Report>> = BTreeMap::new();
        for report in self.repo.reports_for(user.id).await? {
            if report.period.end < period.start {
                by_period.entry(report.period).or_default().push(report);
            }
        }

        let mut per_period: Vec<(Period, DeltaOutcome)> = Vec::new();
        let mut snapshot_updates = Vec::new();
        for (report_period, reports) in &by_period {
            let mut stored: BTreeMap<CampaignId, Decimal> = BTreeMap::new();
            for snapshot in reports.iter().flat_map(|r| r.campaigns.iter()) {
                stored
                    .entry(snapshot.campaign_id)
                    .and_modify(|p| *p = (*p).max(snapshot.profit))
                    .or_insert(snapshot.profit);
            }
            if stored.is_empty() {
                continue;
            }

            let fresh = self.datasource.fetch_campaigns(user.id, *report_period).await?;
            let outcome = compute_deltas(&fresh, &stored, categories);
            for (campaign, profit) in &outcome.raised {
                for report in reports
                    .iter()
                    .filter(|r| r.campaigns.iter().any(|s| s.campaign_id == *campaign))
                {
                    snapshot_updates.push((report.id, *campaign, *profit));
                }
            }
            per_period.push((*report_period, outcome));
        }
        debug!(
            user = %user.id,
            periods = per_period.len(),
            raised = snapshot_updates.len(),
            "History deltas computed"
        );

        Ok(Deltas {
            by_category: combine_report_deltas(&per_period, categories),
            snapshot_updates,
        })
    }

    /// Compare a fixed window before the period with the local campaign mirror.
    async fn lookback_deltas(
        &self,
        user: &User,
        period: Period,
        categories: &BTreeSet<TrafficCategory>,
    ) -> Result<Deltas, SalaryError> {
        let window = period.lookback(self.config.delta_lookback_days);
        let fresh = self.datasource.fetch_campaigns(user.id, window).await?;
        let stored: BTreeMap<CampaignId, Decimal> = self
            .repo
            .stored_campaigns(user.id)
            .await?
            .into_iter()
            .map(|c| (c.id, c.profit))
            .collect();

        let outcome = compute_deltas(&fresh, &stored, categories);
        Ok(Deltas {
            by_category: outcome.by_category,
            snapshot_updates: Vec::new(),
        })
    }

    /// The lead's share of each subordinate's profit-with-tests.
    async fn team_lead_override(
        &self,
        lead: &User,
        period: Period,
        categories: &BTreeSet<TrafficCategory>,
        as_of: NaiveDate,
    ) -> Result<BTreeMap<TrafficCategory, AuditTrail>, SalaryError> {
        let edges = self.repo.all_dependencies().await?;
        if let Some(user_id) = find_dependency_cycle(lead.id, &edges) {
            return Err(SalaryError::DependencyCycle { user_id });
        }

        let mut subordinates = Vec::new();
        for edge in edges.iter().filter(|e| e.to_user == lead.id) {
            let subordinate = self
                .repo
                .get_user(edge.from_user)
                .await?
                .ok_or(SalaryError::UserNotFound(edge.from_user))?;
            let (tests, _) = self.live_tests(subordinate.id, as_of).await?;
            let campaigns = self.load_campaigns(subordinate.id, period).await?;
            let geos = self
                .dominant_geos(
                    TestLedger::new(categories).geo_lookups_needed(&tests, &campaigns),
                    period,
                )
                .await?;

            subordinates.push(SubordinateProfit {
                login: subordinate.login,
                percent: edge.percent,
                profit_by_category: profit_with_tests(&campaigns, &tests, categories, &geos)?,
            });
        }

        Ok(override_from_subordinates(&subordinates, categories))
    }

    /// Unknown offers trigger one catalogue re-sync before giving up.
    async fn ensure_offers_known(&self, campaigns: &[Campaign]) -> Result<(), SalaryError> {
        let referenced: BTreeSet<OfferId> = campaigns
            .iter()
            .flat_map(|c| c.offer_ids.iter().copied())
            .collect();
        if referenced.is_empty() {
            return Ok(());
        }

        let known = self.repo.known_offer_ids(&referenced).await?;
        if known.len() == referenced.len() {
            return Ok(());
        }

        info!("{} offers unknown locally, re-syncing", referenced.len() - known.len());
        self.synchronizer.sync_offers().await?;

        let known = self.repo.known_offer_ids(&referenced).await?;
        match referenced.difference(&known).next() {
            Some(offer_id) => Err(SalaryError::UnresolvableOffer { offer_id: *offer_id }),
            None => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn commit(
        &self,
        user: &User,
        result: &CalculationResult,
        balances: BTreeMap<TrafficCategory, Decimal>,
        campaigns: Vec<Campaign>,
        ledger: LedgerOutcome,
        expired_tests: Vec<TestId>,
        deltas: Deltas,
    ) -> Result<ReportId, SalaryError> {
        self.ensure_offers_known(&campaigns).await?;

        let report = NewReport {
            period: result.period,
            categories: result
                .categories
                .iter()
                .map(|(category, b)| {
                    (
                        *category,
                        ReportCategory {
                            revenue: b.revenue,
                            profit: b.profit,
                            percent: result.percent,
                            amount: b.result.amount,
                        },
                    )
                })
                .collect(),
            campaigns: campaigns
                .iter()
                .filter_map(|c| {
                    c.category
                        .filter(|category| result.categories.contains_key(category))
                        .map(|category| CampaignSnapshot {
                            campaign_id: c.id,
                            category,
                            profit: c.profit,
                        })
                })
                .collect(),
        };

        let plan = CommitPlan {
            user_id: user.id,
            balances,
            test_changes: ledger.changes,
            exhausted_policy: self.config.exhausted_test_policy,
            expired_tests,
            campaigns,
            report,
            snapshot_updates: deltas.snapshot_updates,
        };
        Ok(self.repo.apply_commit(&plan).await?)
    }
}
