use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use super::batch::{BatchResult, ManagerAssessmentResult, ManagerOutcome};
use super::{AssessmentStore, Confirmation, Demotion, TransitionOutcome, UpsertOutcome};
use crate::aggregation::aggregate;
use crate::clock::Clock;
use crate::decision::{decide, DEMOTION_FLOOR};
use crate::domain::assessment::{Assessment, AssessmentDraft, AssessmentId, AssessmentStatus};
use crate::domain::manager::{Manager, ManagerId, Role};
use crate::domain::role_change::{RoleChangeAuditEntry, RoleChangeId};
use crate::domain::tier::TierTable;
use crate::errors::EngineError;
use crate::period::Period;

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemotionOutcome {
    pub assessment: Assessment,
    pub manager: Manager,
    pub audit_entry: RoleChangeAuditEntry,
}

/// Entry point for the assessment workflow.
pub struct AssessmentService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    max_concurrency: usize,
}

impl<S> Clone for AssessmentService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            max_concurrency: self.max_concurrency,
        }
    }
}

impl<S> AssessmentService<S>
where
    S: AssessmentStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, max_concurrency: DEFAULT_MAX_CONCURRENCY }
    }

    /// Caps how many managers are evaluated at once during a batch run.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn current_period(&self) -> Period {
        Period::current(self.clock.as_ref())
    }

    /// Evaluates every tier-holding manager for `period`.
    ///
    /// Failures for a single manager are reported in the result list; only a
    /// failure to load the population or the tier table fails the whole run.
    pub async fn run_assessment(
        &self,
        period: &Period,
        executed_by: &str,
    ) -> Result<BatchResult, EngineError> {
        require_actor("executed_by", executed_by)?;
        let executed_at = self.clock.now();

        info!(
            event_name = "assessment.batch.started",
            period = %period,
            executed_by,
            max_concurrency = self.max_concurrency,
            "assessment batch started"
        );

        let tiers = Arc::new(TierTable::new(self.store.list_tiers().await?));
        let managers: BTreeMap<ManagerId, Manager> = self
            .store
            .list_assessable_managers()
            .await?
            .into_iter()
            .map(|manager| (manager.id.clone(), manager))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::new();
        let mut results = Vec::with_capacity(managers.len());

        for manager in managers.into_values() {
            if let Some(exempt_until) =
                manager.assessment_exempt_until.filter(|_| manager.is_exempt_at(executed_at))
            {
                results.push(ManagerAssessmentResult {
                    manager_id: manager.id,
                    display_name: manager.display_name,
                    outcome: ManagerOutcome::Exempt { exempt_until },
                });
                continue;
            }

            let key = (manager.id.clone(), manager.display_name.clone());
            let store = Arc::clone(&self.store);
            let tiers = Arc::clone(&tiers);
            let semaphore = Arc::clone(&semaphore);
            let period = period.clone();
            let executed_by = executed_by.to_string();

            let handle = tasks.spawn(async move {
                let assessed = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        assess_manager(
                            store.as_ref(),
                            &tiers,
                            &manager,
                            &period,
                            &executed_by,
                            executed_at,
                        )
                        .await
                    }
                    Err(_) => {
                        Err(EngineError::Validation("assessment worker pool closed".to_string()))
                    }
                };

                assessed.unwrap_or_else(|error| {
                    warn!(
                        event_name = "assessment.manager.failed",
                        manager_id = %manager.id.0,
                        period = %period,
                        error_class = error.error_class(),
                        error = %error,
                        "manager assessment failed"
                    );
                    ManagerOutcome::Failed {
                        error_class: error.error_class().to_string(),
                        error: error.to_string(),
                    }
                })
            });
            in_flight.insert(handle.id(), key);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (task_id, outcome) = match joined {
                Ok((task_id, outcome)) => (task_id, outcome),
                Err(error) => (
                    error.id(),
                    ManagerOutcome::Failed {
                        error_class: "worker".to_string(),
                        error: error.to_string(),
                    },
                ),
            };
            if let Some((manager_id, display_name)) = in_flight.remove(&task_id) {
                results.push(ManagerAssessmentResult { manager_id, display_name, outcome });
            }
        }

        let batch =
            BatchResult::from_results(period.clone(), executed_by.to_string(), executed_at, results);
        info!(
            event_name = "assessment.batch.completed",
            period = %period,
            executed_by,
            processed = batch.processed,
            demotion_candidates = batch.demotion_candidates,
            exempt = batch.exempt,
            skipped = batch.skipped,
            failed = batch.failed,
            "assessment batch completed"
        );
        Ok(batch)
    }

    /// Confirms a pending assessment, optionally moving the manager to the
    /// proposed tier in the same transaction.
    pub async fn confirm(
        &self,
        assessment_id: &AssessmentId,
        confirmed_by: &str,
        apply_tier_change: bool,
    ) -> Result<Assessment, EngineError> {
        require_actor("confirmed_by", confirmed_by)?;
        let assessment = self.find_assessment(assessment_id).await?;
        if assessment.status != AssessmentStatus::Pending {
            return Err(EngineError::invalid_state(
                &assessment_id.0,
                format!("expected pending, found {}", assessment.status.as_str()),
            ));
        }

        let confirmation = Confirmation {
            assessment_id: assessment_id.clone(),
            confirmed_by: confirmed_by.to_string(),
            confirmed_at: self.clock.now(),
            apply_tier_change,
        };

        match self.store.apply_confirmation(&confirmation).await? {
            TransitionOutcome::Applied => {}
            TransitionOutcome::StaleAssessment => {
                return Err(EngineError::invalid_state(
                    &assessment_id.0,
                    "assessment left the pending state before it could be confirmed",
                ));
            }
            TransitionOutcome::IneligibleManager => {
                return Err(ineligible_manager(assessment_id, &assessment.manager_id));
            }
        }

        info!(
            event_name = "assessment.confirmed",
            assessment_id = %assessment_id.0,
            manager_id = %assessment.manager_id.0,
            confirmed_by,
            apply_tier_change,
            "assessment confirmed"
        );
        self.find_assessment(assessment_id).await
    }

    /// Removes a flagged manager from the tier system.
    ///
    /// The assessment, the manager's role and tier, and the audit entry are
    /// written in one transaction.
    pub async fn demote(
        &self,
        assessment_id: &AssessmentId,
        demoted_by: &str,
    ) -> Result<DemotionOutcome, EngineError> {
        require_actor("demoted_by", demoted_by)?;
        let assessment = self.find_assessment(assessment_id).await?;
        if !assessment.is_demotion_candidate {
            return Err(EngineError::invalid_state(
                &assessment_id.0,
                "assessment is not a demotion candidate",
            ));
        }
        if assessment.status != AssessmentStatus::Pending {
            return Err(EngineError::invalid_state(
                &assessment_id.0,
                format!("expected pending, found {}", assessment.status.as_str()),
            ));
        }

        let manager = self
            .store
            .find_manager(&assessment.manager_id)
            .await?
            .ok_or_else(|| EngineError::not_found("manager", &assessment.manager_id.0))?;
        if !manager.role.holds_tier() {
            return Err(EngineError::invalid_state(
                &assessment_id.0,
                format!("manager `{}` is already outside the tier system", manager.id.0),
            ));
        }

        let period = Period::new(assessment.period_year, assessment.period_half)?;
        let demoted_at = self.clock.now();
        let audit_entry = RoleChangeAuditEntry {
            id: RoleChangeId(Uuid::new_v4().to_string()),
            manager_id: manager.id.clone(),
            assessment_id: Some(assessment_id.clone()),
            from_role: manager.role,
            to_role: Role::Agent,
            reason: format!(
                "{} assessment: total sales {} below demotion floor {}",
                period.label, assessment.total_sales, DEMOTION_FLOOR
            ),
            changed_by: demoted_by.to_string(),
            changed_at: demoted_at,
        };
        let demotion = Demotion {
            assessment_id: assessment_id.clone(),
            manager_id: manager.id.clone(),
            demoted_by: demoted_by.to_string(),
            demoted_at,
            audit_entry: audit_entry.clone(),
        };

        match self.store.apply_demotion(&demotion).await? {
            TransitionOutcome::Applied => {}
            TransitionOutcome::StaleAssessment => {
                return Err(EngineError::invalid_state(
                    &assessment_id.0,
                    "assessment left the pending state before it could be demoted",
                ));
            }
            TransitionOutcome::IneligibleManager => {
                return Err(ineligible_manager(assessment_id, &manager.id));
            }
        }

        info!(
            event_name = "assessment.demoted",
            assessment_id = %assessment_id.0,
            manager_id = %manager.id.0,
            demoted_by,
            "manager demoted out of the tier system"
        );

        let assessment = self.find_assessment(assessment_id).await?;
        let manager = self
            .store
            .find_manager(&manager.id)
            .await?
            .ok_or_else(|| EngineError::not_found("manager", &manager.id.0))?;
        Ok(DemotionOutcome { assessment, manager, audit_entry })
    }

    pub async fn find_assessment(
        &self,
        assessment_id: &AssessmentId,
    ) -> Result<Assessment, EngineError> {
        self.store
            .find_assessment(assessment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("assessment", &assessment_id.0))
    }

    pub async fn list_assessments(
        &self,
        period: &Period,
        status: Option<AssessmentStatus>,
    ) -> Result<Vec<Assessment>, EngineError> {
        Ok(self.store.list_assessments(period.year, period.half, status).await?)
    }

    pub async fn list_role_changes(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<RoleChangeAuditEntry>, EngineError> {
        Ok(self.store.list_role_changes(manager_id).await?)
    }
}

async fn assess_manager<S>(
    store: &S,
    tiers: &TierTable,
    manager: &Manager,
    period: &Period,
    executed_by: &str,
    assessed_at: DateTime<Utc>,
) -> Result<ManagerOutcome, EngineError>
where
    S: AssessmentStore + ?Sized,
{
    let current_tier_id = manager.current_tier_id.as_ref().ok_or_else(|| {
        EngineError::Validation(format!("manager `{}` has no current tier", manager.id.0))
    })?;
    let current = tiers
        .by_id(current_tier_id)
        .ok_or_else(|| EngineError::not_found("tier", &current_tier_id.0))?;

    let summary = aggregate(store, &manager.id, period).await?;
    let decision = decide(current.tier_number, current.maintain_threshold, summary.total_sales);
    let proposed = tiers.by_number(decision.proposed_tier_number).ok_or_else(|| {
        EngineError::not_found("tier", format!("number {}", decision.proposed_tier_number))
    })?;

    let draft = AssessmentDraft {
        manager_id: manager.id.clone(),
        period_year: period.year,
        period_half: period.half,
        total_sales: summary.total_sales,
        total_insured_count: summary.total_insured_count,
        previous_tier_id: Some(current.id.clone()),
        proposed_tier_id: Some(proposed.id.clone()),
        is_demotion_candidate: decision.is_demotion_candidate,
        outcome: decision.outcome,
        assessed_by: executed_by.to_string(),
        assessed_at,
    };

    let (assessment, created) = match store.upsert_pending_assessment(draft).await? {
        UpsertOutcome::Created(assessment) => (assessment, true),
        UpsertOutcome::Updated(assessment) => (assessment, false),
        UpsertOutcome::Locked(assessment) => {
            return Ok(ManagerOutcome::Skipped {
                assessment_id: assessment.id,
                status: assessment.status,
            });
        }
    };

    Ok(ManagerOutcome::Assessed {
        assessment_id: assessment.id,
        created,
        total_sales: assessment.total_sales,
        total_insured_count: assessment.total_insured_count,
        current_tier_number: current.tier_number,
        proposed_tier_number: proposed.tier_number,
        outcome: decision.outcome,
        is_demotion_candidate: decision.is_demotion_candidate,
    })
}

fn ineligible_manager(assessment_id: &AssessmentId, manager_id: &ManagerId) -> EngineError {
    EngineError::invalid_state(
        &assessment_id.0,
        format!("manager `{}` no longer holds a tier-bearing role", manager_id.0),
    )
}

fn require_actor(field: &str, actor: &str) -> Result<(), EngineError> {
    if actor.trim().is_empty() {
        return Err(EngineError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::AssessmentService;
    use crate::assessment::{
        AssessmentStore, Confirmation, InMemoryAssessmentStore, ManagerOutcome, TransitionOutcome,
    };
    use crate::clock::FixedClock;
    use crate::decision::DecisionOutcome;
    use crate::domain::assessment::AssessmentStatus;
    use crate::domain::manager::{Manager, ManagerId, Role};
    use crate::domain::sales::MonthlySalesRecord;
    use crate::domain::tier::{Tier, TierId};
    use crate::errors::EngineError;
    use crate::period::Period;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 10, 9, 0, 0).single().expect("valid timestamp")
    }

    fn tiers() -> Vec<Tier> {
        [(1, 1_200_000), (2, 1_500_000), (3, 2_400_000)]
            .into_iter()
            .map(|(number, threshold)| Tier {
                id: TierId(format!("range-{number}")),
                tier_number: number,
                name: format!("Range {number}"),
                maintain_threshold: Decimal::from(threshold),
            })
            .collect()
    }

    fn manager(id: &str, tier_number: u32) -> Manager {
        Manager {
            id: ManagerId(id.to_string()),
            display_name: format!("Manager {id}"),
            role: Role::Manager,
            current_tier_id: Some(TierId(format!("range-{tier_number}"))),
            promoted_at: Some(now() - Duration::days(400)),
            demoted_at: None,
            assessment_exempt_until: None,
        }
    }

    /// Spreads `total` evenly over the six months of 2026H1.
    fn half_year_sales(id: &str, total: i64) -> Vec<MonthlySalesRecord> {
        sales_in(id, &period(), total)
    }

    fn sales_in(id: &str, period: &Period, total: i64) -> Vec<MonthlySalesRecord> {
        let monthly = total / 6;
        let months = period.months();
        let last = months.len() - 1;
        months
            .into_iter()
            .enumerate()
            .map(|(index, month)| MonthlySalesRecord {
                manager_id: ManagerId(id.to_string()),
                month,
                sales_amount: Decimal::from(if index == last {
                    total - monthly * 5
                } else {
                    monthly
                }),
                insured_count: 2,
            })
            .collect()
    }

    async fn service_with(
        managers: Vec<(Manager, i64)>,
    ) -> AssessmentService<InMemoryAssessmentStore> {
        let store = InMemoryAssessmentStore::default();
        store.insert_tiers(tiers()).await;
        for (manager, total) in managers {
            store.insert_sales(half_year_sales(&manager.id.0, total)).await;
            store.insert_manager(manager).await;
        }
        AssessmentService::new(Arc::new(store), Arc::new(FixedClock(now())))
    }

    fn period() -> Period {
        Period::new(2026, 1).expect("period")
    }

    #[tokio::test]
    async fn low_sales_manager_is_flagged_then_demoted_with_one_audit_entry() {
        let service = service_with(vec![(manager("M-1", 2), 1_000_000)]).await;

        let batch = service.run_assessment(&period(), "cron").await.expect("batch");
        assert_eq!(batch.processed, 1);
        assert_eq!(batch.demotion_candidates, 1);

        let assessments = service.list_assessments(&period(), None).await.expect("list");
        assert_eq!(assessments.len(), 1);
        let assessment = &assessments[0];
        assert!(assessment.is_demotion_candidate);
        assert_eq!(assessment.status, AssessmentStatus::Pending);
        assert_eq!(assessment.total_sales, Decimal::from(1_000_000));
        assert_eq!(assessment.total_insured_count, 12);
        assert_eq!(assessment.outcome, DecisionOutcome::DemotionCandidate);

        let outcome = service.demote(&assessment.id, "admin@example.com").await.expect("demote");
        assert_eq!(outcome.assessment.status, AssessmentStatus::Demoted);
        assert_eq!(outcome.manager.role, Role::Agent);
        assert_eq!(outcome.manager.current_tier_id, None);
        assert_eq!(outcome.manager.demoted_at, Some(now()));

        let audit = service.list_role_changes(&ManagerId("M-1".to_string())).await.expect("audit");
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].from_role, Role::Manager);
        assert_eq!(audit[0].to_role, Role::Agent);
        assert_eq!(audit[0].changed_by, "admin@example.com");
        assert!(audit[0].reason.contains("2026年上期"));
    }

    #[tokio::test]
    async fn rerunning_a_period_produces_identical_rows() {
        let service = service_with(vec![
            (manager("M-1", 1), 1_600_000),
            (manager("M-2", 2), 2_500_000),
            (manager("M-3", 3), 2_900_000),
        ])
        .await;

        service.run_assessment(&period(), "cron").await.expect("first run");
        let first = service.store().assessments().await;
        let second_batch = service.run_assessment(&period(), "cron").await.expect("second run");
        let second = service.store().assessments().await;

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(second_batch.results.iter().all(|result| matches!(
            result.outcome,
            ManagerOutcome::Assessed { created: false, .. }
        )));
    }

    #[tokio::test]
    async fn rerun_leaves_confirmed_rows_untouched_and_recomputes_pending_ones() {
        let service =
            service_with(vec![(manager("M-1", 1), 1_600_000), (manager("M-2", 1), 1_300_000)])
                .await;
        service.run_assessment(&period(), "cron").await.expect("first run");

        let confirmed_id = service
            .list_assessments(&period(), None)
            .await
            .expect("list")
            .into_iter()
            .find(|assessment| assessment.manager_id.0 == "M-1")
            .expect("M-1 assessment")
            .id;
        let confirmed = service.confirm(&confirmed_id, "admin", true).await.expect("confirm");

        service.store().insert_sales(half_year_sales("M-1", 5_000_000)).await;
        service.store().insert_sales(half_year_sales("M-2", 1_000_000)).await;
        let batch = service.run_assessment(&period(), "cron-retry").await.expect("second run");

        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.processed, 1);
        let after = service.find_assessment(&confirmed_id).await.expect("find");
        assert_eq!(after, confirmed);

        let recomputed = service
            .list_assessments(&period(), Some(AssessmentStatus::Pending))
            .await
            .expect("pending");
        assert_eq!(recomputed.len(), 1);
        assert_eq!(recomputed[0].total_sales, Decimal::from(2_300_000));
        assert_eq!(recomputed[0].assessed_by, "cron-retry");
        assert_eq!(recomputed[0].outcome, DecisionOutcome::Promoted);
    }

    #[tokio::test]
    async fn confirm_applies_proposed_tier_once() {
        let service = service_with(vec![(manager("M-1", 1), 1_500_001)]).await;
        service.run_assessment(&period(), "cron").await.expect("batch");
        let id = service.list_assessments(&period(), None).await.expect("list")[0].id.clone();

        let confirmed = service.confirm(&id, "admin", true).await.expect("confirm");
        assert_eq!(confirmed.status, AssessmentStatus::Confirmed);
        assert_eq!(confirmed.confirmed_by.as_deref(), Some("admin"));
        assert_eq!(confirmed.confirmed_at, Some(now()));

        let manager = service
            .store()
            .find_manager(&ManagerId("M-1".to_string()))
            .await
            .expect("find")
            .expect("manager");
        assert_eq!(manager.current_tier_id, Some(TierId("range-2".to_string())));

        let error = service.confirm(&id, "someone-else", true).await.expect_err("second confirm");
        assert!(matches!(error, EngineError::InvalidState { .. }));
        let unchanged = service.find_assessment(&id).await.expect("find");
        assert_eq!(unchanged, confirmed);
    }

    #[tokio::test]
    async fn confirm_without_tier_change_keeps_current_tier() {
        let service = service_with(vec![(manager("M-1", 1), 2_400_000)]).await;
        service.run_assessment(&period(), "cron").await.expect("batch");
        let id = service.list_assessments(&period(), None).await.expect("list")[0].id.clone();

        service.confirm(&id, "admin", false).await.expect("confirm");

        let manager = service
            .store()
            .find_manager(&ManagerId("M-1".to_string()))
            .await
            .expect("find")
            .expect("manager");
        assert_eq!(manager.current_tier_id, Some(TierId("range-1".to_string())));
    }

    #[tokio::test]
    async fn confirmation_uses_the_tier_recomputed_by_a_later_rerun() {
        let service = service_with(vec![(manager("M-1", 1), 1_300_000)]).await;
        service.run_assessment(&period(), "cron").await.expect("first run");
        let read = service.list_assessments(&period(), None).await.expect("list").remove(0);
        assert_eq!(read.proposed_tier_id, Some(TierId("range-1".to_string())));
        let confirmation = Confirmation {
            assessment_id: read.id.clone(),
            confirmed_by: "admin".to_string(),
            confirmed_at: now(),
            apply_tier_change: true,
        };

        service.store().insert_sales(half_year_sales("M-1", 300_000)).await;
        service.run_assessment(&period(), "cron-retry").await.expect("second run");

        let applied = service.store().apply_confirmation(&confirmation).await.expect("confirm");
        assert_eq!(applied, TransitionOutcome::Applied);
        let stored = service.find_assessment(&read.id).await.expect("find");
        assert_eq!(stored.status, AssessmentStatus::Confirmed);
        assert_eq!(stored.proposed_tier_id, Some(TierId("range-2".to_string())));
        let manager = service
            .store()
            .find_manager(&ManagerId("M-1".to_string()))
            .await
            .expect("find")
            .expect("manager");
        assert_eq!(manager.current_tier_id, stored.proposed_tier_id);
    }

    #[tokio::test]
    async fn confirming_an_older_period_after_demotion_is_rejected() {
        let earlier = Period::new(2025, 2).expect("period");
        let service = service_with(vec![(manager("M-1", 1), 500_000)]).await;
        service.store().insert_sales(sales_in("M-1", &earlier, 1_600_000)).await;

        service.run_assessment(&earlier, "cron").await.expect("earlier run");
        service.run_assessment(&period(), "cron").await.expect("current run");
        let promotion = service.list_assessments(&earlier, None).await.expect("list").remove(0);
        let flagged = service.list_assessments(&period(), None).await.expect("list").remove(0);
        assert!(flagged.is_demotion_candidate);

        service.demote(&flagged.id, "admin").await.expect("demote");
        let error = service.confirm(&promotion.id, "admin", true).await.expect_err("confirm");
        assert!(matches!(error, EngineError::InvalidState { .. }));

        let manager = service
            .store()
            .find_manager(&ManagerId("M-1".to_string()))
            .await
            .expect("find")
            .expect("manager");
        assert_eq!(manager.role, Role::Agent);
        assert_eq!(manager.current_tier_id, None);
        let untouched = service.find_assessment(&promotion.id).await.expect("find");
        assert_eq!(untouched.status, AssessmentStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_assessment_is_not_found() {
        let service = service_with(Vec::new()).await;
        let missing = crate::domain::assessment::AssessmentId("nope".to_string());

        let confirm = service.confirm(&missing, "admin", true).await.expect_err("confirm");
        let demote = service.demote(&missing, "admin").await.expect_err("demote");

        assert!(matches!(confirm, EngineError::NotFound { entity: "assessment", .. }));
        assert!(matches!(demote, EngineError::NotFound { entity: "assessment", .. }));
    }

    #[tokio::test]
    async fn demote_rejects_non_candidates_including_step_downs() {
        let service = service_with(vec![(manager("M-1", 3), 2_999_999)]).await;
        service.run_assessment(&period(), "cron").await.expect("batch");
        let assessment = service.list_assessments(&period(), None).await.expect("list").remove(0);
        assert_eq!(assessment.outcome, DecisionOutcome::SteppedDown);

        let error = service.demote(&assessment.id, "admin").await.expect_err("demote");
        assert!(matches!(error, EngineError::InvalidState { .. }));

        let manager = service
            .store()
            .find_manager(&ManagerId("M-1".to_string()))
            .await
            .expect("find")
            .expect("manager");
        assert_eq!(manager.role, Role::Manager);
        assert!(service
            .list_role_changes(&manager.id)
            .await
            .expect("audit")
            .is_empty());
    }

    #[tokio::test]
    async fn demoting_twice_is_rejected() {
        let service = service_with(vec![(manager("M-1", 1), 500_000)]).await;
        service.run_assessment(&period(), "cron").await.expect("batch");
        let id = service.list_assessments(&period(), None).await.expect("list")[0].id.clone();

        service.demote(&id, "admin").await.expect("first demotion");
        let error = service.demote(&id, "admin").await.expect_err("second demotion");

        assert!(matches!(error, EngineError::InvalidState { .. }));
        let audit =
            service.list_role_changes(&ManagerId("M-1".to_string())).await.expect("audit");
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn exempt_manager_is_counted_and_gets_no_row() {
        let mut exempt = manager("M-2", 2);
        exempt.assessment_exempt_until = Some(now() + Duration::days(30));
        let mut expired = manager("M-3", 2);
        expired.assessment_exempt_until = Some(now() - Duration::days(1));
        let service = service_with(vec![
            (manager("M-1", 2), 1_600_000),
            (exempt, 0),
            (expired, 1_600_000),
        ])
        .await;

        let batch = service.run_assessment(&period(), "cron").await.expect("batch");

        assert_eq!(batch.exempt, 1);
        assert_eq!(batch.processed, 2);
        assert!(matches!(
            batch.result_for(&ManagerId("M-2".to_string())),
            Some(ManagerOutcome::Exempt { .. })
        ));
        let rows = service.store().assessments().await;
        assert!(rows.iter().all(|assessment| assessment.manager_id.0 != "M-2"));
    }

    #[tokio::test]
    async fn one_failing_manager_does_not_abort_the_batch() {
        let mut tierless = manager("M-3", 1);
        tierless.current_tier_id = Some(TierId("range-9".to_string()));
        let service = service_with(vec![
            (manager("M-1", 1), 1_600_000),
            (manager("M-2", 1), 1_600_000),
            (tierless, 1_600_000),
        ])
        .await;
        service.store().fail_sales_reads_for(ManagerId("M-2".to_string())).await;

        let batch = service.run_assessment(&period(), "cron").await.expect("batch");

        assert_eq!(batch.processed, 1);
        assert_eq!(batch.failed, 2);
        assert!(matches!(
            batch.result_for(&ManagerId("M-2".to_string())),
            Some(ManagerOutcome::Failed { error_class, .. }) if error_class == "storage"
        ));
        assert!(matches!(
            batch.result_for(&ManagerId("M-3".to_string())),
            Some(ManagerOutcome::Failed { error_class, .. }) if error_class == "not_found"
        ));
        assert_eq!(service.store().assessments().await.len(), 1);
    }

    #[tokio::test]
    async fn agents_are_not_assessed_and_results_are_sorted() {
        let mut agent = manager("M-0", 1);
        agent.role = Role::Agent;
        agent.current_tier_id = None;
        let service = service_with(vec![
            (manager("M-9", 1), 1_300_000),
            (agent, 0),
            (manager("M-4", 1), 1_300_000),
        ])
        .await
        .with_max_concurrency(1);

        let batch = service.run_assessment(&period(), "cron").await.expect("batch");

        let ids: Vec<&str> =
            batch.results.iter().map(|result| result.manager_id.0.as_str()).collect();
        assert_eq!(ids, vec!["M-4", "M-9"]);
    }

    #[tokio::test]
    async fn blank_actor_is_a_validation_error() {
        let service = service_with(Vec::new()).await;
        let error = service.run_assessment(&period(), "  ").await.expect_err("blank actor");
        assert!(matches!(error, EngineError::Validation(_)));
    }
}
