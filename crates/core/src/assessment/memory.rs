use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AssessmentStore, Confirmation, Demotion, TransitionOutcome, UpsertOutcome};
use crate::domain::assessment::{Assessment, AssessmentDraft, AssessmentId, AssessmentStatus};
use crate::domain::manager::{Manager, ManagerId, Role};
use crate::domain::role_change::RoleChangeAuditEntry;
use crate::domain::sales::MonthlySalesRecord;
use crate::domain::tier::Tier;
use crate::errors::StoreError;

#[derive(Default)]
struct State {
    tiers: Vec<Tier>,
    managers: BTreeMap<ManagerId, Manager>,
    sales: Vec<MonthlySalesRecord>,
    assessments: BTreeMap<String, Assessment>,
    role_changes: Vec<RoleChangeAuditEntry>,
    unreadable_sales: BTreeSet<ManagerId>,
}

/// Store backed by process memory. Every operation takes one lock, so the
/// guarded upsert and the confirm/demote writes are atomic.
#[derive(Default)]
pub struct InMemoryAssessmentStore {
    state: RwLock<State>,
}

impl InMemoryAssessmentStore {
    pub async fn insert_tiers(&self, tiers: Vec<Tier>) {
        self.state.write().await.tiers.extend(tiers);
    }

    pub async fn insert_manager(&self, manager: Manager) {
        self.state.write().await.managers.insert(manager.id.clone(), manager);
    }

    pub async fn insert_sales(&self, records: Vec<MonthlySalesRecord>) {
        self.state.write().await.sales.extend(records);
    }

    /// Makes sales reads for `manager_id` fail, to exercise partial failures.
    pub async fn fail_sales_reads_for(&self, manager_id: ManagerId) {
        self.state.write().await.unreadable_sales.insert(manager_id);
    }

    pub async fn assessments(&self) -> Vec<Assessment> {
        self.state.read().await.assessments.values().cloned().collect()
    }
}

#[async_trait]
impl AssessmentStore for InMemoryAssessmentStore {
    async fn list_tiers(&self) -> Result<Vec<Tier>, StoreError> {
        Ok(self.state.read().await.tiers.clone())
    }

    async fn list_assessable_managers(&self) -> Result<Vec<Manager>, StoreError> {
        let state = self.state.read().await;
        Ok(state.managers.values().filter(|manager| manager.role.holds_tier()).cloned().collect())
    }

    async fn find_manager(&self, id: &ManagerId) -> Result<Option<Manager>, StoreError> {
        Ok(self.state.read().await.managers.get(id).cloned())
    }

    async fn list_monthly_sales(
        &self,
        manager_id: &ManagerId,
        first_month: &str,
        last_month: &str,
    ) -> Result<Vec<MonthlySalesRecord>, StoreError> {
        let state = self.state.read().await;
        if state.unreadable_sales.contains(manager_id) {
            return Err(StoreError::Database(format!(
                "sales records for `{}` are unavailable",
                manager_id.0
            )));
        }

        let mut records: Vec<MonthlySalesRecord> = state
            .sales
            .iter()
            .filter(|record| {
                &record.manager_id == manager_id
                    && record.month.as_str() >= first_month
                    && record.month.as_str() <= last_month
            })
            .cloned()
            .collect();
        records.sort_by(|left, right| left.month.cmp(&right.month));
        Ok(records)
    }

    async fn upsert_pending_assessment(
        &self,
        draft: AssessmentDraft,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state.write().await;
        let existing = state
            .assessments
            .values()
            .find(|assessment| {
                assessment.manager_id == draft.manager_id
                    && assessment.period_year == draft.period_year
                    && assessment.period_half == draft.period_half
            })
            .cloned();

        match existing {
            Some(current) if current.status.is_terminal() => Ok(UpsertOutcome::Locked(current)),
            Some(current) => {
                let updated = draft.into_pending(current.id.clone());
                state.assessments.insert(updated.id.0.clone(), updated.clone());
                Ok(UpsertOutcome::Updated(updated))
            }
            None => {
                let created = draft.into_pending(AssessmentId(Uuid::new_v4().to_string()));
                state.assessments.insert(created.id.0.clone(), created.clone());
                Ok(UpsertOutcome::Created(created))
            }
        }
    }

    async fn find_assessment(&self, id: &AssessmentId) -> Result<Option<Assessment>, StoreError> {
        Ok(self.state.read().await.assessments.get(&id.0).cloned())
    }

    async fn list_assessments(
        &self,
        period_year: i32,
        period_half: u8,
        status: Option<AssessmentStatus>,
    ) -> Result<Vec<Assessment>, StoreError> {
        let state = self.state.read().await;
        let mut assessments: Vec<Assessment> = state
            .assessments
            .values()
            .filter(|assessment| {
                assessment.period_year == period_year
                    && assessment.period_half == period_half
                    && status.map_or(true, |status| assessment.status == status)
            })
            .cloned()
            .collect();
        assessments.sort_by(|left, right| left.manager_id.cmp(&right.manager_id));
        Ok(assessments)
    }

    async fn apply_confirmation(
        &self,
        confirmation: &Confirmation,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut state = self.state.write().await;

        let Some(assessment) = state
            .assessments
            .get(&confirmation.assessment_id.0)
            .filter(|assessment| assessment.status == AssessmentStatus::Pending)
            .cloned()
        else {
            return Ok(TransitionOutcome::StaleAssessment);
        };

        let tier_change =
            assessment.proposed_tier_id.filter(|_| confirmation.apply_tier_change);
        if tier_change.is_some() && !holds_tier(&state, &assessment.manager_id) {
            return Ok(TransitionOutcome::IneligibleManager);
        }

        if let Some(stored) = state.assessments.get_mut(&confirmation.assessment_id.0) {
            stored.status = AssessmentStatus::Confirmed;
            stored.confirmed_by = Some(confirmation.confirmed_by.clone());
            stored.confirmed_at = Some(confirmation.confirmed_at);
        }
        if let Some(tier_id) = tier_change {
            if let Some(manager) = state.managers.get_mut(&assessment.manager_id) {
                manager.current_tier_id = Some(tier_id);
            }
        }
        Ok(TransitionOutcome::Applied)
    }

    async fn apply_demotion(&self, demotion: &Demotion) -> Result<TransitionOutcome, StoreError> {
        let mut state = self.state.write().await;

        let eligible =
            state.assessments.get(&demotion.assessment_id.0).is_some_and(|assessment| {
                assessment.status == AssessmentStatus::Pending && assessment.is_demotion_candidate
            });
        if !eligible {
            return Ok(TransitionOutcome::StaleAssessment);
        }
        if !holds_tier(&state, &demotion.manager_id) {
            return Ok(TransitionOutcome::IneligibleManager);
        }

        if let Some(assessment) = state.assessments.get_mut(&demotion.assessment_id.0) {
            assessment.status = AssessmentStatus::Demoted;
            assessment.confirmed_by = Some(demotion.demoted_by.clone());
            assessment.confirmed_at = Some(demotion.demoted_at);
        }
        if let Some(manager) = state.managers.get_mut(&demotion.manager_id) {
            manager.role = Role::Agent;
            manager.current_tier_id = None;
            manager.demoted_at = Some(demotion.demoted_at);
        }
        state.role_changes.push(demotion.audit_entry.clone());
        Ok(TransitionOutcome::Applied)
    }

    async fn list_role_changes(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<RoleChangeAuditEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .role_changes
            .iter()
            .filter(|entry| &entry.manager_id == manager_id)
            .cloned()
            .collect())
    }
}

fn holds_tier(state: &State, manager_id: &ManagerId) -> bool {
    state.managers.get(manager_id).is_some_and(|manager| manager.role.holds_tier())
}
