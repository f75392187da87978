//! Assessment workflow: batch evaluation of a period and the confirm/demote
//! executors, written against the [`AssessmentStore`] port.

mod batch;
mod memory;
mod service;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::assessment::{Assessment, AssessmentDraft, AssessmentId, AssessmentStatus};
use crate::domain::manager::{Manager, ManagerId};
use crate::domain::role_change::RoleChangeAuditEntry;
use crate::domain::sales::MonthlySalesRecord;
use crate::domain::tier::Tier;
use crate::errors::StoreError;

pub use batch::{BatchResult, ManagerAssessmentResult, ManagerOutcome};
pub use memory::InMemoryAssessmentStore;
pub use service::{AssessmentService, DemotionOutcome, DEFAULT_MAX_CONCURRENCY};

/// What the status-guarded upsert did with a draft.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(Assessment),
    /// An existing pending row was overwritten with the new figures.
    Updated(Assessment),
    /// The row is confirmed or demoted and was left untouched.
    Locked(Assessment),
}

/// Result of a guarded confirm or demote write. Anything but `Applied` means
/// nothing was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// The assessment is no longer in the state the write requires.
    StaleAssessment,
    /// The manager is missing or no longer holds a tier-bearing role.
    IneligibleManager,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub assessment_id: AssessmentId,
    pub confirmed_by: String,
    pub confirmed_at: DateTime<Utc>,
    /// Moves the manager to the tier proposed on the row as it stands when the
    /// confirmation is written.
    pub apply_tier_change: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Demotion {
    pub assessment_id: AssessmentId,
    pub manager_id: ManagerId,
    pub demoted_by: String,
    pub demoted_at: DateTime<Utc>,
    pub audit_entry: RoleChangeAuditEntry,
}

#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn list_tiers(&self) -> Result<Vec<Tier>, StoreError>;

    /// Managers currently holding a tier-bearing role.
    async fn list_assessable_managers(&self) -> Result<Vec<Manager>, StoreError>;

    async fn find_manager(&self, id: &ManagerId) -> Result<Option<Manager>, StoreError>;

    /// Monthly records with `first_month <= month <= last_month`, ascending.
    async fn list_monthly_sales(
        &self,
        manager_id: &ManagerId,
        first_month: &str,
        last_month: &str,
    ) -> Result<Vec<MonthlySalesRecord>, StoreError>;

    /// Atomically inserts a pending row, overwrites a pending row, or leaves a
    /// confirmed/demoted row alone.
    async fn upsert_pending_assessment(
        &self,
        draft: AssessmentDraft,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn find_assessment(&self, id: &AssessmentId) -> Result<Option<Assessment>, StoreError>;

    async fn list_assessments(
        &self,
        period_year: i32,
        period_half: u8,
        status: Option<AssessmentStatus>,
    ) -> Result<Vec<Assessment>, StoreError>;

    /// Applies a confirmation in one transaction. A tier change takes the
    /// proposed tier from the row being confirmed and requires the manager to
    /// still hold a tier-bearing role.
    async fn apply_confirmation(
        &self,
        confirmation: &Confirmation,
    ) -> Result<TransitionOutcome, StoreError>;

    /// Applies a demotion in one transaction. Requires a pending demotion
    /// candidate and a manager still holding a tier-bearing role.
    async fn apply_demotion(&self, demotion: &Demotion) -> Result<TransitionOutcome, StoreError>;

    async fn list_role_changes(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<RoleChangeAuditEntry>, StoreError>;
}
