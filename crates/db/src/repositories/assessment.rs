use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use tierwatch_core::assessment::{
    AssessmentStore, Confirmation, Demotion, TransitionOutcome, UpsertOutcome,
};
use tierwatch_core::decision::DecisionOutcome;
use tierwatch_core::domain::assessment::{
    Assessment, AssessmentDraft, AssessmentId, AssessmentStatus,
};
use tierwatch_core::domain::manager::{Manager, ManagerId, Role};
use tierwatch_core::domain::role_change::{RoleChangeAuditEntry, RoleChangeId};
use tierwatch_core::domain::sales::MonthlySalesRecord;
use tierwatch_core::domain::tier::{Tier, TierId};
use tierwatch_core::errors::StoreError;

use super::{parse_decimal, parse_optional_timestamp, parse_timestamp, parse_u32, RepositoryError};
use crate::DbPool;

const ASSESSMENT_COLUMNS: &str = "id, manager_id, period_year, period_half, total_sales,
    total_insured_count, previous_tier_id, proposed_tier_id, is_demotion_candidate, outcome,
    status, assessed_by, assessed_at, confirmed_by, confirmed_at";

const MANAGER_COLUMNS: &str = "id, display_name, role, current_tier_id, promoted_at, demoted_at,
    assessment_exempt_until";

/// [`AssessmentStore`] over SQLite. The batch upsert is one conditional
/// statement and confirm/demote each run in a single transaction guarded by a
/// status compare-and-swap.
#[derive(Clone)]
pub struct SqlAssessmentStore {
    pool: DbPool,
}

impl SqlAssessmentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_tiers(&self) -> Result<Vec<Tier>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tier_number, name, maintain_threshold FROM tier ORDER BY tier_number",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(tier_from_row).collect()
    }

    async fn fetch_assessable_managers(&self) -> Result<Vec<Manager>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {MANAGER_COLUMNS} FROM manager WHERE role = ? ORDER BY id"
        ))
        .bind(Role::Manager.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(manager_from_row).collect()
    }

    async fn fetch_manager(&self, id: &ManagerId) -> Result<Option<Manager>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {MANAGER_COLUMNS} FROM manager WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(manager_from_row).transpose()
    }

    async fn fetch_monthly_sales(
        &self,
        manager_id: &ManagerId,
        first_month: &str,
        last_month: &str,
    ) -> Result<Vec<MonthlySalesRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT manager_id, month, sales_amount, insured_count
             FROM monthly_sales
             WHERE manager_id = ? AND month >= ? AND month <= ?
             ORDER BY month",
        )
        .bind(&manager_id.0)
        .bind(first_month)
        .bind(last_month)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(sales_from_row).collect()
    }

    async fn upsert_pending(&self, draft: AssessmentDraft) -> Result<UpsertOutcome, RepositoryError> {
        let candidate_id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        let written = sqlx::query(
            "INSERT INTO assessment (id, manager_id, period_year, period_half, total_sales,
                                     total_insured_count, previous_tier_id, proposed_tier_id,
                                     is_demotion_candidate, outcome, status, assessed_by,
                                     assessed_at, confirmed_by, confirmed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL)
             ON CONFLICT(manager_id, period_year, period_half) DO UPDATE SET
                 total_sales = excluded.total_sales,
                 total_insured_count = excluded.total_insured_count,
                 previous_tier_id = excluded.previous_tier_id,
                 proposed_tier_id = excluded.proposed_tier_id,
                 is_demotion_candidate = excluded.is_demotion_candidate,
                 outcome = excluded.outcome,
                 assessed_by = excluded.assessed_by,
                 assessed_at = excluded.assessed_at
             WHERE assessment.status = 'pending'",
        )
        .bind(&candidate_id)
        .bind(&draft.manager_id.0)
        .bind(draft.period_year)
        .bind(i64::from(draft.period_half))
        .bind(draft.total_sales.to_string())
        .bind(i64::from(draft.total_insured_count))
        .bind(draft.previous_tier_id.as_ref().map(|id| id.0.as_str()))
        .bind(draft.proposed_tier_id.as_ref().map(|id| id.0.as_str()))
        .bind(draft.is_demotion_candidate)
        .bind(draft.outcome.as_str())
        .bind(AssessmentStatus::Pending.as_str())
        .bind(&draft.assessed_by)
        .bind(draft.assessed_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM assessment
             WHERE manager_id = ? AND period_year = ? AND period_half = ?"
        ))
        .bind(&draft.manager_id.0)
        .bind(draft.period_year)
        .bind(i64::from(draft.period_half))
        .fetch_one(&mut *tx)
        .await?;
        let stored = assessment_from_row(row)?;

        tx.commit().await?;

        Ok(if written.rows_affected() == 0 {
            tracing::debug!(
                event_name = "assessment.upsert.locked",
                assessment_id = %stored.id.0,
                status = stored.status.as_str(),
                "assessment already finalized; leaving row untouched"
            );
            UpsertOutcome::Locked(stored)
        } else if stored.id.0 == candidate_id {
            UpsertOutcome::Created(stored)
        } else {
            UpsertOutcome::Updated(stored)
        })
    }

    async fn fetch_assessment(
        &self,
        id: &AssessmentId,
    ) -> Result<Option<Assessment>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ASSESSMENT_COLUMNS} FROM assessment WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(assessment_from_row).transpose()
    }

    async fn fetch_assessments(
        &self,
        period_year: i32,
        period_half: u8,
        status: Option<AssessmentStatus>,
    ) -> Result<Vec<Assessment>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {ASSESSMENT_COLUMNS} FROM assessment
                     WHERE period_year = ? AND period_half = ? AND status = ?
                     ORDER BY manager_id"
                ))
                .bind(period_year)
                .bind(i64::from(period_half))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ASSESSMENT_COLUMNS} FROM assessment
                     WHERE period_year = ? AND period_half = ?
                     ORDER BY manager_id"
                ))
                .bind(period_year)
                .bind(i64::from(period_half))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(assessment_from_row).collect()
    }

    async fn confirm_in_tx(
        &self,
        confirmation: &Confirmation,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let confirmed_at = confirmation.confirmed_at.to_rfc3339();

        let updated = sqlx::query(
            "UPDATE assessment
             SET status = ?, confirmed_by = ?, confirmed_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(AssessmentStatus::Confirmed.as_str())
        .bind(&confirmation.confirmed_by)
        .bind(&confirmed_at)
        .bind(&confirmation.assessment_id.0)
        .bind(AssessmentStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(TransitionOutcome::StaleAssessment);
        }

        if confirmation.apply_tier_change {
            // Tier as stored on the row this transaction holds, not the caller's copy.
            let row =
                sqlx::query("SELECT manager_id, proposed_tier_id FROM assessment WHERE id = ?")
                    .bind(&confirmation.assessment_id.0)
                    .fetch_one(&mut *tx)
                    .await?;
            let manager_id: String = row.try_get("manager_id")?;
            let proposed_tier_id: Option<String> = row.try_get("proposed_tier_id")?;

            if let Some(tier_id) = proposed_tier_id {
                let moved = sqlx::query(
                    "UPDATE manager SET current_tier_id = ?, updated_at = ?
                     WHERE id = ? AND role = ?",
                )
                .bind(&tier_id)
                .bind(&confirmed_at)
                .bind(&manager_id)
                .bind(Role::Manager.as_str())
                .execute(&mut *tx)
                .await?;

                if moved.rows_affected() == 0 {
                    tx.rollback().await?;
                    return Ok(TransitionOutcome::IneligibleManager);
                }
            }
        }

        tx.commit().await?;
        Ok(TransitionOutcome::Applied)
    }

    async fn demote_in_tx(
        &self,
        demotion: &Demotion,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let demoted_at = demotion.demoted_at.to_rfc3339();

        let updated = sqlx::query(
            "UPDATE assessment
             SET status = ?, confirmed_by = ?, confirmed_at = ?
             WHERE id = ? AND status = ? AND is_demotion_candidate = 1",
        )
        .bind(AssessmentStatus::Demoted.as_str())
        .bind(&demotion.demoted_by)
        .bind(&demoted_at)
        .bind(&demotion.assessment_id.0)
        .bind(AssessmentStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(TransitionOutcome::StaleAssessment);
        }

        let moved = sqlx::query(
            "UPDATE manager
             SET role = ?, current_tier_id = NULL, demoted_at = ?, updated_at = ?
             WHERE id = ? AND role = ?",
        )
        .bind(Role::Agent.as_str())
        .bind(&demoted_at)
        .bind(&demoted_at)
        .bind(&demotion.manager_id.0)
        .bind(Role::Manager.as_str())
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(TransitionOutcome::IneligibleManager);
        }

        let entry = &demotion.audit_entry;
        sqlx::query(
            "INSERT INTO role_change_audit (id, manager_id, assessment_id, from_role, to_role,
                                            reason, changed_by, changed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id.0)
        .bind(&entry.manager_id.0)
        .bind(entry.assessment_id.as_ref().map(|id| id.0.as_str()))
        .bind(entry.from_role.as_str())
        .bind(entry.to_role.as_str())
        .bind(&entry.reason)
        .bind(&entry.changed_by)
        .bind(entry.changed_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(TransitionOutcome::Applied)
    }

    async fn fetch_role_changes(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<RoleChangeAuditEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, manager_id, assessment_id, from_role, to_role, reason, changed_by,
                    changed_at
             FROM role_change_audit
             WHERE manager_id = ?
             ORDER BY changed_at, id",
        )
        .bind(&manager_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(role_change_from_row).collect()
    }
}

#[async_trait]
impl AssessmentStore for SqlAssessmentStore {
    async fn list_tiers(&self) -> Result<Vec<Tier>, StoreError> {
        Ok(self.fetch_tiers().await?)
    }

    async fn list_assessable_managers(&self) -> Result<Vec<Manager>, StoreError> {
        Ok(self.fetch_assessable_managers().await?)
    }

    async fn find_manager(&self, id: &ManagerId) -> Result<Option<Manager>, StoreError> {
        Ok(self.fetch_manager(id).await?)
    }

    async fn list_monthly_sales(
        &self,
        manager_id: &ManagerId,
        first_month: &str,
        last_month: &str,
    ) -> Result<Vec<MonthlySalesRecord>, StoreError> {
        Ok(self.fetch_monthly_sales(manager_id, first_month, last_month).await?)
    }

    async fn upsert_pending_assessment(
        &self,
        draft: AssessmentDraft,
    ) -> Result<UpsertOutcome, StoreError> {
        Ok(self.upsert_pending(draft).await?)
    }

    async fn find_assessment(&self, id: &AssessmentId) -> Result<Option<Assessment>, StoreError> {
        Ok(self.fetch_assessment(id).await?)
    }

    async fn list_assessments(
        &self,
        period_year: i32,
        period_half: u8,
        status: Option<AssessmentStatus>,
    ) -> Result<Vec<Assessment>, StoreError> {
        Ok(self.fetch_assessments(period_year, period_half, status).await?)
    }

    async fn apply_confirmation(
        &self,
        confirmation: &Confirmation,
    ) -> Result<TransitionOutcome, StoreError> {
        Ok(self.confirm_in_tx(confirmation).await?)
    }

    async fn apply_demotion(&self, demotion: &Demotion) -> Result<TransitionOutcome, StoreError> {
        Ok(self.demote_in_tx(demotion).await?)
    }

    async fn list_role_changes(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<RoleChangeAuditEntry>, StoreError> {
        Ok(self.fetch_role_changes(manager_id).await?)
    }
}

fn parse_role(column: &str, value: String) -> Result<Role, RepositoryError> {
    Role::parse(&value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown role in `{column}`: `{value}`")))
}

fn tier_from_row(row: SqliteRow) -> Result<Tier, RepositoryError> {
    Ok(Tier {
        id: TierId(row.try_get("id")?),
        tier_number: parse_u32("tier_number", row.try_get("tier_number")?)?,
        name: row.try_get("name")?,
        maintain_threshold: parse_decimal(
            "maintain_threshold",
            row.try_get("maintain_threshold")?,
        )?,
    })
}

pub(crate) fn manager_from_row(row: SqliteRow) -> Result<Manager, RepositoryError> {
    Ok(Manager {
        id: ManagerId(row.try_get("id")?),
        display_name: row.try_get("display_name")?,
        role: parse_role("role", row.try_get("role")?)?,
        current_tier_id: row.try_get::<Option<String>, _>("current_tier_id")?.map(TierId),
        promoted_at: parse_optional_timestamp("promoted_at", row.try_get("promoted_at")?)?,
        demoted_at: parse_optional_timestamp("demoted_at", row.try_get("demoted_at")?)?,
        assessment_exempt_until: parse_optional_timestamp(
            "assessment_exempt_until",
            row.try_get("assessment_exempt_until")?,
        )?,
    })
}

fn sales_from_row(row: SqliteRow) -> Result<MonthlySalesRecord, RepositoryError> {
    Ok(MonthlySalesRecord {
        manager_id: ManagerId(row.try_get("manager_id")?),
        month: row.try_get("month")?,
        sales_amount: parse_decimal("sales_amount", row.try_get("sales_amount")?)?,
        insured_count: parse_u32("insured_count", row.try_get("insured_count")?)?,
    })
}

fn assessment_from_row(row: SqliteRow) -> Result<Assessment, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = AssessmentStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown assessment status `{status_raw}`"))
    })?;
    let outcome_raw = row.try_get::<String, _>("outcome")?;
    let outcome = DecisionOutcome::parse(&outcome_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown assessment outcome `{outcome_raw}`"))
    })?;
    let period_half = row.try_get::<i64, _>("period_half")?;
    let period_half = u8::try_from(period_half).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `period_half`: {period_half}"))
    })?;

    Ok(Assessment {
        id: AssessmentId(row.try_get("id")?),
        manager_id: ManagerId(row.try_get("manager_id")?),
        period_year: row.try_get("period_year")?,
        period_half,
        total_sales: parse_decimal("total_sales", row.try_get("total_sales")?)?,
        total_insured_count: parse_u32(
            "total_insured_count",
            row.try_get("total_insured_count")?,
        )?,
        previous_tier_id: row.try_get::<Option<String>, _>("previous_tier_id")?.map(TierId),
        proposed_tier_id: row.try_get::<Option<String>, _>("proposed_tier_id")?.map(TierId),
        is_demotion_candidate: row.try_get("is_demotion_candidate")?,
        outcome,
        status,
        assessed_by: row.try_get("assessed_by")?,
        assessed_at: parse_timestamp("assessed_at", row.try_get("assessed_at")?)?,
        confirmed_by: row.try_get("confirmed_by")?,
        confirmed_at: parse_optional_timestamp("confirmed_at", row.try_get("confirmed_at")?)?,
    })
}

fn role_change_from_row(row: SqliteRow) -> Result<RoleChangeAuditEntry, RepositoryError> {
    Ok(RoleChangeAuditEntry {
        id: RoleChangeId(row.try_get("id")?),
        manager_id: ManagerId(row.try_get("manager_id")?),
        assessment_id: row.try_get::<Option<String>, _>("assessment_id")?.map(AssessmentId),
        from_role: parse_role("from_role", row.try_get("from_role")?)?,
        to_role: parse_role("to_role", row.try_get("to_role")?)?,
        reason: row.try_get("reason")?,
        changed_by: row.try_get("changed_by")?,
        changed_at: parse_timestamp("changed_at", row.try_get("changed_at")?)?,
    })
}
