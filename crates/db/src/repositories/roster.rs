use chrono::Utc;

use tierwatch_core::domain::manager::Manager;
use tierwatch_core::domain::sales::MonthlySalesRecord;
use tierwatch_core::domain::tier::Tier;

use super::assessment::manager_from_row;
use super::RepositoryError;
use crate::DbPool;

/// Administrative writes for the reference data the batch reads: tiers,
/// managers and monthly sales. Used by seeding and tests.
pub struct SqlRosterRepository {
    pool: DbPool,
}

impl SqlRosterRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save_tier(&self, tier: &Tier) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO tier (id, tier_number, name, maintain_threshold)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 tier_number = excluded.tier_number,
                 name = excluded.name,
                 maintain_threshold = excluded.maintain_threshold",
        )
        .bind(&tier.id.0)
        .bind(i64::from(tier.tier_number))
        .bind(&tier.name)
        .bind(tier.maintain_threshold.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn save_manager(&self, manager: &Manager) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO manager (id, display_name, role, current_tier_id, promoted_at, demoted_at,
                                  assessment_exempt_until, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 role = excluded.role,
                 current_tier_id = excluded.current_tier_id,
                 promoted_at = excluded.promoted_at,
                 demoted_at = excluded.demoted_at,
                 assessment_exempt_until = excluded.assessment_exempt_until,
                 updated_at = excluded.updated_at",
        )
        .bind(&manager.id.0)
        .bind(&manager.display_name)
        .bind(manager.role.as_str())
        .bind(manager.current_tier_id.as_ref().map(|id| id.0.as_str()))
        .bind(manager.promoted_at.map(|at| at.to_rfc3339()))
        .bind(manager.demoted_at.map(|at| at.to_rfc3339()))
        .bind(manager.assessment_exempt_until.map(|at| at.to_rfc3339()))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replaces the record for the manager and month if one exists.
    pub async fn record_monthly_sales(
        &self,
        record: &MonthlySalesRecord,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO monthly_sales (manager_id, month, sales_amount, insured_count)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(manager_id, month) DO UPDATE SET
                 sales_amount = excluded.sales_amount,
                 insured_count = excluded.insured_count",
        )
        .bind(&record.manager_id.0)
        .bind(&record.month)
        .bind(record.sales_amount.to_string())
        .bind(i64::from(record.insured_count))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Every manager regardless of role, ordered by id.
    pub async fn list_managers(&self) -> Result<Vec<Manager>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, display_name, role, current_tier_id, promoted_at, demoted_at,
                    assessment_exempt_until
             FROM manager ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(manager_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use tierwatch_core::domain::manager::{Manager, ManagerId, Role};
    use tierwatch_core::domain::tier::{Tier, TierId};

    use super::SqlRosterRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn save_manager_is_an_upsert() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlRosterRepository::new(pool);

        repo.save_tier(&Tier {
            id: TierId("T1".to_string()),
            tier_number: 1,
            name: "Range 1".to_string(),
            maintain_threshold: Decimal::from(1_200_000),
        })
        .await
        .expect("save tier");

        let mut manager = Manager {
            id: ManagerId("M-9".to_string()),
            display_name: "Ren".to_string(),
            role: Role::Manager,
            current_tier_id: Some(TierId("T1".to_string())),
            promoted_at: None,
            demoted_at: None,
            assessment_exempt_until: None,
        };
        repo.save_manager(&manager).await.expect("insert manager");

        let until = Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).single().expect("timestamp");
        manager.assessment_exempt_until = Some(until);
        repo.save_manager(&manager).await.expect("update manager");

        let managers = repo.list_managers().await.expect("list");
        assert_eq!(managers.len(), 1);
        assert_eq!(managers[0].assessment_exempt_until, Some(until));
    }

    #[tokio::test]
    async fn sales_for_unknown_manager_violate_foreign_key() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlRosterRepository::new(pool);

        let result = repo
            .record_monthly_sales(&tierwatch_core::domain::sales::MonthlySalesRecord {
                manager_id: ManagerId("ghost".to_string()),
                month: "2026-01".to_string(),
                sales_amount: Decimal::from(1),
                insured_count: 0,
            })
            .await;
        assert!(result.is_err());
    }
}
