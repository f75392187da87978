use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use tierwatch_core::domain::manager::{Manager, ManagerId, Role};
use tierwatch_core::domain::sales::MonthlySalesRecord;
use tierwatch_core::domain::tier::{Tier, TierId};
use tierwatch_core::period::Period;

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlRosterRepository};

const SEED_TIERS: &[(&str, u32, &str, i64)] = &[
    ("tier-1", 1, "Range 1", 1_200_000),
    ("tier-2", 2, "Range 2", 1_500_000),
    ("tier-3", 3, "Range 3", 2_400_000),
];

/// Deterministic demo population covering each batch outcome.
const SEED_MANAGERS: &[SeedManagerContract] = &[
    SeedManagerContract {
        id: "mgr-001",
        display_name: "Aoi Tanaka",
        role: Role::Manager,
        tier_id: Some("tier-2"),
        exempt: false,
        monthly_sales: [150_000, 200_000, 100_000, 250_000, 150_000, 150_000],
        expected: "demotion_candidate",
    },
    SeedManagerContract {
        id: "mgr-002",
        display_name: "Ren Sato",
        role: Role::Manager,
        tier_id: Some("tier-1"),
        exempt: false,
        monthly_sales: [300_000, 250_000, 250_000, 300_000, 250_000, 250_000],
        expected: "promoted",
    },
    SeedManagerContract {
        id: "mgr-003",
        display_name: "Mei Suzuki",
        role: Role::Manager,
        tier_id: Some("tier-3"),
        exempt: false,
        monthly_sales: [500_000, 450_000, 450_000, 500_000, 450_000, 450_000],
        expected: "stepped_down",
    },
    SeedManagerContract {
        id: "mgr-004",
        display_name: "Kaito Ito",
        role: Role::Manager,
        tier_id: Some("tier-2"),
        exempt: false,
        monthly_sales: [300_000; 6],
        expected: "maintained",
    },
    SeedManagerContract {
        id: "mgr-005",
        display_name: "Yui Watanabe",
        role: Role::Manager,
        tier_id: Some("tier-2"),
        exempt: true,
        monthly_sales: [100_000; 6],
        expected: "exempt",
    },
    SeedManagerContract {
        id: "agt-001",
        display_name: "Sora Kato",
        role: Role::Agent,
        tier_id: None,
        exempt: false,
        monthly_sales: [200_000; 6],
        expected: "not_assessed",
    },
];

const SEED_INSURED_PER_MONTH: u32 = 2;

#[derive(Debug, Clone, Copy)]
struct SeedManagerContract {
    id: &'static str,
    display_name: &'static str,
    role: Role,
    tier_id: Option<&'static str>,
    exempt: bool,
    monthly_sales: [i64; 6],
    expected: &'static str,
}

/// Demo tiers, managers and six months of sales for one period.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// Loads the dataset with sales in `period`. Re-loading overwrites the
    /// seeded rows and leaves everything else alone.
    pub async fn load(pool: &DbPool, period: &Period) -> Result<SeedResult, RepositoryError> {
        let roster = SqlRosterRepository::new(pool.clone());

        for (id, tier_number, name, threshold) in SEED_TIERS {
            roster
                .save_tier(&Tier {
                    id: TierId((*id).to_string()),
                    tier_number: *tier_number,
                    name: (*name).to_string(),
                    maintain_threshold: Decimal::from(*threshold),
                })
                .await?;
        }

        let exempt_until = Utc.with_ymd_and_hms(2099, 12, 31, 0, 0, 0).single();
        let months = period.months();
        let mut managers_seeded = Vec::with_capacity(SEED_MANAGERS.len());

        for contract in SEED_MANAGERS {
            roster
                .save_manager(&Manager {
                    id: ManagerId(contract.id.to_string()),
                    display_name: contract.display_name.to_string(),
                    role: contract.role,
                    current_tier_id: contract.tier_id.map(|id| TierId(id.to_string())),
                    promoted_at: None,
                    demoted_at: None,
                    assessment_exempt_until: if contract.exempt { exempt_until } else { None },
                })
                .await?;

            for (month, amount) in months.iter().zip(contract.monthly_sales) {
                roster
                    .record_monthly_sales(&MonthlySalesRecord {
                        manager_id: ManagerId(contract.id.to_string()),
                        month: month.clone(),
                        sales_amount: Decimal::from(amount),
                        insured_count: SEED_INSURED_PER_MONTH,
                    })
                    .await?;
            }

            managers_seeded.push(ManagerSeedInfo {
                manager_id: contract.id,
                display_name: contract.display_name,
                total_sales: Decimal::from(contract.monthly_sales.iter().sum::<i64>()),
                expected: contract.expected,
            });
        }

        Ok(SeedResult {
            period: period.to_string(),
            tiers_seeded: SEED_TIERS.len(),
            managers_seeded,
        })
    }

    /// Checks that every seeded manager and its sales for `period` are present.
    pub async fn verify(pool: &DbPool, period: &Period) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let tier_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM tier WHERE id IN {}",
            sql_array_from_ids(SEED_TIERS.iter().map(|(id, ..)| *id))
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("tiers", usize::try_from(tier_count).ok() == Some(SEED_TIERS.len())));

        for contract in SEED_MANAGERS {
            let manager_exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM manager WHERE id = ?1)",
            )
            .bind(contract.id)
            .fetch_one(pool)
            .await?;

            let month_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM monthly_sales
                 WHERE manager_id = ?1 AND month >= ?2 AND month <= ?3",
            )
            .bind(contract.id)
            .bind(&period.start_month)
            .bind(&period.end_month)
            .fetch_one(pool)
            .await?;

            checks.push((contract.id, manager_exists == 1 && month_count == 6));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded rows, including assessments and audit entries that
    /// reference seeded managers.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        let managers = sql_array_from_ids(SEED_MANAGERS.iter().map(|contract| contract.id));
        let tiers = sql_array_from_ids(SEED_TIERS.iter().map(|(id, ..)| *id));

        for statement in [
            format!("DELETE FROM role_change_audit WHERE manager_id IN {managers}"),
            format!("DELETE FROM assessment WHERE manager_id IN {managers}"),
            format!("DELETE FROM monthly_sales WHERE manager_id IN {managers}"),
            format!("DELETE FROM manager WHERE id IN {managers}"),
            format!("DELETE FROM tier WHERE id IN {tiers}"),
        ] {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let quoted = ids.map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug, Serialize)]
pub struct SeedResult {
    pub period: String,
    pub tiers_seeded: usize,
    pub managers_seeded: Vec<ManagerSeedInfo>,
}

#[derive(Debug, Serialize)]
pub struct ManagerSeedInfo {
    pub manager_id: &'static str,
    pub display_name: &'static str,
    pub total_sales: Decimal,
    /// Batch result the demo data is built to produce.
    pub expected: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use tierwatch_core::clock::FixedClock;
    use tierwatch_core::{AssessmentService, ManagerId, ManagerOutcome, Period};

    use super::{DemoSeedDataset, SEED_MANAGERS};
    use crate::repositories::SqlAssessmentStore;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[test]
    fn seed_sales_sum_to_documented_totals() {
        let first = SEED_MANAGERS.iter().find(|contract| contract.id == "mgr-001");
        let total: i64 = first.expect("mgr-001 seeded").monthly_sales.iter().sum();
        assert_eq!(total, 1_000_000);
    }

    #[tokio::test]
    async fn load_verify_and_clean_round_trip() {
        let pool = setup().await;
        let period = Period::new(2026, 1).expect("period");

        let seeded = DemoSeedDataset::load(&pool, &period).await.expect("load");
        assert_eq!(seeded.managers_seeded.len(), SEED_MANAGERS.len());
        assert!(DemoSeedDataset::load(&pool, &period).await.is_ok(), "seeding is re-runnable");

        let verification = DemoSeedDataset::verify(&pool, &period).await.expect("verify");
        assert!(verification.all_present, "checks: {:?}", verification.checks);

        DemoSeedDataset::clean(&pool).await.expect("clean");
        let verification = DemoSeedDataset::verify(&pool, &period).await.expect("verify");
        assert!(!verification.all_present);
    }

    #[tokio::test]
    async fn batch_over_seed_data_produces_documented_outcomes() {
        let pool = setup().await;
        let period = Period::new(2026, 1).expect("period");
        DemoSeedDataset::load(&pool, &period).await.expect("load");

        let now = Utc.with_ymd_and_hms(2026, 7, 1, 3, 0, 0).single().expect("timestamp");
        let service = AssessmentService::new(
            Arc::new(SqlAssessmentStore::new(pool)),
            Arc::new(FixedClock(now)),
        );
        let batch = service.run_assessment(&period, "cron").await.expect("batch");

        assert_eq!(batch.processed, 4);
        assert_eq!(batch.exempt, 1);
        assert_eq!(batch.demotion_candidates, 1);
        assert_eq!(batch.failed, 0);

        for contract in SEED_MANAGERS.iter().filter(|contract| contract.role.holds_tier()) {
            let outcome = batch
                .result_for(&ManagerId(contract.id.to_string()))
                .unwrap_or_else(|| panic!("{} missing from batch", contract.id));
            match (outcome, contract.expected) {
                (ManagerOutcome::Exempt { .. }, "exempt") => {}
                (ManagerOutcome::Assessed { outcome, total_sales, .. }, expected) => {
                    assert_eq!(outcome.as_str(), expected, "{}", contract.id);
                    assert_eq!(
                        *total_sales,
                        Decimal::from(contract.monthly_sales.iter().sum::<i64>())
                    );
                }
                (other, expected) => panic!("{}: expected {expected}, got {other:?}", contract.id),
            }
        }
    }
}
