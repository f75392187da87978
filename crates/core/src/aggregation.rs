use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::assessment::AssessmentStore;
use crate::domain::manager::ManagerId;
use crate::domain::sales::MonthlySalesRecord;
use crate::errors::EngineError;
use crate::period::Period;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlySales {
    pub month: String,
    pub sales_amount: Decimal,
    pub insured_count: u32,
}

/// Period totals for one manager. Months without a record are left out of the
/// breakdown rather than zero-filled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub total_sales: Decimal,
    pub total_insured_count: u32,
    pub monthly_breakdown: Vec<MonthlySales>,
}

impl SalesSummary {
    /// Fails with a validation error if the sales total overflows `Decimal`.
    pub fn from_records<I>(period: &Period, records: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = MonthlySalesRecord>,
    {
        let mut monthly_breakdown: Vec<MonthlySales> = records
            .into_iter()
            .filter(|record| period.contains_month(&record.month))
            .map(|record| MonthlySales {
                month: record.month,
                sales_amount: record.sales_amount,
                insured_count: record.insured_count,
            })
            .collect();
        monthly_breakdown.sort_by(|left, right| left.month.cmp(&right.month));

        let total_sales =
            monthly_breakdown.iter().try_fold(Decimal::ZERO, |total, month| {
                total.checked_add(month.sales_amount).ok_or_else(|| {
                    EngineError::Validation(format!(
                        "sales total for {period} overflows at {}",
                        month.month
                    ))
                })
            })?;
        let total_insured_count = monthly_breakdown
            .iter()
            .fold(0u32, |total, month| total.saturating_add(month.insured_count));

        Ok(Self { total_sales, total_insured_count, monthly_breakdown })
    }
}

pub async fn aggregate<S>(
    store: &S,
    manager_id: &ManagerId,
    period: &Period,
) -> Result<SalesSummary, EngineError>
where
    S: AssessmentStore + ?Sized,
{
    let records =
        store.list_monthly_sales(manager_id, &period.start_month, &period.end_month).await?;
    SalesSummary::from_records(period, records)
}
