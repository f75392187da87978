use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::manager::ManagerId;

/// Aggregated sales for one manager and one calendar month (`YYYY-MM`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlySalesRecord {
    pub manager_id: ManagerId,
    pub month: String,
    pub sales_amount: Decimal,
    pub insured_count: u32,
}
