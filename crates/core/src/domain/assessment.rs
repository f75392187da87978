use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decision::DecisionOutcome;
use crate::domain::manager::ManagerId;
use crate::domain::tier::TierId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssessmentId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Pending,
    Confirmed,
    Demoted,
}

impl AssessmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Demoted => "demoted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "demoted" => Some(Self::Demoted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One evaluation of a manager for one half-year period.
///
/// Totals are copied at evaluation time and never recomputed from live sales.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub manager_id: ManagerId,
    pub period_year: i32,
    pub period_half: u8,
    pub total_sales: Decimal,
    pub total_insured_count: u32,
    pub previous_tier_id: Option<TierId>,
    pub proposed_tier_id: Option<TierId>,
    pub is_demotion_candidate: bool,
    pub outcome: DecisionOutcome,
    pub status: AssessmentStatus,
    pub assessed_by: String,
    pub assessed_at: DateTime<Utc>,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Freshly computed fields for the batch upsert. The store owns the row id and
/// status for an existing row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentDraft {
    pub manager_id: ManagerId,
    pub period_year: i32,
    pub period_half: u8,
    pub total_sales: Decimal,
    pub total_insured_count: u32,
    pub previous_tier_id: Option<TierId>,
    pub proposed_tier_id: Option<TierId>,
    pub is_demotion_candidate: bool,
    pub outcome: DecisionOutcome,
    pub assessed_by: String,
    pub assessed_at: DateTime<Utc>,
}

impl AssessmentDraft {
    pub fn into_pending(self, id: AssessmentId) -> Assessment {
        Assessment {
            id,
            manager_id: self.manager_id,
            period_year: self.period_year,
            period_half: self.period_half,
            total_sales: self.total_sales,
            total_insured_count: self.total_insured_count,
            previous_tier_id: self.previous_tier_id,
            proposed_tier_id: self.proposed_tier_id,
            is_demotion_candidate: self.is_demotion_candidate,
            outcome: self.outcome,
            status: AssessmentStatus::Pending,
            assessed_by: self.assessed_by,
            assessed_at: self.assessed_at,
            confirmed_by: None,
            confirmed_at: None,
        }
    }
}
