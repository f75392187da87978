use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decision::DecisionOutcome;
use crate::domain::assessment::{AssessmentId, AssessmentStatus};
use crate::domain::manager::ManagerId;
use crate::period::Period;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ManagerOutcome {
    Assessed {
        assessment_id: AssessmentId,
        /// `false` when an existing pending row was recomputed.
        created: bool,
        total_sales: Decimal,
        total_insured_count: u32,
        current_tier_number: u32,
        proposed_tier_number: u32,
        outcome: DecisionOutcome,
        is_demotion_candidate: bool,
    },
    Exempt {
        exempt_until: DateTime<Utc>,
    },
    /// The period's assessment was already confirmed or demoted.
    Skipped {
        assessment_id: AssessmentId,
        status: AssessmentStatus,
    },
    Failed {
        error_class: String,
        error: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerAssessmentResult {
    pub manager_id: ManagerId,
    pub display_name: String,
    #[serde(flatten)]
    pub outcome: ManagerOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub period: Period,
    pub executed_by: String,
    pub executed_at: DateTime<Utc>,
    /// Managers whose assessment row was created or recomputed.
    pub processed: usize,
    pub demotion_candidates: usize,
    pub exempt: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<ManagerAssessmentResult>,
}

impl BatchResult {
    pub(crate) fn from_results(
        period: Period,
        executed_by: String,
        executed_at: DateTime<Utc>,
        mut results: Vec<ManagerAssessmentResult>,
    ) -> Self {
        results.sort_by(|left, right| left.manager_id.cmp(&right.manager_id));

        let mut summary = Self {
            period,
            executed_by,
            executed_at,
            processed: 0,
            demotion_candidates: 0,
            exempt: 0,
            skipped: 0,
            failed: 0,
            results: Vec::new(),
        };
        for result in &results {
            match &result.outcome {
                ManagerOutcome::Assessed { is_demotion_candidate, .. } => {
                    summary.processed += 1;
                    if *is_demotion_candidate {
                        summary.demotion_candidates += 1;
                    }
                }
                ManagerOutcome::Exempt { .. } => summary.exempt += 1,
                ManagerOutcome::Skipped { .. } => summary.skipped += 1,
                ManagerOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary.results = results;
        summary
    }

    pub fn result_for(&self, manager_id: &ManagerId) -> Option<&ManagerOutcome> {
        self.results
            .iter()
            .find(|result| &result.manager_id == manager_id)
            .map(|result| &result.outcome)
    }
}
