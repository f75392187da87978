use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::assessment::AssessmentId;
use crate::domain::manager::{ManagerId, Role};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleChangeId(pub String);

/// Append-only record of a role change. Never updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChangeAuditEntry {
    pub id: RoleChangeId,
    pub manager_id: ManagerId,
    pub assessment_id: Option<AssessmentId>,
    pub from_role: Role,
    pub to_role: Role,
    pub reason: String,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}
