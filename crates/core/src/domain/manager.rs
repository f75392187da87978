use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tier::TierId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManagerId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Holds a tier and is subject to periodic assessment.
    Manager,
    /// Outside the tier system; the role a demoted manager lands in.
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Agent => "agent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manager" => Some(Self::Manager),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }

    pub fn holds_tier(&self) -> bool {
        matches!(self, Self::Manager)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manager {
    pub id: ManagerId,
    pub display_name: String,
    pub role: Role,
    pub current_tier_id: Option<TierId>,
    pub promoted_at: Option<DateTime<Utc>>,
    pub demoted_at: Option<DateTime<Utc>>,
    pub assessment_exempt_until: Option<DateTime<Utc>>,
}

impl Manager {
    /// An exemption only applies while its end is strictly after `now`.
    pub fn is_exempt_at(&self, now: DateTime<Utc>) -> bool {
        self.assessment_exempt_until.is_some_and(|until| until > now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{Manager, ManagerId, Role};

    fn manager(exempt_until: Option<chrono::DateTime<Utc>>) -> Manager {
        Manager {
            id: ManagerId("M-1".to_string()),
            display_name: "Aoi".to_string(),
            role: Role::Manager,
            current_tier_id: None,
            promoted_at: None,
            demoted_at: None,
            assessment_exempt_until: exempt_until,
        }
    }

    #[test]
    fn exemption_is_active_only_before_its_end() {
        let now = Utc.with_ymd_and_hms(2026, 6, 30, 0, 0, 0).single().expect("valid timestamp");

        assert!(manager(Some(now + Duration::days(1))).is_exempt_at(now));
        assert!(!manager(Some(now)).is_exempt_at(now));
        assert!(!manager(Some(now - Duration::days(1))).is_exempt_at(now));
        assert!(!manager(None).is_exempt_at(now));
    }

    #[test]
    fn role_round_trips_from_storage_encoding() {
        for role in [Role::Manager, Role::Agent] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("owner"), None);
    }
}
