pub mod aggregation;
pub mod assessment;
pub mod clock;
pub mod config;
pub mod decision;
pub mod domain;
pub mod errors;
pub mod period;

pub use assessment::{
    AssessmentService, AssessmentStore, BatchResult, DemotionOutcome, InMemoryAssessmentStore,
    ManagerAssessmentResult, ManagerOutcome,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use decision::{decide, Decision, DecisionOutcome};
pub use domain::assessment::{Assessment, AssessmentId, AssessmentStatus};
pub use domain::manager::{Manager, ManagerId, Role};
pub use domain::tier::{Tier, TierId, TierTable};
pub use errors::{EngineError, StoreError};
pub use period::Period;
