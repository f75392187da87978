use tierwatch_core::AssessmentId;

use crate::commands::{block_on, engine_failure, load_config, open_pool, service, CommandResult};

const COMMAND: &str = "confirm";

pub fn run(assessment_id: &str, confirmed_by: &str, apply_tier_change: bool) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let id = AssessmentId(assessment_id.trim().to_string());
    let result = block_on(COMMAND, async {
        let pool = open_pool(&config).await?;
        let confirmed = service(&config, pool.clone())
            .confirm(&id, confirmed_by, apply_tier_change)
            .await
            .map_err(engine_failure);
        pool.close().await;
        confirmed
    });

    match result {
        Ok(assessment) => {
            let message = if apply_tier_change {
                format!("confirmed assessment {} and applied the proposed tier", assessment.id.0)
            } else {
                format!("confirmed assessment {} without changing the tier", assessment.id.0)
            };
            CommandResult::success_with_data(COMMAND, message, &assessment)
        }
        Err(result) => result,
    }
}
