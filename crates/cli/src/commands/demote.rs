use tierwatch_core::AssessmentId;

use crate::commands::{block_on, engine_failure, load_config, open_pool, service, CommandResult};

const COMMAND: &str = "demote";

pub fn run(assessment_id: &str, demoted_by: &str) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let id = AssessmentId(assessment_id.trim().to_string());
    let result = block_on(COMMAND, async {
        let pool = open_pool(&config).await?;
        let demoted = service(&config, pool.clone())
            .demote(&id, demoted_by)
            .await
            .map_err(engine_failure);
        pool.close().await;
        demoted
    });

    match result {
        Ok(outcome) => CommandResult::success_with_data(
            COMMAND,
            format!(
                "demoted manager {} to {}",
                outcome.manager.id.0,
                outcome.manager.role.as_str()
            ),
            &serde_json::json!({
                "assessment": outcome.assessment,
                "manager": outcome.manager,
                "audit_entry": outcome.audit_entry,
            }),
        ),
        Err(result) => result,
    }
}
