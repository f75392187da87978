use tierwatch_core::clock::SystemClock;
use tierwatch_core::AssessmentStatus;

use crate::commands::{
    block_on, engine_failure, load_config, open_pool, resolve_period, service, CommandResult,
};

const COMMAND: &str = "assessments";

pub fn run(period: Option<&str>, status: Option<&str>) -> CommandResult {
    let status = match status.map(|raw| (raw, AssessmentStatus::parse(raw))) {
        None => None,
        Some((_, Some(status))) => Some(status),
        Some((raw, None)) => {
            return CommandResult::failure(
                COMMAND,
                "validation",
                format!("unknown status `{raw}` (expected pending|confirmed|demoted)"),
                2,
            )
        }
    };

    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = block_on(COMMAND, async {
        let period = resolve_period(period, &SystemClock)?;
        let pool = open_pool(&config).await?;
        let assessments = service(&config, pool.clone())
            .list_assessments(&period, status)
            .await
            .map_err(engine_failure);
        pool.close().await;
        Ok((period, assessments?))
    });

    match result {
        Ok((period, assessments)) => CommandResult::success_with_data(
            COMMAND,
            format!("{} assessments for {period}", assessments.len()),
            &assessments,
        ),
        Err(result) => result,
    }
}
