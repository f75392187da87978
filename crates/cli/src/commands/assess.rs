use tierwatch_core::clock::SystemClock;

use crate::commands::{
    block_on, engine_failure, load_config, open_pool, resolve_period, service, CommandResult,
};

const COMMAND: &str = "assess";

/// Runs the batch for `period` (default: current). Per-manager failures are
/// listed in the output and turn the exit code into a storage failure.
pub fn run(period: Option<&str>, executed_by: &str) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = block_on(COMMAND, async {
        let period = resolve_period(period, &SystemClock)?;
        let pool = open_pool(&config).await?;
        let batch = service(&config, pool.clone())
            .run_assessment(&period, executed_by)
            .await
            .map_err(engine_failure);
        pool.close().await;
        batch
    });

    let batch = match result {
        Ok(batch) => batch,
        Err(result) => return result,
    };

    let message = format!(
        "{}: {} assessed, {} demotion candidates, {} exempt, {} skipped, {} failed",
        batch.period,
        batch.processed,
        batch.demotion_candidates,
        batch.exempt,
        batch.skipped,
        batch.failed
    );
    let mut output = CommandResult::success_with_data(COMMAND, message, &batch);
    if batch.failed > 0 && output.exit_code == 0 {
        output.exit_code = 5;
    }
    output
}
