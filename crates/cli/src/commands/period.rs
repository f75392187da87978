use tierwatch_core::clock::SystemClock;
use tierwatch_core::Period;

use crate::commands::{engine_failure, CommandResult};

const COMMAND: &str = "period";

/// Shows the current period, or an explicit one when both parts are given.
pub fn run(year: Option<i32>, half: Option<u8>) -> CommandResult {
    let period = match (year, half) {
        (Some(year), Some(half)) => Period::new(year, half),
        (None, None) => Ok(Period::current(&SystemClock)),
        _ => {
            return CommandResult::failure(
                COMMAND,
                "validation",
                "--year and --half must be given together",
                2,
            )
        }
    };

    match period {
        Ok(period) => CommandResult::success_with_data(
            COMMAND,
            format!("{} ({} .. {})", period.label, period.start_month, period.end_month),
            &serde_json::json!({
                "period": period.to_string(),
                "year": period.year,
                "half": period.half,
                "label": period.label,
                "start_month": period.start_month,
                "end_month": period.end_month,
                "months": period.months(),
                "previous": period.previous().to_string(),
                "next": period.next().to_string(),
            }),
        ),
        Err(error) => {
            let (error_class, message, exit_code) = engine_failure(error);
            CommandResult::failure(COMMAND, error_class, message, exit_code)
        }
    }
}
