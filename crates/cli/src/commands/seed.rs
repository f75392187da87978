use serde::Serialize;
use tierwatch_core::clock::SystemClock;
use tierwatch_db::{DemoSeedDataset, ManagerSeedInfo};

use crate::commands::{block_on, load_config, open_pool, resolve_period, CommandResult};

const COMMAND: &str = "seed";

#[derive(Debug, Serialize)]
struct SeedOutput {
    period: String,
    tiers_seeded: usize,
    managers: Vec<ManagerSeedInfo>,
}

/// Loads the demo population with sales in `period` (default: current).
pub fn run(period: Option<&str>) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = block_on(COMMAND, async {
        let period = resolve_period(period, &SystemClock)?;
        let pool = open_pool(&config).await?;

        let seeded = DemoSeedDataset::load(&pool, &period)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoSeedDataset::verify(&pool, &period)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 5u8))?;

        let run_result = if verification.all_present {
            Ok(SeedOutput {
                period: seeded.period,
                tiers_seeded: seeded.tiers_seeded,
                managers: seeded.managers_seeded,
            })
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err((
                "seed_verification",
                format!("seed verification failed for checks: {}", failed_checks.join(", ")),
                5u8,
            ))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(output) => {
            let lines: Vec<String> = output
                .managers
                .iter()
                .map(|seed| {
                    format!("  - {}: {} ({})", seed.manager_id, seed.display_name, seed.expected)
                })
                .collect();
            let message = format!(
                "seeded {} tiers and {} managers for {}:\n{}",
                output.tiers_seeded,
                output.managers.len(),
                output.period,
                lines.join("\n")
            );
            CommandResult::success_with_data(COMMAND, message, &output)
        }
        Err(result) => result,
    }
}
