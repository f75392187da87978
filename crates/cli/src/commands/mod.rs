pub mod assess;
pub mod assessments;
pub mod config;
pub mod confirm;
pub mod demote;
pub mod migrate;
pub mod period;
pub mod seed;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tierwatch_core::clock::{Clock, SystemClock};
use tierwatch_core::config::{AppConfig, LoadOptions};
use tierwatch_core::{AssessmentService, EngineError, Period};
use tierwatch_db::{connect_with_config, migrations, DbPool, SqlAssessmentStore};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    /// Success payload carrying a structured `data` field.
    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: &impl Serialize,
    ) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(error) => {
                return Self::failure(
                    command,
                    "serialization",
                    format!("failed to serialize command output: {error}"),
                    3,
                )
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: Some(data),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// `(error_class, message, exit_code)` raised inside a command body.
pub(crate) type Failure = (&'static str, String, u8);

pub(crate) fn engine_failure(error: EngineError) -> Failure {
    (error.error_class(), error.to_string(), error.exit_code())
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

/// Drives `body` to completion on a current-thread runtime.
pub(crate) fn block_on<T, F>(command: &str, body: F) -> Result<T, CommandResult>
where
    F: Future<Output = Result<T, Failure>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        },
    )?;

    runtime.block_on(body).map_err(|(error_class, message, exit_code)| {
        CommandResult::failure(command, error_class, message, exit_code)
    })
}

/// Connects and applies pending migrations so every command sees the
/// current schema.
pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;
    Ok(pool)
}

pub(crate) fn service(
    config: &AppConfig,
    pool: DbPool,
) -> AssessmentService<SqlAssessmentStore> {
    AssessmentService::new(Arc::new(SqlAssessmentStore::new(pool)), Arc::new(SystemClock))
        .with_max_concurrency(config.assessment.max_concurrency)
}

/// Parses `--period`, defaulting to the period containing today.
pub(crate) fn resolve_period(raw: Option<&str>, clock: &dyn Clock) -> Result<Period, Failure> {
    match raw {
        Some(raw) => raw.parse::<Period>().map_err(engine_failure),
        None => Ok(Period::current(clock)),
    }
}
