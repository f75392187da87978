use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use toml::Value;

use crate::commands::{load_config, CommandResult};

const COMMAND: &str = "config";

#[derive(Debug, Serialize)]
struct ConfigField {
    key: &'static str,
    value: String,
    source: String,
}

/// Effective configuration with the layer each value came from.
pub fn run() -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key: &str, env_keys: &[&str]| {
        field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let fields = vec![
        ConfigField {
            key: "database.url",
            value: config.database.url.clone(),
            source: source("database.url", &["TIERWATCH_DATABASE_URL"]),
        },
        ConfigField {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            source: source("database.max_connections", &["TIERWATCH_DATABASE_MAX_CONNECTIONS"]),
        },
        ConfigField {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            source: source("database.timeout_secs", &["TIERWATCH_DATABASE_TIMEOUT_SECS"]),
        },
        ConfigField {
            key: "assessment.max_concurrency",
            value: config.assessment.max_concurrency.to_string(),
            source: source(
                "assessment.max_concurrency",
                &["TIERWATCH_ASSESSMENT_MAX_CONCURRENCY"],
            ),
        },
        ConfigField {
            key: "logging.level",
            value: config.logging.level.clone(),
            source: source("logging.level", &["TIERWATCH_LOGGING_LEVEL", "TIERWATCH_LOG_LEVEL"]),
        },
        ConfigField {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            source: source(
                "logging.format",
                &["TIERWATCH_LOGGING_FORMAT", "TIERWATCH_LOG_FORMAT"],
            ),
        },
    ];

    CommandResult::success_with_data(
        COMMAND,
        "effective config (source precedence: env > file > default)",
        &fields,
    )
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("tierwatch.toml"), PathBuf::from("config/tierwatch.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, field_source};

    #[test]
    fn file_keys_are_attributed_to_the_file() {
        let doc: Value = "[assessment]\nmax_concurrency = 8\n".parse().expect("toml");
        assert!(contains_path(&doc, "assessment.max_concurrency"));
        assert!(!contains_path(&doc, "logging.level"));

        let source = field_source(
            "assessment.max_concurrency",
            &["TIERWATCH_TEST_UNSET_KEY"],
            Some(&doc),
            None,
        );
        assert_eq!(source, "file (config file)");
        assert_eq!(field_source("logging.level", &[], Some(&doc), None), "default");
    }
}
