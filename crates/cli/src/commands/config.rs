use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use logicall_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

struct Field<'a> {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: &'a str,
}

pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let max_connections = config.store.max_connections.to_string();
    let timeout_secs = config.store.timeout_secs.to_string();
    let log_format = format!("{:?}", config.logging.format).to_ascii_lowercase();
    let fields = [
        Field { key: "store.url", env_keys: &["LOGICALL_STORE_URL"], value: &config.store.url },
        Field {
            key: "store.max_connections",
            env_keys: &["LOGICALL_STORE_MAX_CONNECTIONS"],
            value: &max_connections,
        },
        Field {
            key: "store.timeout_secs",
            env_keys: &["LOGICALL_STORE_TIMEOUT_SECS"],
            value: &timeout_secs,
        },
        Field {
            key: "agent.tenant_id",
            env_keys: &["LOGICALL_TENANT_ID"],
            value: &config.agent.tenant_id,
        },
        Field {
            key: "agent.http_tool_user_agent",
            env_keys: &["LOGICALL_HTTP_TOOL_USER_AGENT"],
            value: &config.agent.http_tool_user_agent,
        },
        Field {
            key: "logging.level",
            env_keys: &["LOGICALL_LOGGING_LEVEL", "LOGICALL_LOG_LEVEL"],
            value: &config.logging.level,
        },
        Field {
            key: "logging.format",
            env_keys: &["LOGICALL_LOGGING_FORMAT", "LOGICALL_LOG_FORMAT"],
            value: &log_format,
        },
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in &fields {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("logicall.toml"), PathBuf::from("config/logicall.toml")]
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
    use super::{contains_path, field_source};

    #[test]
    fn nested_keys_are_found_in_the_file() {
        let doc: toml::Value = "[store]\nurl = \"sqlite://x.db\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "store.url"));
        assert!(!contains_path(&doc, "store.timeout_secs"));
        assert!(!contains_path(&doc, "agent.tenant_id"));
    }

    #[test]
    fn unset_keys_report_their_default() {
        let source = field_source("agent.tenant_id", &["LOGICALL_TEST_UNSET_VAR"], None, None);

        assert_eq!(source, "default");
    }
}
