use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use cheers_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let assistant = &config.assistant;
    let entries: Vec<(&str, String, &str)> = vec![
        ("database.url", config.database.url.clone(), "CHEERS_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "CHEERS_DATABASE_MAX_CONNECTIONS",
        ),
        ("database.timeout_secs", config.database.timeout_secs.to_string(), "CHEERS_DATABASE_TIMEOUT_SECS"),
        ("llm.api_key", api_key, "CHEERS_LLM_API_KEY"),
        ("llm.base_url", config.llm.base_url.clone(), "CHEERS_LLM_BASE_URL"),
        ("llm.standard_model", config.llm.standard_model.clone(), "CHEERS_LLM_STANDARD_MODEL"),
        ("llm.complex_model", config.llm.complex_model.clone(), "CHEERS_LLM_COMPLEX_MODEL"),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), "CHEERS_LLM_TIMEOUT_SECS"),
        ("llm.max_retries", config.llm.max_retries.to_string(), "CHEERS_LLM_MAX_RETRIES"),
        ("llm.offline", config.llm.offline.to_string(), "CHEERS_LLM_OFFLINE"),
        (
            "assistant.max_iterations",
            assistant.max_iterations.to_string(),
            "CHEERS_ASSISTANT_MAX_ITERATIONS",
        ),
        (
            "assistant.tool_timeout_secs",
            assistant.tool_timeout_secs.to_string(),
            "CHEERS_ASSISTANT_TOOL_TIMEOUT_SECS",
        ),
        (
            "assistant.pending_action_ttl_secs",
            assistant.pending_action_ttl_secs.to_string(),
            "CHEERS_ASSISTANT_PENDING_ACTION_TTL_SECS",
        ),
        (
            "assistant.max_pending_actions_per_run",
            assistant.max_pending_actions_per_run.to_string(),
            "CHEERS_ASSISTANT_MAX_PENDING_ACTIONS_PER_RUN",
        ),
        (
            "assistant.history_limit",
            assistant.history_limit.to_string(),
            "CHEERS_ASSISTANT_HISTORY_LIMIT",
        ),
        (
            "assistant.rate_limit_per_minute",
            assistant.rate_limit_per_minute.to_string(),
            "CHEERS_ASSISTANT_RATE_LIMIT_PER_MINUTE",
        ),
        (
            "assistant.sweep_interval_secs",
            assistant.sweep_interval_secs.to_string(),
            "CHEERS_ASSISTANT_SWEEP_INTERVAL_SECS",
        ),
        ("server.bind_address", config.server.bind_address.clone(), "CHEERS_SERVER_BIND_ADDRESS"),
        ("server.port", config.server.port.to_string(), "CHEERS_SERVER_PORT"),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "CHEERS_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        ("logging.level", config.logging.level.clone(), "CHEERS_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "CHEERS_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in entries {
        lines.push(render_line(
            key,
            &value,
            field_source(key, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref()),
        ));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("cheers.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/cheers.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    // Anthropic keys look like `sk-ant-...`; keep only the vendor prefix.
    match trimmed.match_indices('-').nth(1) {
        Some((index, _)) => format!("{}-***", &trimmed[..index]),
        None => "<redacted>".to_string(),
    }
}
