use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::model::ModelCatalog;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub assistant: AssistantConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub standard_model: String,
    pub complex_model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub offline: bool,
}

impl LlmConfig {
    pub fn model_catalog(&self) -> ModelCatalog {
        ModelCatalog { standard: self.standard_model.clone(), complex: self.complex_model.clone() }
    }
}

#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub max_iterations: u32,
    pub tool_timeout_secs: u64,
    pub pending_action_ttl_secs: u64,
    pub max_pending_actions_per_run: usize,
    pub history_limit: u32,
    pub rate_limit_per_minute: u32,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_offline: Option<bool>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let models = ModelCatalog::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://cheers.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.anthropic.com".to_string(),
                standard_model: models.standard,
                complex_model: models.complex,
                timeout_secs: 120,
                max_retries: 2,
                offline: false,
            },
            assistant: AssistantConfig {
                max_iterations: 5,
                tool_timeout_secs: 120,
                pending_action_ttl_secs: 300,
                max_pending_actions_per_run: 20,
                history_limit: 40,
                rate_limit_per_minute: 20,
                sweep_interval_secs: 60,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("cheers.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            merge(&mut self.database.url, database.url);
            merge(&mut self.database.max_connections, database.max_connections);
            merge(&mut self.database.timeout_secs, database.timeout_secs);
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            merge(&mut self.llm.base_url, llm.base_url);
            merge(&mut self.llm.standard_model, llm.standard_model);
            merge(&mut self.llm.complex_model, llm.complex_model);
            merge(&mut self.llm.timeout_secs, llm.timeout_secs);
            merge(&mut self.llm.max_retries, llm.max_retries);
            merge(&mut self.llm.offline, llm.offline);
        }

        if let Some(assistant) = patch.assistant {
            let target = &mut self.assistant;
            merge(&mut target.max_iterations, assistant.max_iterations);
            merge(&mut target.tool_timeout_secs, assistant.tool_timeout_secs);
            merge(&mut target.pending_action_ttl_secs, assistant.pending_action_ttl_secs);
            merge(&mut target.max_pending_actions_per_run, assistant.max_pending_actions_per_run);
            merge(&mut target.history_limit, assistant.history_limit);
            merge(&mut target.rate_limit_per_minute, assistant.rate_limit_per_minute);
            merge(&mut target.sweep_interval_secs, assistant.sweep_interval_secs);
        }

        if let Some(server) = patch.server {
            merge(&mut self.server.bind_address, server.bind_address);
            merge(&mut self.server.port, server.port);
            merge(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }

        if let Some(logging) = patch.logging {
            merge(&mut self.logging.level, logging.level);
            merge(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let database = &mut self.database;
        env_string("CHEERS_DATABASE_URL", &mut database.url);
        env_parsed("CHEERS_DATABASE_MAX_CONNECTIONS", &mut database.max_connections)?;
        env_parsed("CHEERS_DATABASE_TIMEOUT_SECS", &mut database.timeout_secs)?;

        let llm = &mut self.llm;
        if let Some(value) = read_env("CHEERS_LLM_API_KEY") {
            llm.api_key = Some(secret_value(value));
        }
        env_string("CHEERS_LLM_BASE_URL", &mut llm.base_url);
        env_string("CHEERS_LLM_STANDARD_MODEL", &mut llm.standard_model);
        env_string("CHEERS_LLM_COMPLEX_MODEL", &mut llm.complex_model);
        env_parsed("CHEERS_LLM_TIMEOUT_SECS", &mut llm.timeout_secs)?;
        env_parsed("CHEERS_LLM_MAX_RETRIES", &mut llm.max_retries)?;
        env_parsed("CHEERS_LLM_OFFLINE", &mut llm.offline)?;

        let assistant = &mut self.assistant;
        env_parsed("CHEERS_ASSISTANT_MAX_ITERATIONS", &mut assistant.max_iterations)?;
        env_parsed("CHEERS_ASSISTANT_TOOL_TIMEOUT_SECS", &mut assistant.tool_timeout_secs)?;
        env_parsed(
            "CHEERS_ASSISTANT_PENDING_ACTION_TTL_SECS",
            &mut assistant.pending_action_ttl_secs,
        )?;
        env_parsed(
            "CHEERS_ASSISTANT_MAX_PENDING_ACTIONS_PER_RUN",
            &mut assistant.max_pending_actions_per_run,
        )?;
        env_parsed("CHEERS_ASSISTANT_HISTORY_LIMIT", &mut assistant.history_limit)?;
        env_parsed("CHEERS_ASSISTANT_RATE_LIMIT_PER_MINUTE", &mut assistant.rate_limit_per_minute)?;
        env_parsed("CHEERS_ASSISTANT_SWEEP_INTERVAL_SECS", &mut assistant.sweep_interval_secs)?;

        let server = &mut self.server;
        env_string("CHEERS_SERVER_BIND_ADDRESS", &mut server.bind_address);
        env_parsed("CHEERS_SERVER_PORT", &mut server.port)?;
        env_parsed("CHEERS_SERVER_GRACEFUL_SHUTDOWN_SECS", &mut server.graceful_shutdown_secs)?;

        // The short `CHEERS_LOG_*` spellings are accepted as aliases.
        if let Some(value) = read_env("CHEERS_LOGGING_LEVEL").or_else(|| read_env("CHEERS_LOG_LEVEL")) {
            self.logging.level = value;
        }
        if let Some(value) = read_env("CHEERS_LOGGING_FORMAT").or_else(|| read_env("CHEERS_LOG_FORMAT")) {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        merge(&mut self.database.url, overrides.database_url);
        merge(&mut self.logging.level, overrides.log_level);
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(api_key));
        }
        merge(&mut self.llm.offline, overrides.llm_offline);
        merge(&mut self.server.port, overrides.server_port);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_assistant(&self.assistant)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("cheers.toml"), PathBuf::from("config/cheers.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let key = &after[..end];
        let value = env::var(key)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.standard_model.trim().is_empty() || llm.complex_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.standard_model and llm.complex_model must not be empty".to_string(),
        ));
    }

    let missing_key =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    if missing_key && !llm.offline {
        return Err(ConfigError::Validation(
            "llm.api_key is required (set CHEERS_LLM_API_KEY, or llm.offline = true for \
             health/CLI-only use)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_assistant(assistant: &AssistantConfig) -> Result<(), ConfigError> {
    let positive = [
        ("max_iterations", u64::from(assistant.max_iterations)),
        ("tool_timeout_secs", assistant.tool_timeout_secs),
        ("pending_action_ttl_secs", assistant.pending_action_ttl_secs),
        ("max_pending_actions_per_run", assistant.max_pending_actions_per_run as u64),
        ("history_limit", u64::from(assistant.history_limit)),
        ("rate_limit_per_minute", u64::from(assistant.rate_limit_per_minute)),
        ("sweep_interval_secs", assistant.sweep_interval_secs),
    ];
    match positive.iter().find(|(_, value)| *value == 0) {
        Some((key, _)) => Err(ConfigError::Validation(format!(
            "assistant.{key} must be greater than zero"
        ))),
        None => Ok(()),
    }
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn merge<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_string(key: &str, target: &mut String) {
    merge(target, read_env(key));
}

/// Overwrites `target` when `key` is set; a value that does not parse is an error,
/// never a silent fallback to the previous layer.
fn env_parsed<T: FromStr>(key: &str, target: &mut T) -> Result<(), ConfigError> {
    let Some(value) = read_env(key) else {
        return Ok(());
    };
    *target = value.trim().to_ascii_lowercase().parse().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.clone() }
    })?;
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    assistant: Option<AssistantPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    standard_model: Option<String>,
    complex_model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    offline: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantPatch {
    max_iterations: Option<u32>,
    tool_timeout_secs: Option<u64>,
    pending_action_ttl_secs: Option<u64>,
    max_pending_actions_per_run: Option<usize>,
    history_limit: Option<u32>,
    rate_limit_per_minute: Option<u32>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CHEERS_API_KEY", "sk-ant-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("cheers.toml");
            fs::write(
                &path,
                r#"
[llm]
api_key = "${TEST_CHEERS_API_KEY}"

[assistant]
max_iterations = 7
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-ant-from-env")
                    == Some(true),
                "api key should be interpolated from the environment",
            )?;
            ensure(config.assistant.max_iterations == 7, "file value should replace default")?;
            ensure(
                config.assistant.tool_timeout_secs == 120,
                "untouched assistant keys keep defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_CHEERS_API_KEY"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("cheers.toml");
        fs::write(&path, "[llm]\napi_key = \"${CHEERS_TEST_UNSET_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            {
                Ok(_) => return Err("expected interpolation failure".to_string()),
                Err(error) => error,
            };
        ensure(
            matches!(error, ConfigError::MissingEnvInterpolation { ref var } if var == "CHEERS_TEST_UNSET_VAR"),
            "error should name the missing variable",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CHEERS_LLM_OFFLINE", "true");
        env::set_var("CHEERS_LOG_LEVEL", "warn");
        env::set_var("CHEERS_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["CHEERS_LLM_OFFLINE", "CHEERS_LOG_LEVEL", "CHEERS_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CHEERS_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("CHEERS_LLM_API_KEY", "sk-ant-env");
        env::set_var("CHEERS_ASSISTANT_HISTORY_LIMIT", "25");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("cheers.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[llm]
api_key = "sk-ant-file"

[assistant]
history_limit = 10
rate_limit_per_minute = 5

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-ant-env")
                    == Some(true),
                "env api key should win over file",
            )?;
            ensure(config.assistant.history_limit == 25, "env history limit should win")?;
            ensure(config.assistant.rate_limit_per_minute == 5, "file rate limit should apply")?;
            Ok(())
        })();

        clear_vars(&["CHEERS_DATABASE_URL", "CHEERS_LLM_API_KEY", "CHEERS_ASSISTANT_HISTORY_LIMIT"]);
        result
    }

    #[test]
    fn missing_api_key_fails_unless_offline() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("llm.api_key")),
            "validation failure should mention llm.api_key",
        )?;

        let offline = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { llm_offline: Some(true), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        });
        ensure(offline.is_ok(), "offline mode should not require an api key")
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CHEERS_LLM_OFFLINE", "true");
        env::set_var("CHEERS_ASSISTANT_MAX_ITERATIONS", "many");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected invalid override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "CHEERS_ASSISTANT_MAX_ITERATIONS"),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["CHEERS_LLM_OFFLINE", "CHEERS_ASSISTANT_MAX_ITERATIONS"]);
        result
    }

    #[test]
    fn zero_assistant_limits_are_rejected_by_name() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.llm.offline = true;
        config.assistant.rate_limit_per_minute = 0;

        match config.validate() {
            Err(ConfigError::Validation(message)) => ensure(
                message == "assistant.rate_limit_per_minute must be greater than zero",
                "validation message should name the key",
            ),
            other => Err(format!("expected validation failure, got {other:?}")),
        }
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CHEERS_LLM_API_KEY", "sk-ant-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-ant-secret-value"), "debug output should not contain key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["CHEERS_LLM_API_KEY"]);
        result
    }
}
