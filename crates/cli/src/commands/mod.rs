//! Operator commands. Each one prints a single JSON object
//! (`{command, status, error_class, message}`) and maps failures to an exit code:
//! 2 config, 3 runtime, 4 database connectivity, 5 migration or sweep.

pub mod config;
pub mod doctor;
pub mod migrate;
pub mod sweep;

use cheers_core::config::{AppConfig, LoadOptions};
use cheers_db::{connect_with_settings, DbPool};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Serialize)]
struct Outcome<'a> {
    command: &'a str,
    status: &'static str,
    error_class: Option<&'a str>,
    message: &'a str,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let output = render(Outcome { command, status: "ok", error_class: None, message: &message });
        Self { exit_code: 0, output }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let message = message.into();
        let output = render(Outcome {
            command,
            status: "error",
            error_class: Some(error_class),
            message: &message,
        });
        Self { exit_code, output }
    }
}

fn render(outcome: Outcome<'_>) -> String {
    serde_json::to_string(&outcome).unwrap_or_else(|error| {
        serde_json::json!({
            "command": outcome.command,
            "status": "error",
            "error_class": "serialization",
            "message": error.to_string(),
        })
        .to_string()
    })
}

/// A failed step inside a command, before it is rendered.
#[derive(Debug)]
pub(crate) struct Failure {
    class: &'static str,
    message: String,
    exit_code: u8,
}

impl Failure {
    fn new(class: &'static str, message: impl ToString, exit_code: u8) -> Self {
        Self { class, message: message.to_string(), exit_code }
    }

    fn into_result(self, command: &str) -> CommandResult {
        CommandResult::failure(command, self.class, self.message, self.exit_code)
    }
}

/// Loads the validated config; failure is the shared `config_validation` outcome.
fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        Failure::new("config_validation", format!("configuration issue: {error}"), 2)
            .into_result(command)
    })
}

fn async_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        Failure::new("runtime_init", format!("failed to initialize async runtime: {error}"), 3)
            .into_result(command)
    })
}

async fn connect(config: &AppConfig) -> Result<DbPool, Failure> {
    connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| Failure::new("db_connectivity", error, 4))
}
