//! `cheers doctor`: readiness checks an operator runs before starting the server.

use cheers_core::config::{AppConfig, LoadOptions};
use cheers_db::{migrations, DbPool};
use serde::Serialize;

use crate::commands::{async_runtime, connect, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Verdict {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    status: Verdict,
    details: String,
}

impl Check {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: Verdict::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: Verdict::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: Verdict::Skipped, details: format!("skipped: {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    overall_status: Verdict,
    checks: Vec<Check>,
}

/// Exit code 0 when every check passes, 1 otherwise.
pub fn run(json_output: bool) -> CommandResult {
    let checks = collect_checks();
    let passed = checks.iter().all(|check| check.status == Verdict::Pass);
    let report = Report { overall_status: if passed { Verdict::Pass } else { Verdict::Fail }, checks };

    let output = if json_output {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => json,
            Err(error) => {
                return CommandResult::failure("doctor", "serialization", error.to_string(), 3)
            }
        }
    } else {
        render_text(&report)
    };
    CommandResult { exit_code: if passed { 0 } else { 1 }, output }
}

fn collect_checks() -> Vec<Check> {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            let reason = "configuration did not load";
            return vec![
                Check::fail("config_validation", error.to_string()),
                Check::skipped("llm_credentials", reason),
                Check::skipped("database_connectivity", reason),
                Check::skipped("schema_migrations", reason),
            ];
        }
    };

    let mut checks = vec![
        Check::pass("config_validation", "configuration loaded and validated"),
        llm_check(&config),
    ];
    checks.extend(database_checks(&config));
    checks
}

/// Offline mode is an explicit operator choice, so it passes with a note.
fn llm_check(config: &AppConfig) -> Check {
    if config.llm.offline {
        Check::pass("llm_credentials", "offline mode: chat requests will be refused")
    } else {
        Check::pass("llm_credentials", format!("api key configured for {}", config.llm.base_url))
    }
}

fn database_checks(config: &AppConfig) -> Vec<Check> {
    let runtime = match async_runtime("doctor") {
        Ok(runtime) => runtime,
        Err(failure) => {
            return vec![
                Check::fail("database_connectivity", failure.output),
                Check::skipped("schema_migrations", "no async runtime"),
            ]
        }
    };

    runtime.block_on(async {
        let pool = match connect(config).await {
            Ok(pool) => pool,
            Err(failure) => {
                return vec![
                    Check::fail("database_connectivity", failure.message),
                    Check::skipped("schema_migrations", "database unreachable"),
                ];
            }
        };
        let checks = vec![
            Check::pass("database_connectivity", format!("connected to {}", config.database.url)),
            schema_check(&pool).await,
        ];
        pool.close().await;
        checks
    })
}

async fn schema_check(pool: &DbPool) -> Check {
    match migrations::status(pool).await {
        Ok((known, applied)) if applied >= known => {
            Check::pass("schema_migrations", format!("all {known} migrations applied"))
        }
        Ok((known, applied)) => Check::fail(
            "schema_migrations",
            format!("{applied} of {known} migrations applied; run `cheers migrate`"),
        ),
        Err(error) => Check::fail("schema_migrations", format!("migration state unreadable: {error}")),
    }
}

fn render_text(report: &Report) -> String {
    let headline = match report.overall_status {
        Verdict::Pass => "doctor: ready",
        _ => "doctor: not ready",
    };
    std::iter::once(headline.to_string())
        .chain(report.checks.iter().map(|check| {
            let marker = match check.status {
                Verdict::Pass => "ok",
                Verdict::Fail => "fail",
                Verdict::Skipped => "skip",
            };
            format!("- [{marker}] {}: {}", check.name, check.details)
        }))
        .collect::<Vec<_>>()
        .join("\n")
}
