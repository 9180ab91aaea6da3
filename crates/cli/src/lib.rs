pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "cheers",
    about = "Cheers assistant operator CLI",
    long_about = "Operate the Cheers assistant: migrations, config inspection, readiness checks and pending-action expiry.",
    after_help = "Examples:\n  cheers doctor --json\n  cheers migrate --status\n  cheers sweep"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate {
        #[arg(long, help = "Report applied/known migrations without applying anything")]
        status: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model credentials, DB connectivity and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Expire pending actions whose confirmation window has passed")]
    Sweep,
}

impl Command {
    fn execute(self) -> commands::CommandResult {
        match self {
            Self::Migrate { status } => commands::migrate::run(status),
            Self::Config => commands::CommandResult { exit_code: 0, output: commands::config::run() },
            Self::Doctor { json } => commands::doctor::run(json),
            Self::Sweep => commands::sweep::run(),
        }
    }
}

pub fn run() -> ExitCode {
    let result = Cli::parse().command.execute();
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
