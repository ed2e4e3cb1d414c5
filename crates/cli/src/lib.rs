pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "exempt",
    about = "Policy exemptions agent operator CLI",
    long_about = "Provision the policy exemptions agent, inspect configuration, and check readiness.",
    after_help = "Examples:\n  exempt provision\n  exempt provision --json\n  exempt doctor --json\n  exempt config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Create the exemptions agent, or update it when an agent id is already stored")]
    Provision {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, endpoints, the OpenAPI tool document, and credentials")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Provision { json } => commands::provision::run(json),
        Command::Config => commands::CommandResult::plain(0, commands::config::run()),
        Command::Doctor { json } => commands::CommandResult::plain(0, commands::doctor::run(json)),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
