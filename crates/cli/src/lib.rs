pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::ask::AskOptions;

#[derive(Debug, Parser)]
#[command(
    name = "holdwise",
    about = "Holdwise operator CLI",
    long_about = "Validate model-style SQL, manage the holdings database, and ask questions through the agent runtime.",
    after_help = "Examples:\n  holdwise check-sql \"SELECT name FROM managers\"\n  holdwise migrate\n  holdwise ask \"How many managers filed for 2025-06-30?\" --sql"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the SQL safety validator and print the sanitized statement or the rejection")]
    CheckSql {
        sql: String,
        #[arg(long, help = "Row ceiling to enforce (defaults to agent.max_rows)")]
        max_limit: Option<u32>,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the sample Form 13F dataset")]
    Seed {
        #[arg(long, help = "Replace existing Form 13F rows")]
        reset: bool,
    },
    #[command(about = "Answer one question through the agent and print the outcome as JSON")]
    Ask {
        question: String,
        #[arg(long, help = "Include executed SQL in the outcome")]
        sql: bool,
        #[arg(long, help = "Include rows of the last successful query")]
        rows: bool,
        #[arg(long, help = "API key from auth.api_keys; enables watchlist changes")]
        api_key: Option<String>,
    },
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::CheckSql { sql, max_limit } => commands::check_sql::run(&sql, max_limit),
        Command::Migrate => commands::migrate::run(),
        Command::Seed { reset } => commands::seed::run(reset),
        Command::Ask { question, sql, rows, api_key } => commands::ask::run(
            &question,
            AskOptions { include_sql: sql, include_rows: rows, api_key },
        ),
        Command::Config { json } => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
