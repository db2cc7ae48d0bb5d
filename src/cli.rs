//! Command line interface for inspecting and driving the AI request quota.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use codenexta_quota::{
    format_reset_countdown, format_time_until_reset, Clock, KeyValueStore, QuotaDecision,
    QuotaTracker,
};

#[derive(Parser, Debug)]
#[command(name = "codenexta-quota")]
#[command(about = "Daily AI assistant quota for CodeNexta")]
#[command(version)]
pub struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show usage, remaining requests and time until reset (default)
    Status,
    /// Exit with status 1 if no requests remain
    Check,
    /// Consume one request if any remain
    Record,
    /// Start a fresh window now
    Reset,
}

pub fn run<S: KeyValueStore, C: Clock>(cli: Cli, tracker: &QuotaTracker<S, C>) -> Result<ExitCode> {
    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => {
            let status = tracker.status();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}/{} AI requests remaining", status.remaining, status.limit);
                println!("Resets in {}", format_time_until_reset(tracker.time_until_reset()));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check => {
            let allowed = tracker.is_allowed();
            if cli.json {
                println!("{}", serde_json::json!({ "allowed": allowed }));
            } else if allowed {
                println!("allowed ({} remaining)", tracker.remaining_quota());
            } else {
                println!(
                    "daily limit reached, resets in {}",
                    format_reset_countdown(tracker.time_until_reset())
                );
            }
            Ok(if allowed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Commands::Record => {
            let decision = tracker.try_acquire()?;
            if cli.json {
                println!("{}", serde_json::to_string(&decision)?);
            } else {
                match decision {
                    QuotaDecision::Allowed { remaining } => {
                        println!("recorded, {} remaining", remaining)
                    }
                    QuotaDecision::Denied { .. } => println!(
                        "daily limit reached, resets in {}",
                        format_reset_countdown(tracker.time_until_reset())
                    ),
                }
            }
            Ok(if decision.is_allowed() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Commands::Reset => {
            let record = tracker.reset()?;
            if cli.json {
                println!("{}", serde_json::to_string(&record)?);
            } else {
                println!("quota reset, {} requests available", tracker.daily_limit());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
