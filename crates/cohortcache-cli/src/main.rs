//! cohortcache - inspect resolved data from the command line.
//!
//! Runs one read against the configured base and prints the result, with its
//! degradation metadata, as JSON on stdout. Logs go to stderr.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cohortcache_core::{Config, HttpBackend, NoopInvalidator, Resolver};

const USAGE: &str = "\
Usage: cohortcache <command> [args]

Commands:
  contact <contactId>             Contact profile
  participation <contactId>       Participation records with cohort details
  teams <contactId>               Teams the contact is an active member of
  team <teamId>                   Team with members
  submissions <teamId>            Team submissions
  points <userId>                 Points summary
  rewards                         Reward catalogue
  events [programId]              Upcoming events, or events of one program
  institutions <query>            Institution name search
  partnerships <institutionId>    Institution partnerships
  initiatives                     All initiatives

Configuration is read from the user config directory and overridden by
COHORTCACHE_API_KEY, COHORTCACHE_BASE_ID and COHORTCACHE_BASE_URL.
Set RUST_LOG (e.g. RUST_LOG=cohortcache_core=debug) for logs.";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{}", out);
    Ok(())
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing argument <{}>\n\n{}", name, USAGE))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(());
    };
    if command == "--help" || command == "-h" {
        println!("{}", USAGE);
        return Ok(());
    }

    init_tracing();

    let mut config = Config::load().context("Failed to load configuration")?;
    config.apply_env();
    config.validate()?;

    let backend = HttpBackend::new(&config.api).context("Failed to build HTTP client")?;
    let resolver = Resolver::new(&config, Arc::new(backend), Arc::new(NoopInvalidator));
    info!(command, base = %config.api.base_id, "Running command");

    match command {
        "contact" => print_json(&resolver.get_contact(arg(&args, 1, "contactId")?).await),
        "participation" => {
            print_json(&resolver.get_participation_records(arg(&args, 1, "contactId")?).await)
        }
        "teams" => print_json(&resolver.get_teams_for_contact(arg(&args, 1, "contactId")?).await),
        "team" => print_json(&resolver.get_team(arg(&args, 1, "teamId")?).await),
        "submissions" => print_json(&resolver.get_team_submissions(arg(&args, 1, "teamId")?).await),
        "points" => print_json(&resolver.get_user_points_summary(arg(&args, 1, "userId")?).await),
        "rewards" => print_json(&resolver.list_rewards().await),
        "events" => match args.get(1) {
            Some(program_id) => print_json(&resolver.get_program_events(program_id).await),
            None => print_json(&resolver.get_upcoming_events().await),
        },
        "institutions" => print_json(&resolver.search_institutions(&args[1..].join(" ")).await),
        "partnerships" => print_json(
            &resolver
                .get_institution_partnerships(arg(&args, 1, "institutionId")?)
                .await,
        ),
        "initiatives" => print_json(&resolver.list_initiatives().await),
        other => anyhow::bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}
