use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod config;
mod error;
mod ids;
mod models;
mod notes;
mod notion;
mod pipeline;
mod retry;
mod schedule;
mod store;

use config::RunConfig;
use models::WeekRange;
use notion::NotionClient;
use retry::RetryPolicy;
use store::RetryingStore;

#[derive(Parser)]
#[command(name = "notion-weekly-rollup")]
#[command(
    about = "Rolls EasyFlow daily metrics into the weekly success criteria database",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate one week and upsert its summary row (default)
    Run {
        /// Any date inside the week to aggregate; defaults to today
        #[arg(long)]
        week_of: Option<NaiveDate>,
        /// Step back one week from the selected week
        #[arg(long)]
        previous_week: bool,
        /// Print the summary without writing to Notion
        #[arg(long)]
        dry_run: bool,
    },
    /// Verify the API key and access to both databases
    Check,
    /// List every database shared with the integration
    Databases,
    /// Extract a database id from a Notion URL
    ParseId { url: String },
    /// Keep running and aggregate on a cron schedule
    Schedule {
        #[arg(long, default_value = schedule::DEFAULT_SCHEDULE)]
        cron: String,
    },
}

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

fn connect() -> anyhow::Result<(RunConfig, NotionClient)> {
    let config = RunConfig::from_env()?;
    let client = NotionClient::new(&config).context("failed to build Notion client")?;
    Ok((config, client))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run {
        week_of: None,
        previous_week: false,
        dry_run: false,
    });

    let policy = RetryPolicy::default();

    match command {
        Commands::ParseId { url } => {
            let id = ids::parse_database_id(&url)
                .with_context(|| format!("no Notion database id found in {url}"))?;
            println!("{id}");
        }
        Commands::Run {
            week_of,
            previous_week,
            dry_run,
        } => {
            let (config, client) = connect()?;
            let today = Local::now().date_naive();
            let mut week = WeekRange::containing(week_of.unwrap_or(today));
            if previous_week {
                week = week.previous();
            }

            let store = RetryingStore::new(client, policy);
            if dry_run {
                let summary = pipeline::summarize(&store, &config, week).await?;
                print!("{}", notes::render_summary(&summary));
                println!("Dry run: nothing written.");
                return Ok(());
            }

            let report = pipeline::run(&store, &config, week)
                .await
                .with_context(|| format!("weekly aggregation for {} failed", week.start))?;
            println!(
                "{} weekly entry {} for {} ({} days, tier {}).",
                if report.outcome.created { "Created" } else { "Updated" },
                report.outcome.page_id,
                notes::week_title(report.week),
                report.days_reported,
                report.tier.label()
            );
        }
        Commands::Check => {
            let (config, client) = connect()?;
            for (label, database_id) in [
                ("Daily metrics", &config.source_database_id),
                ("Weekly success criteria", &config.destination_database_id),
            ] {
                let database = retry::with_backoff(&policy, "retrieve_database", || {
                    client.retrieve_database(database_id)
                })
                .await
                .with_context(|| {
                    format!(
                        "cannot access {label} database {database_id}; \
                         share it with the integration"
                    )
                })?;
                println!("{label} database accessible: {} ({})", database.title, database.id);
            }

            let rows = retry::with_backoff(&policy, "probe_query", || {
                client.probe_query(&config.source_database_id)
            })
            .await
            .context("query against the daily metrics database failed")?;
            println!("Query successful - found {rows} entry/entries.");
            println!("All checks passed.");
        }
        Commands::Databases => {
            let (config, client) = connect()?;
            let databases = retry::with_backoff(&policy, "search_databases", || {
                client.search_databases()
            })
            .await
            .context("database search failed")?;

            if databases.is_empty() {
                println!("No databases are shared with this integration.");
                println!("Open each database in Notion, then Connections -> Add connections.");
                return Ok(());
            }

            println!("Found {} accessible database(s):", databases.len());
            for (i, database) in databases.iter().enumerate() {
                println!("{}. {}", i + 1, database.title);
                println!("   ID: {}", database.id);
            }
            println!();
            println!(
                "In use: source {}, destination {}",
                config.source_database_id, config.destination_database_id
            );
        }
        Commands::Schedule { cron } => {
            let cron_schedule = schedule::parse_schedule(&cron)?;
            let (config, client) = connect()?;
            let store = RetryingStore::new(client, policy);
            schedule::run_forever(&store, &config, &cron_schedule).await?;
        }
    }

    Ok(())
}
