//! In-process weekly trigger for hosts without an external cron.
//! Runs are sequential: the next tick is computed only after the current run returns.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use cron::Schedule;
use tracing::{error, info};

use crate::config::RunConfig;
use crate::models::WeekRange;
use crate::pipeline;
use crate::store::MetricsStore;

/// Fridays at 08:00 local time (sec min hour day-of-month month day-of-week).
pub const DEFAULT_SCHEDULE: &str = "0 0 8 * * Fri";

pub fn parse_schedule(expression: &str) -> anyhow::Result<Schedule> {
    Schedule::from_str(expression)
        .with_context(|| format!("invalid cron expression '{expression}'"))
}

pub async fn run_forever<S: MetricsStore>(
    store: &S,
    config: &RunConfig,
    schedule: &Schedule,
) -> anyhow::Result<()> {
    info!("weekly scheduler started");

    loop {
        let now = Local::now();
        let next = schedule
            .after(&now)
            .next()
            .context("cron expression has no upcoming run")?;
        let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
        info!(next_run = %next.format("%Y-%m-%d %H:%M:%S %:z"), "waiting for next run");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("scheduler stopped by user");
                return Ok(());
            }
        }

        let week = WeekRange::containing(Local::now().date_naive());
        if let Err(err) = pipeline::run(store, config, week).await {
            error!(kind = err.kind(), error = %err, "scheduled run failed; waiting for next tick");
        }
    }
}
