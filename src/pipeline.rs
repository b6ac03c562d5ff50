use tracing::{error, info, warn};

use crate::aggregate::aggregate;
use crate::config::RunConfig;
use crate::error::StoreError;
use crate::models::{RunReport, WeekRange, WeeklySummaryRecord};
use crate::store::MetricsStore;

/// Fetch, aggregate and write one week. Any store failure ends the run; the
/// next invocation repeats the same idempotent upsert.
pub async fn run<S: MetricsStore + ?Sized>(
    store: &S,
    config: &RunConfig,
    week: WeekRange,
) -> Result<RunReport, StoreError> {
    info!(start = %week.start, end = %week.last_day(), "starting weekly aggregation");

    let result = execute(store, config, week).await;

    match &result {
        Ok(report) => info!(
            page_id = %report.outcome.page_id,
            created = report.outcome.created,
            days = report.days_reported,
            tier = report.tier.label(),
            "weekly aggregation completed"
        ),
        Err(err) => error!(kind = err.kind(), error = %err, "weekly aggregation failed"),
    }
    result
}

async fn execute<S: MetricsStore + ?Sized>(
    store: &S,
    config: &RunConfig,
    week: WeekRange,
) -> Result<RunReport, StoreError> {
    let summary = summarize(store, config, week).await?;
    let outcome = store
        .upsert_record(&config.destination_database_id, &summary)
        .await?;

    Ok(RunReport {
        week,
        days_reported: summary.days_reported,
        tier: summary.criteria.tier,
        outcome,
    })
}

/// Fetch and aggregate without writing anything.
pub async fn summarize<S: MetricsStore + ?Sized>(
    store: &S,
    config: &RunConfig,
    week: WeekRange,
) -> Result<WeeklySummaryRecord, StoreError> {
    let records = store
        .fetch_records(&config.source_database_id, week)
        .await?;

    if records.is_empty() {
        warn!(start = %week.start, "no daily metrics for this week; writing a zero-valued summary");
    }

    let summary = aggregate(week, &records);
    info!(
        days = summary.days_reported,
        new_signups = summary.new_signups(),
        workflows_run = summary.workflows_run_sum,
        tier = summary.criteria.tier.label(),
        "aggregated daily metrics"
    );
    Ok(summary)
}
