use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DailyMetricRecord, UpsertOutcome, WeekRange, WeeklySummaryRecord};
use crate::retry::{self, RetryPolicy};

/// Read/write access to the hosted metric databases.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Daily records whose date falls in `[range.start, range.end)`, all pages
    /// drained. Malformed rows are dropped by the implementation.
    async fn fetch_records(
        &self,
        database_id: &str,
        range: WeekRange,
    ) -> Result<Vec<DailyMetricRecord>>;

    /// Writes `record` keyed by its week-start date: updates the existing row
    /// for that week or creates one.
    ///
    /// A create the server accepted but the client never saw acknowledged
    /// (timeout, 5xx after commit) leaves a row behind. A retry finds it only
    /// if the lookup already reflects that write, so an immediate retry can
    /// still add a second row for the week.
    async fn upsert_record(
        &self,
        database_id: &str,
        record: &WeeklySummaryRecord,
    ) -> Result<UpsertOutcome>;
}

/// Wraps a store so every call is retried on transient failures.
///
/// An upsert is retried as a whole, lookup included, and only after the
/// policy's backoff delay, which gives a lost create time to become visible
/// to the lookup before the write is repeated.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: MetricsStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    #[cfg(test)]
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: MetricsStore> MetricsStore for RetryingStore<S> {
    async fn fetch_records(
        &self,
        database_id: &str,
        range: WeekRange,
    ) -> Result<Vec<DailyMetricRecord>> {
        retry::with_backoff(&self.policy, "fetch_records", || {
            self.inner.fetch_records(database_id, range)
        })
        .await
    }

    async fn upsert_record(
        &self,
        database_id: &str,
        record: &WeeklySummaryRecord,
    ) -> Result<UpsertOutcome> {
        retry::with_backoff(&self.policy, "upsert_record", || {
            self.inner.upsert_record(database_id, record)
        })
        .await
    }
}
