//! Notion REST client for the daily metrics and weekly success databases.
//!
//! Property ids are the URL-encoded ids Notion assigns to each column; pages
//! are matched against either the id or the column name so renaming a column
//! in the UI does not break the rollup.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};

use crate::config::RunConfig;
use crate::error::{Result, StoreError};
use crate::models::{
    DailyMetricRecord, DatabaseInfo, UpsertOutcome, WeekRange, WeeklySummaryRecord,
};
use crate::notes;
use crate::store::MetricsStore;

pub const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;

/// Column ids of the daily metrics database.
pub mod daily {
    pub const DATE: &str = "dIHs";
    pub const MRR: &str = "R%60uR";
    pub const NEW_SIGNUPS: &str = "kvo%3C";
    pub const VISIT_SIGNUP_PCT: &str = "QtVP";
    pub const ACTIVE_USERS_30D: &str = "hp%40%7D";
    pub const ACTIVATED_USERS: &str = "NOQM";
    pub const ACTIVATION_RATE_PCT: &str = "PFsb";
    pub const WORKFLOWS_RUN: &str = "aJMX";
    pub const WORKFLOWS_CREATED: &str = "sTE~";
    pub const ACTIVE_USERS_7D_AVG: &str = "%5B%7B%3FZ";
}

/// Column ids of the weekly success criteria database.
pub mod weekly {
    pub const TITLE: &str = "title";
    pub const WEEK_STARTING: &str = "WikD";
    pub const NEW_SIGNUPS: &str = "~%7BH~";
    pub const USER_CALLS_BOOKED: &str = "Ufki";
    pub const WELCOME_EMAILS_SENT: &str = "GVjV";
    pub const TIER_ACHIEVED: &str = "tk%40n";
    pub const MINIMUM_MET: &str = "N_T%7B";
    pub const GOOD_MET: &str = "%5COm%40";
    pub const GREAT_MET: &str = "%5B%3DDh";
    pub const NOTES: &str = "_Mhj";
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Clone)]
pub struct NotionClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl NotionClient {
    pub fn new(config: &RunConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("notion-weekly-rollup/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        Err(error_from_response(status.as_u16(), retry_after, &body))
    }

    /// Runs a database query across every result page.
    async fn query_all(
        &self,
        database_id: &str,
        filter: Value,
        sorts: Value,
    ) -> Result<Vec<Value>> {
        let path = format!("databases/{database_id}/query");
        drain_pages(|cursor| {
            let mut body = json!({
                "filter": filter,
                "sorts": sorts,
                "page_size": PAGE_SIZE,
            });
            if let Some(cursor) = cursor {
                body["start_cursor"] = Value::String(cursor);
            }
            self.send::<ListResponse>(self.request(Method::POST, &path).json(&body))
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn retrieve_database(&self, database_id: &str) -> Result<DatabaseInfo> {
        let database: Value = self
            .send(self.request(Method::GET, &format!("databases/{database_id}")))
            .await?;
        Ok(database_info(&database))
    }

    /// Issues a single-row query; used to confirm the integration can read rows.
    #[instrument(level = "debug", skip(self))]
    pub async fn probe_query(&self, database_id: &str) -> Result<usize> {
        let page: ListResponse = self
            .send(
                self.request(Method::POST, &format!("databases/{database_id}/query"))
                    .json(&json!({ "page_size": 1 })),
            )
            .await?;
        Ok(page.results.len())
    }

    /// Every database shared with the integration.
    #[instrument(level = "debug", skip(self))]
    pub async fn search_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let results = drain_pages(|cursor| {
            let mut body = json!({
                "filter": { "property": "object", "value": "database" },
                "page_size": PAGE_SIZE,
            });
            if let Some(cursor) = cursor {
                body["start_cursor"] = Value::String(cursor);
            }
            self.send::<ListResponse>(self.request(Method::POST, "search").json(&body))
        })
        .await?;

        Ok(results
            .iter()
            .filter(|result| result.get("object").and_then(Value::as_str) == Some("database"))
            .map(database_info)
            .collect())
    }

    async fn find_week_page(
        &self,
        database_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<String>> {
        let filter = json!({
            "property": weekly::WEEK_STARTING,
            "date": { "equals": week_start.to_string() },
        });
        let pages = self.query_all(database_id, filter, json!([])).await?;

        if pages.len() > 1 {
            warn!(
                %week_start,
                matches = pages.len(),
                "several weekly entries share a week start; updating the first"
            );
        }

        Ok(pages
            .first()
            .and_then(|page| page.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

#[async_trait]
impl MetricsStore for NotionClient {
    #[instrument(level = "info", skip(self, range), fields(start = %range.start, end = %range.end))]
    async fn fetch_records(
        &self,
        database_id: &str,
        range: WeekRange,
    ) -> Result<Vec<DailyMetricRecord>> {
        let filter = json!({
            "and": [
                { "property": daily::DATE, "date": { "on_or_after": range.start.to_string() } },
                { "property": daily::DATE, "date": { "before": range.end.to_string() } },
            ]
        });
        let sorts = json!([{ "property": daily::DATE, "direction": "descending" }]);

        let pages = self.query_all(database_id, filter, sorts).await?;
        let records = collect_daily_records(&pages, range);

        info!(pages = pages.len(), records = records.len(), "fetched daily metrics");
        Ok(records)
    }

    #[instrument(level = "info", skip(self, record), fields(week_start = %record.week_start()))]
    async fn upsert_record(
        &self,
        database_id: &str,
        record: &WeeklySummaryRecord,
    ) -> Result<UpsertOutcome> {
        let existing = self.find_week_page(database_id, record.week_start()).await?;
        let write = WeeklyWrite::plan(database_id, existing, summary_properties(record));

        let page: PageRef = self
            .send(self.request(write.method(), &write.path()).json(&write.body()))
            .await?;
        let outcome = write.outcome(page);
        if outcome.created {
            info!(page_id = %outcome.page_id, "created weekly entry");
        } else {
            info!(page_id = %outcome.page_id, "updated weekly entry");
        }
        Ok(outcome)
    }
}

/// Follows `next_cursor` until the store reports no further pages.
async fn drain_pages<F, Fut>(mut fetch_page: F) -> Result<Vec<Value>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ListResponse>>,
{
    let mut results = Vec::new();
    let mut cursor = None;

    loop {
        let page = fetch_page(cursor.take()).await?;
        results.extend(page.results);

        match (page.has_more, page.next_cursor) {
            (true, Some(next)) => cursor = Some(next),
            _ => break,
        }
    }

    Ok(results)
}

/// Decodes query results, dropping malformed rows and rows dated outside `range`.
fn collect_daily_records(pages: &[Value], range: WeekRange) -> Vec<DailyMetricRecord> {
    let mut records = Vec::with_capacity(pages.len());
    for page in pages {
        match decode_daily_page(page) {
            Ok(record) if range.contains(record.date) => records.push(record),
            Ok(record) => warn!(date = %record.date, "skipping row dated outside the week"),
            Err(err) => warn!(error = %err, "skipping malformed daily metrics row"),
        }
    }
    records
}

/// The write half of an upsert: patch the row found for the week, or create one.
#[derive(Debug)]
enum WeeklyWrite {
    Update {
        page_id: String,
        properties: Map<String, Value>,
    },
    Create {
        database_id: String,
        properties: Map<String, Value>,
    },
}

impl WeeklyWrite {
    fn plan(database_id: &str, existing: Option<String>, properties: Map<String, Value>) -> Self {
        match existing {
            Some(page_id) => WeeklyWrite::Update {
                page_id,
                properties,
            },
            None => WeeklyWrite::Create {
                database_id: database_id.to_string(),
                properties,
            },
        }
    }

    fn method(&self) -> Method {
        match self {
            WeeklyWrite::Update { .. } => Method::PATCH,
            WeeklyWrite::Create { .. } => Method::POST,
        }
    }

    fn path(&self) -> String {
        match self {
            WeeklyWrite::Update { page_id, .. } => format!("pages/{page_id}"),
            WeeklyWrite::Create { .. } => "pages".to_string(),
        }
    }

    fn body(&self) -> Value {
        match self {
            WeeklyWrite::Update { properties, .. } => json!({ "properties": properties }),
            WeeklyWrite::Create {
                database_id,
                properties,
            } => json!({
                "parent": { "database_id": database_id },
                "properties": properties,
            }),
        }
    }

    /// An update keeps the id it was planned with; a create takes the id Notion assigned.
    fn outcome(self, page: PageRef) -> UpsertOutcome {
        match self {
            WeeklyWrite::Update { page_id, .. } => UpsertOutcome {
                page_id,
                created: false,
            },
            WeeklyWrite::Create { .. } => UpsertOutcome {
                page_id: page.id,
                created: true,
            },
        }
    }
}

pub(crate) fn error_from_response(
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> StoreError {
    let ErrorBody { code, message } = serde_json::from_str(body).unwrap_or_default();
    let message = if message.is_empty() {
        format!("HTTP {status}")
    } else {
        message
    };

    match status {
        401 | 403 => StoreError::Auth(message),
        404 => StoreError::NotFound(message),
        429 => StoreError::RateLimited { retry_after },
        // conflict_error: a concurrent edit of the same page; Notion asks for a retry.
        409 | 500 | 502 | 503 | 504 => StoreError::Network(format!("{status} {code}: {message}")),
        _ => StoreError::Api {
            status,
            code,
            message,
        },
    }
}

fn database_info(database: &Value) -> DatabaseInfo {
    let title: String = database
        .get("title")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("plain_text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    DatabaseInfo {
        id: database
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        title: if title.is_empty() {
            "Untitled".to_string()
        } else {
            title
        },
    }
}

fn property<'a>(page: &'a Value, id: &str) -> Option<&'a Value> {
    let properties = page.get("properties")?.as_object()?;
    properties.get(id).or_else(|| {
        properties
            .values()
            .find(|prop| prop.get("id").and_then(Value::as_str) == Some(id))
    })
}

fn number_value(page_id: &str, field: &str, prop: &Value) -> Result<Option<f64>> {
    let kind = prop.get("type").and_then(Value::as_str).unwrap_or_default();
    let (value, inner_kind) = match kind {
        "number" => (prop.get("number"), "number"),
        "formula" | "rollup" => {
            let inner = prop.get(kind);
            let inner_kind = inner
                .and_then(|v| v.get("type"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            (inner.and_then(|v| v.get("number")), inner_kind)
        }
        other => {
            return Err(StoreError::validation(
                page_id,
                format!("{field} has type {other:?}, expected number"),
            ))
        }
    };

    if inner_kind != "number" {
        return Err(StoreError::validation(
            page_id,
            format!("{field} {kind} does not produce a number"),
        ));
    }

    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| StoreError::validation(page_id, format!("{field} is not numeric: {v}"))),
    }
}

fn number_field(page: &Value, page_id: &str, field: &str) -> Result<Option<f64>> {
    match property(page, field) {
        Some(prop) => number_value(page_id, field, prop),
        None => Ok(None),
    }
}

/// Turns a daily metrics page into a record. Absent or empty metrics are
/// missing values; a missing date or a wrongly typed metric rejects the page.
pub fn decode_daily_page(page: &Value) -> Result<DailyMetricRecord> {
    let page_id = page
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("<unknown>");

    let start = property(page, daily::DATE)
        .and_then(|prop| prop.get("date"))
        .and_then(|date| date.get("start"))
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::validation(page_id, "missing date"))?;
    let date = start
        .get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        .ok_or_else(|| StoreError::validation(page_id, format!("unparseable date {start:?}")))?;

    Ok(DailyMetricRecord {
        date,
        mrr: number_field(page, page_id, daily::MRR)?,
        new_signups: number_field(page, page_id, daily::NEW_SIGNUPS)?,
        visit_signup_pct: number_field(page, page_id, daily::VISIT_SIGNUP_PCT)?,
        active_users_30d: number_field(page, page_id, daily::ACTIVE_USERS_30D)?,
        activated_users: number_field(page, page_id, daily::ACTIVATED_USERS)?,
        activation_rate_pct: number_field(page, page_id, daily::ACTIVATION_RATE_PCT)?,
        workflows_run: number_field(page, page_id, daily::WORKFLOWS_RUN)?,
        workflows_created: number_field(page, page_id, daily::WORKFLOWS_CREATED)?,
        active_users_7d_avg: number_field(page, page_id, daily::ACTIVE_USERS_7D_AVG)?,
    })
}

/// Property payload shared by create and update, so both leave the row in
/// the same state.
pub fn summary_properties(record: &WeeklySummaryRecord) -> Map<String, Value> {
    let criteria = record.criteria;
    let mut properties = Map::new();

    properties.insert(
        weekly::TITLE.to_string(),
        json!({ "title": [{ "text": { "content": notes::week_title(record.week) } }] }),
    );
    properties.insert(
        weekly::WEEK_STARTING.to_string(),
        json!({ "date": { "start": record.week_start().to_string() } }),
    );
    properties.insert(
        weekly::NEW_SIGNUPS.to_string(),
        json!({ "number": record.new_signups() }),
    );
    properties.insert(
        weekly::USER_CALLS_BOOKED.to_string(),
        json!({ "number": record.user_calls_booked }),
    );
    properties.insert(
        weekly::WELCOME_EMAILS_SENT.to_string(),
        json!({ "number": record.welcome_emails_sent }),
    );
    properties.insert(
        weekly::TIER_ACHIEVED.to_string(),
        json!({ "select": { "id": criteria.tier.option_id() } }),
    );
    properties.insert(
        weekly::MINIMUM_MET.to_string(),
        json!({ "checkbox": criteria.minimum_met }),
    );
    properties.insert(
        weekly::GOOD_MET.to_string(),
        json!({ "checkbox": criteria.good_met }),
    );
    properties.insert(
        weekly::GREAT_MET.to_string(),
        json!({ "checkbox": criteria.great_met }),
    );
    properties.insert(
        weekly::NOTES.to_string(),
        json!({ "rich_text": [{ "text": { "content": notes::build_notes(record) } }] }),
    );

    properties
}
