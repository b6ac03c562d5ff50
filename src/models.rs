use chrono::{Datelike, Duration, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekRange {
    pub fn starting(start: NaiveDate) -> Self {
        Self {
            start,
            end: start + Duration::days(7),
        }
    }

    /// Monday-based week that contains `date`.
    pub fn containing(date: NaiveDate) -> Self {
        let offset = date.weekday().num_days_from_monday() as i64;
        Self::starting(date - Duration::days(offset))
    }

    pub fn previous(self) -> Self {
        Self::starting(self.start - Duration::days(7))
    }

    /// Sunday, the last day inside the window.
    pub fn last_day(&self) -> NaiveDate {
        self.end - Duration::days(1)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyMetricRecord {
    pub date: NaiveDate,
    pub mrr: Option<f64>,
    pub new_signups: Option<f64>,
    pub visit_signup_pct: Option<f64>,
    pub active_users_30d: Option<f64>,
    pub activated_users: Option<f64>,
    pub activation_rate_pct: Option<f64>,
    pub workflows_run: Option<f64>,
    pub workflows_created: Option<f64>,
    pub active_users_7d_avg: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    BelowMinimum,
    Minimum,
    Good,
    Great,
}

impl Tier {
    /// Select option id of this tier in the weekly database.
    pub fn option_id(self) -> &'static str {
        match self {
            Tier::BelowMinimum => "4f784ace-fca1-4da1-9c55-22cb23e08906",
            Tier::Minimum => "2462be85-3662-415e-819f-33b78fa31a8b",
            Tier::Good => "e73e24e5-ae51-4939-891a-9b85c0424cd1",
            Tier::Great => "0244d663-3981-4c07-900e-e654896570b8",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::BelowMinimum => "below minimum",
            Tier::Minimum => "minimum",
            Tier::Good => "good",
            Tier::Great => "great",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriteriaStatus {
    pub tier: Tier,
    pub minimum_met: bool,
    pub good_met: bool,
    pub great_met: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklySummaryRecord {
    pub week: WeekRange,
    pub days_reported: usize,
    pub new_signups_sum: f64,
    pub workflows_run_sum: f64,
    pub workflows_created_sum: f64,
    pub workflows_run_avg: Option<f64>,
    pub active_users_30d_avg: Option<f64>,
    pub activated_users_avg: Option<f64>,
    pub visit_signup_pct_avg: Option<f64>,
    pub activation_rate_pct_avg: Option<f64>,
    pub active_users_7d_avg: Option<f64>,
    pub latest_mrr: Option<f64>,
    pub user_calls_booked: u32,
    pub welcome_emails_sent: u32,
    pub criteria: CriteriaStatus,
}

impl WeeklySummaryRecord {
    pub fn week_start(&self) -> NaiveDate {
        self.week.start
    }

    pub fn new_signups(&self) -> i64 {
        self.new_signups_sum.round() as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub page_id: String,
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub week: WeekRange,
    pub days_reported: usize,
    pub tier: Tier,
    pub outcome: UpsertOutcome,
}

#[derive(Debug, Clone)]
pub struct DatabaseInfo {
    pub id: String,
    pub title: String,
}
