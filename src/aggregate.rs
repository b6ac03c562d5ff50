use crate::models::{
    CriteriaStatus, DailyMetricRecord, Tier, WeekRange, WeeklySummaryRecord,
};

/// Running sum and count of the days that reported a value.
#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    total: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.total += value;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.total / self.count as f64)
        }
    }
}

/// Reduces one week of daily rows into the weekly summary.
///
/// Sums treat a missing value as zero; averages only count days that
/// reported the field. MRR is a point-in-time figure, so the value from the
/// most recent reporting day is kept instead of a mean.
pub fn aggregate(week: WeekRange, records: &[DailyMetricRecord]) -> WeeklySummaryRecord {
    let mut new_signups = 0.0;
    let mut workflows_run = Mean::default();
    let mut workflows_created = 0.0;
    let mut active_users_30d = Mean::default();
    let mut activated_users = Mean::default();
    let mut visit_signup_pct = Mean::default();
    let mut activation_rate_pct = Mean::default();
    let mut active_users_7d = Mean::default();
    let mut latest_mrr: Option<(chrono::NaiveDate, f64)> = None;

    for record in records {
        new_signups += record.new_signups.unwrap_or(0.0);
        workflows_created += record.workflows_created.unwrap_or(0.0);
        workflows_run.push(record.workflows_run);
        active_users_30d.push(record.active_users_30d);
        activated_users.push(record.activated_users);
        visit_signup_pct.push(record.visit_signup_pct);
        activation_rate_pct.push(record.activation_rate_pct);
        active_users_7d.push(record.active_users_7d_avg);

        if let Some(mrr) = record.mrr {
            match latest_mrr {
                Some((date, _)) if date >= record.date => {}
                _ => latest_mrr = Some((record.date, mrr)),
            }
        }
    }

    let user_calls_booked = 0;
    let welcome_emails_sent = 0;
    let criteria = calculate_tier(
        new_signups.round() as i64,
        user_calls_booked,
        welcome_emails_sent,
    );

    WeeklySummaryRecord {
        week,
        days_reported: records.len(),
        new_signups_sum: new_signups,
        workflows_run_sum: workflows_run.total,
        workflows_created_sum: workflows_created,
        workflows_run_avg: workflows_run.value(),
        active_users_30d_avg: active_users_30d.value(),
        activated_users_avg: activated_users.value(),
        visit_signup_pct_avg: visit_signup_pct.value(),
        activation_rate_pct_avg: activation_rate_pct.value(),
        active_users_7d_avg: active_users_7d.value(),
        latest_mrr: latest_mrr.map(|(_, mrr)| mrr),
        user_calls_booked,
        welcome_emails_sent,
        criteria,
    }
}

pub fn calculate_tier(signups: i64, calls: u32, emails: u32) -> CriteriaStatus {
    let minimum_met = signups >= 1 || calls >= 1 || emails >= 1;
    let good_met = signups >= 3 && calls >= 2 && emails >= 2;
    let great_met = signups >= 5 && calls >= 5 && emails >= 5;

    let tier = if great_met {
        Tier::Great
    } else if good_met {
        Tier::Good
    } else if minimum_met {
        Tier::Minimum
    } else {
        Tier::BelowMinimum
    };

    CriteriaStatus {
        tier,
        minimum_met,
        good_met,
        great_met,
    }
}
