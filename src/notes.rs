use std::fmt::Write;

use chrono::Datelike;

use crate::models::{WeekRange, WeeklySummaryRecord};

pub fn week_title(week: WeekRange) -> String {
    let monday = week.start;
    let sunday = week.last_day();
    if monday.year() != sunday.year() {
        format!(
            "Week of {}, {} - {}, {}",
            monday.format("%b %d"),
            monday.year(),
            sunday.format("%b %d"),
            sunday.year()
        )
    } else {
        format!(
            "Week of {} - {}, {}",
            monday.format("%b %d"),
            sunday.format("%b %d"),
            monday.year()
        )
    }
}

/// Text stored in the weekly row's notes property.
pub fn build_notes(summary: &WeeklySummaryRecord) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Aggregated from Daily Metrics:");
    let _ = writeln!(output, "- Workflows Run: {}", summary.workflows_run_sum.round() as i64);
    let _ = writeln!(
        output,
        "- Workflows Created: {}",
        summary.workflows_created_sum.round() as i64
    );
    if let Some(mrr) = summary.latest_mrr {
        let _ = writeln!(output, "- MRR: {}", format_currency(mrr));
    }
    if let Some(avg) = summary.active_users_30d_avg {
        let _ = writeln!(output, "- Active Users (30d) Avg: {avg:.2}");
    }
    if let Some(avg) = summary.activated_users_avg {
        let _ = writeln!(output, "- Activated Users Avg: {avg:.2}");
    }

    output
}

/// Console rendering used by dry runs.
pub fn render_summary(summary: &WeeklySummaryRecord) -> String {
    let mut output = String::new();
    let optional = |value: Option<f64>| match value {
        Some(v) => format!("{v:.2}"),
        None => "n/a".to_string(),
    };

    let _ = writeln!(output, "{}", week_title(summary.week));
    let _ = writeln!(output, "Days reported: {}", summary.days_reported);
    let _ = writeln!(output, "New signups: {}", summary.new_signups());
    let _ = writeln!(output, "Workflows run avg: {}", optional(summary.workflows_run_avg));
    let _ = writeln!(
        output,
        "Visit -> signup % avg: {}",
        optional(summary.visit_signup_pct_avg)
    );
    let _ = writeln!(
        output,
        "Activation rate % avg: {}",
        optional(summary.activation_rate_pct_avg)
    );
    let _ = writeln!(
        output,
        "Active users (7d) avg: {}",
        optional(summary.active_users_7d_avg)
    );
    let _ = writeln!(
        output,
        "Tier: {} (minimum {}, good {}, great {})",
        summary.criteria.tier.label(),
        summary.criteria.minimum_met,
        summary.criteria.good_met,
        summary.criteria.great_met
    );
    let _ = writeln!(output);
    output.push_str(&build_notes(summary));

    output
}

fn format_currency(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}${grouped}.{:02}", cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::models::DailyMetricRecord;
    use chrono::NaiveDate;

    fn week_of(y: i32, m: u32, d: u32) -> WeekRange {
        WeekRange::starting(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn title_within_one_year() {
        assert_eq!(
            week_title(week_of(2026, 1, 5)),
            "Week of Jan 05 - Jan 11, 2026"
        );
    }

    #[test]
    fn title_spanning_new_year() {
        assert_eq!(
            week_title(week_of(2025, 12, 29)),
            "Week of Dec 29, 2025 - Jan 04, 2026"
        );
    }

    #[test]
    fn currency_groups_thousands() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(999.5), "$999.50");
        assert_eq!(format_currency(1234.567), "$1,234.57");
        assert_eq!(format_currency(1_000_000.0), "$1,000,000.00");
    }

    #[test]
    fn notes_skip_empty_values() {
        let summary = aggregate(week_of(2026, 1, 5), &[]);
        let notes = build_notes(&summary);
        assert!(notes.contains("- Workflows Run: 0"));
        assert!(notes.contains("- Workflows Created: 0"));
        assert!(!notes.contains("MRR"));
        assert!(!notes.contains("Active Users"));
    }

    #[test]
    fn notes_include_reported_values() {
        let week = week_of(2026, 1, 5);
        let records = vec![DailyMetricRecord {
            date: week.start,
            mrr: Some(2500.0),
            active_users_30d: Some(41.0),
            activated_users: Some(12.5),
            workflows_run: Some(7.0),
            ..Default::default()
        }];
        let notes = build_notes(&aggregate(week, &records));
        assert!(notes.contains("- Workflows Run: 7"));
        assert!(notes.contains("- MRR: $2,500.00"));
        assert!(notes.contains("- Active Users (30d) Avg: 41.00"));
        assert!(notes.contains("- Activated Users Avg: 12.50"));
    }
}
