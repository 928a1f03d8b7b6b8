//! Dashboard aggregates. Everything here is a pure read over a slice of applications.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::models::{ApplicationStatus, JobApplication};

#[derive(Debug, Clone, PartialEq)]
pub struct StatusShare {
    pub status: ApplicationStatus,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total: usize,
    /// Applications not yet in a terminal status.
    pub active: usize,
    pub offer_rate: f64,
    pub response_rate: f64,
    pub applied_last_7_days: usize,
    pub applied_last_30_days: usize,
    pub avg_response_days: f64,
    pub counts: BTreeMap<ApplicationStatus, usize>,
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Current-status counts, omitting statuses nobody is in.
pub fn status_counts(apps: &[JobApplication]) -> BTreeMap<ApplicationStatus, usize> {
    let mut counts = BTreeMap::new();
    for app in apps {
        *counts.entry(app.current_status).or_insert(0) += 1;
    }
    counts
}

pub fn status_breakdown(apps: &[JobApplication]) -> Vec<StatusShare> {
    status_counts(apps)
        .into_iter()
        .map(|(status, count)| StatusShare {
            status,
            count,
            percentage: percent(count, apps.len()),
        })
        .collect()
}

/// How applications first moved away from `applied`, by that step's status.
pub fn first_response_breakdown(apps: &[JobApplication]) -> Vec<StatusShare> {
    let mut counts: BTreeMap<ApplicationStatus, usize> = BTreeMap::new();
    for step in apps.iter().filter_map(JobApplication::first_response) {
        *counts.entry(step.status).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(status, count)| StatusShare {
            status,
            count,
            percentage: percent(count, apps.len()),
        })
        .collect()
}

/// Mean days from applying to the first response. Applications that never got
/// one are left out; an empty result is 0.
pub fn average_response_days(apps: &[JobApplication]) -> f64 {
    let waits: Vec<i64> = apps
        .iter()
        .filter_map(|app| {
            app.first_response()
                .map(|step| (step.date - app.date_applied).num_days())
        })
        .collect();
    if waits.is_empty() {
        return 0.0;
    }
    waits.iter().sum::<i64>() as f64 / waits.len() as f64
}

/// Applications dated within the trailing `days` days, today included.
pub fn applied_within(apps: &[JobApplication], today: NaiveDate, days: i64) -> usize {
    apps.iter()
        .filter(|app| {
            let age = (today - app.date_applied).num_days();
            (0..=days).contains(&age)
        })
        .count()
}

pub fn summarize(apps: &[JobApplication], today: NaiveDate) -> Summary {
    let total = apps.len();
    let counts = status_counts(apps);
    let count_where = |pred: fn(ApplicationStatus) -> bool| -> usize {
        counts
            .iter()
            .filter(|(status, _)| pred(**status))
            .map(|(_, n)| n)
            .sum()
    };

    Summary {
        total,
        active: count_where(|s| !s.is_terminal()),
        offer_rate: percent(count_where(ApplicationStatus::is_offer), total),
        response_rate: percent(count_where(ApplicationStatus::is_progressing), total),
        applied_last_7_days: applied_within(apps, today, 7),
        applied_last_30_days: applied_within(apps, today, 30),
        avg_response_days: average_response_days(apps),
        counts,
    }
}

/// Most recently active first. Ties keep their input order.
pub fn sort_by_recent_activity(apps: &[JobApplication]) -> Vec<&JobApplication> {
    let mut sorted: Vec<&JobApplication> = apps.iter().collect();
    sorted.sort_by(|a, b| b.latest_activity().cmp(&a.latest_activity()));
    sorted
}

pub fn recent_applications(apps: &[JobApplication], limit: usize) -> Vec<&JobApplication> {
    let mut sorted: Vec<&JobApplication> = apps.iter().collect();
    sorted.sort_by(|a, b| b.date_applied.cmp(&a.date_applied));
    sorted.truncate(limit);
    sorted
}

pub fn favorites(apps: &[JobApplication], limit: usize) -> Vec<&JobApplication> {
    apps.iter().filter(|app| app.favorite).take(limit).collect()
}

/// Board columns keyed by current status, each most recently active first.
pub fn group_by_status(
    apps: &[JobApplication],
) -> BTreeMap<ApplicationStatus, Vec<&JobApplication>> {
    let mut columns: BTreeMap<ApplicationStatus, Vec<&JobApplication>> = BTreeMap::new();
    for app in sort_by_recent_activity(apps) {
        columns.entry(app.current_status).or_default().push(app);
    }
    columns
}
