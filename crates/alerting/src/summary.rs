//! Alert Summary

use crate::types::{Alert, AlertStatus, Category, Severity};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Tunables for summary construction
#[derive(Debug, Clone, Copy)]
pub struct SummaryOptions {
    /// Maximum number of recent alerts
    pub recent_limit: usize,
    /// Only alerts created within this many hours count as recent
    pub recent_window_hours: u32,
    /// Maximum number of top issues
    pub top_issue_limit: usize,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            recent_limit: 10,
            recent_window_hours: 24,
            top_issue_limit: 5,
        }
    }
}

/// A severity bucket and how many alerts fell into it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopIssue {
    pub severity: Severity,
    pub count: usize,
}

/// Aggregate view over all retained alerts
#[derive(Debug, Clone, Serialize)]
pub struct AlertSummary {
    pub total: usize,
    pub by_status: BTreeMap<AlertStatus, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_category: BTreeMap<Category, usize>,
    /// Newest first
    pub recent_alerts: Vec<Alert>,
    pub top_issues: Vec<TopIssue>,
}

impl AlertSummary {
    /// Build a summary from alerts in any order
    pub fn build<'a, I>(alerts: I, now: DateTime<Utc>, options: SummaryOptions) -> Self
    where
        I: IntoIterator<Item = &'a Alert>,
    {
        let mut by_status: BTreeMap<_, _> = AlertStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut by_severity: BTreeMap<_, _> = Severity::ALL.iter().map(|s| (*s, 0)).collect();
        let mut by_category: BTreeMap<_, _> = Category::ALL.iter().map(|c| (*c, 0)).collect();
        let mut recent: Vec<&Alert> = Vec::new();
        let mut total = 0;

        let recent_cutoff = now - Duration::hours(i64::from(options.recent_window_hours));

        for alert in alerts {
            total += 1;
            *by_status.entry(alert.status).or_insert(0) += 1;
            *by_severity.entry(alert.severity).or_insert(0) += 1;
            *by_category.entry(alert.category).or_insert(0) += 1;

            if alert.timestamp >= recent_cutoff {
                recent.push(alert);
            }
        }

        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(options.recent_limit);

        // Severity buckets by count, most severe first on ties
        let mut top_issues: Vec<TopIssue> = by_severity
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(severity, count)| TopIssue {
                severity: *severity,
                count: *count,
            })
            .collect();
        top_issues.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| b.severity.cmp(&a.severity))
        });
        top_issues.truncate(options.top_issue_limit);

        Self {
            total,
            by_status,
            by_severity,
            by_category,
            recent_alerts: recent.into_iter().cloned().collect(),
            top_issues,
        }
    }

    pub fn count_status(&self, status: AlertStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn count_severity(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }
}
