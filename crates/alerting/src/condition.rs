//! Condition evaluation, persistence checking, and cooldown gating

use crate::types::{AlertRule, Condition, Operator};
use crate::AlertingError;
use chrono::{DateTime, Duration, Utc};
use metric_history::MetricHistory;
use std::sync::Arc;
use tracing::trace;

/// Minimum samples in the persistence window before a rule may fire
pub const MIN_PERSISTENCE_SAMPLES: usize = 2;

impl Operator {
    /// Compare a value against a threshold
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Gte => value >= threshold,
            Operator::Lt => value < threshold,
            Operator::Lte => value <= threshold,
            Operator::Eq => (value - threshold).abs() < f64::EPSILON,
            Operator::Ne => (value - threshold).abs() >= f64::EPSILON,
            Operator::Unknown => false,
        }
    }
}

impl Condition {
    /// Whether a single value satisfies this condition
    pub fn is_met(&self, value: f64) -> bool {
        self.operator.compare(value, self.threshold)
    }
}

/// Evaluate one sample against one condition
pub fn evaluate(condition: &Condition, value: f64) -> bool {
    condition.is_met(value)
}

/// Whether the rule fired less than `cooldown_minutes` ago
pub fn is_in_cooldown(rule: &AlertRule, now: DateTime<Utc>) -> bool {
    match rule.last_triggered {
        Some(last) => now - last < Duration::minutes(i64::from(rule.cooldown_minutes)),
        None => false,
    }
}

/// Decides whether a rule's condition has held over its persistence window
#[derive(Clone)]
pub struct PersistenceChecker {
    history: Arc<MetricHistory>,
}

impl PersistenceChecker {
    pub fn new(history: Arc<MetricHistory>) -> Self {
        Self { history }
    }

    /// True only if at least two samples exist since `now - duration` and all satisfy the condition
    pub fn is_persistent(
        &self,
        rule: &AlertRule,
        now: DateTime<Utc>,
    ) -> Result<bool, AlertingError> {
        let condition = &rule.condition;
        let cutoff = now - Duration::minutes(i64::from(condition.duration_minutes));
        let samples = self.history.query(&condition.metric, cutoff)?;

        if samples.len() < MIN_PERSISTENCE_SAMPLES {
            trace!(
                rule = %rule.id,
                samples = samples.len(),
                "Not enough samples to establish persistence"
            );
            return Ok(false);
        }

        Ok(samples.iter().all(|s| condition.is_met(s.value)))
    }
}
