//! Alert Rule Registry

use crate::types::{
    AlertRule, Category, Condition, EscalationLevel, EscalationPolicy, NewAlertRule, Operator,
    Severity,
};
use crate::AlertingError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Default)]
struct RuleSet {
    by_id: HashMap<String, AlertRule>,
    /// Insertion order for listing
    order: Vec<String>,
}

impl RuleSet {
    fn insert(&mut self, rule: AlertRule) {
        if !self.by_id.contains_key(&rule.id) {
            self.order.push(rule.id.clone());
        }
        self.by_id.insert(rule.id.clone(), rule);
    }

    fn ordered(&self) -> impl Iterator<Item = &AlertRule> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }
}

/// Owns every alert rule; all mutation goes through its write lock
pub struct RuleRegistry {
    rules: RwLock<RuleSet>,
}

impl RuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(RuleSet::default()),
        }
    }

    /// Create a registry preloaded with rules
    pub fn with_rules(rules: Vec<AlertRule>) -> Self {
        let mut set = RuleSet::default();
        for rule in rules {
            set.insert(rule);
        }
        info!("Rule registry created with {} rules", set.order.len());
        Self {
            rules: RwLock::new(set),
        }
    }

    /// Validate and add a rule, assigning a fresh id
    pub async fn add(&self, new_rule: NewAlertRule) -> Result<AlertRule, AlertingError> {
        validate(&new_rule)?;

        let rule = new_rule.into_rule(Uuid::new_v4().to_string());
        info!(rule = %rule.id, name = %rule.name, "Alert rule added");
        self.rules.write().await.insert(rule.clone());
        Ok(rule)
    }

    /// All rules in insertion order
    pub async fn list(&self) -> Vec<AlertRule> {
        self.rules.read().await.ordered().cloned().collect()
    }

    /// Enabled rules in insertion order
    pub async fn enabled(&self) -> Vec<AlertRule> {
        self.rules
            .read()
            .await
            .ordered()
            .filter(|r| r.enabled)
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<AlertRule> {
        self.rules.read().await.by_id.get(id).cloned()
    }

    /// Enable or disable a rule
    pub async fn toggle(&self, id: &str, enabled: bool) -> Result<AlertRule, AlertingError> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .by_id
            .get_mut(id)
            .ok_or_else(|| AlertingError::RuleNotFound(id.to_string()))?;

        rule.enabled = enabled;
        info!(rule = %id, enabled, "Alert rule toggled");
        Ok(rule.clone())
    }

    /// Remove a rule; alerts it produced are kept
    pub async fn remove(&self, id: &str) -> Result<AlertRule, AlertingError> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .by_id
            .remove(id)
            .ok_or_else(|| AlertingError::RuleNotFound(id.to_string()))?;
        rules.order.retain(|r| r != id);

        info!(rule = %id, "Alert rule removed");
        Ok(rule)
    }

    /// Record that a rule just produced an alert
    pub async fn mark_triggered(&self, id: &str, now: DateTime<Utc>) -> Result<(), AlertingError> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .by_id
            .get_mut(id)
            .ok_or_else(|| AlertingError::RuleNotFound(id.to_string()))?;

        rule.last_triggered = Some(now);
        debug!(rule = %id, "Rule marked triggered at {}", now);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.rules.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(rule: &NewAlertRule) -> Result<(), AlertingError> {
    if rule.name.trim().is_empty() {
        return Err(AlertingError::InvalidRule("name must not be empty".into()));
    }
    if rule.condition.metric.trim().is_empty() {
        return Err(AlertingError::InvalidRule("condition metric must not be empty".into()));
    }
    if !rule.condition.threshold.is_finite() {
        return Err(AlertingError::InvalidRule("condition threshold must be finite".into()));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn threshold_rule(
    id: &str,
    name: &str,
    description: &str,
    category: Category,
    severity: Severity,
    condition: Condition,
    channels: &[&str],
    escalation: Vec<EscalationLevel>,
) -> AlertRule {
    AlertRule {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        category,
        severity,
        condition,
        enabled: true,
        escalation_policy: EscalationPolicy { levels: escalation },
        notification_channels: channels.iter().map(|c| c.to_string()).collect(),
        cooldown_minutes: 30,
        last_triggered: None,
    }
}

fn condition(metric: &str, operator: Operator, threshold: f64, duration: u32) -> Condition {
    Condition {
        metric: metric.to_string(),
        operator,
        threshold,
        duration_minutes: duration,
        evaluation_window_minutes: duration * 2,
    }
}

fn tier(level: u32, delay_minutes: u32, channels: &[&str]) -> EscalationLevel {
    EscalationLevel {
        level,
        delay_minutes,
        channels: channels.iter().map(|c| c.to_string()).collect(),
        assignees: None,
    }
}

/// Standard platform rules seeded at startup
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        threshold_rule(
            "high-cpu-usage",
            "High CPU Usage",
            "CPU usage above 80% for 5 minutes",
            Category::Performance,
            Severity::Warning,
            condition("cpu.usage", Operator::Gt, 80.0, 5),
            &["slack"],
            vec![tier(1, 15, &["slack"]), tier(2, 30, &["email"])],
        ),
        threshold_rule(
            "high-memory-usage",
            "High Memory Usage",
            "Memory usage above 90% for 5 minutes",
            Category::Performance,
            Severity::Error,
            condition("memory.usage", Operator::Gt, 90.0, 5),
            &["slack", "email"],
            vec![tier(1, 10, &["email"]), tier(2, 30, &["webhook"])],
        ),
        threshold_rule(
            "low-disk-space",
            "Low Disk Space",
            "Disk usage above 85%",
            Category::Availability,
            Severity::Warning,
            condition("disk.usage", Operator::Gt, 85.0, 10),
            &["slack"],
            vec![tier(1, 60, &["email"])],
        ),
        threshold_rule(
            "slow-response-time",
            "Slow Response Time",
            "Average response time above 2000ms for 5 minutes",
            Category::Performance,
            Severity::Warning,
            condition("responses.averageTime", Operator::Gt, 2000.0, 5),
            &["slack"],
            vec![tier(1, 15, &["email"])],
        ),
        threshold_rule(
            "high-error-rate",
            "High Error Rate",
            "Request error rate above 5% for 3 minutes",
            Category::Availability,
            Severity::Error,
            condition("requests.errorRate", Operator::Gt, 5.0, 3),
            &["slack", "email"],
            vec![tier(1, 5, &["email"]), tier(2, 15, &["webhook"])],
        ),
        threshold_rule(
            "health-check-failing",
            "Health Check Failing",
            "Liveness probe reporting an error for 2 minutes",
            Category::Availability,
            Severity::Critical,
            condition("health_status", Operator::Lt, 1.0, 2),
            &["slack", "email", "webhook"],
            vec![tier(1, 0, &["email", "webhook"]), tier(2, 10, &["webhook"])],
        ),
    ]
}
