//! Alert and Rule Data Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Alert severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

/// Alert category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Performance,
    Availability,
    Security,
    Business,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Performance,
        Category::Availability,
        Category::Security,
        Category::Business,
    ];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Performance => "performance",
            Category::Availability => "availability",
            Category::Security => "security",
            Category::Business => "business",
        }
    }
}

/// Alert lifecycle status
///
/// `Active -> Acknowledged -> Resolved` or `Active -> Resolved`.
/// `Resolved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub const ALL: [AlertStatus; 3] = [
        AlertStatus::Active,
        AlertStatus::Acknowledged,
        AlertStatus::Resolved,
    ];
}

/// Kind of entry in an alert's action log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Created,
    Acknowledged,
    Escalated,
    Resolved,
    Commented,
}

/// One entry of the append-only action log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertAction {
    pub timestamp: DateTime<Utc>,
    pub kind: ActionKind,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AlertAction {
    pub fn new(timestamp: DateTime<Utc>, kind: ActionKind, actor: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind,
            actor: actor.into(),
            comment: None,
            metadata: None,
        }
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A tracked alert
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub category: Category,
    pub title: String,
    pub description: String,
    pub source: String,
    /// Metric values at creation time
    pub metrics: BTreeMap<String, f64>,
    pub status: AlertStatus,
    pub assigned_to: Option<String>,
    pub escalation_level: u32,
    /// Id of the rule that produced this alert, if any
    pub correlation_id: Option<String>,
    actions: Vec<AlertAction>,
}

impl Alert {
    pub(crate) fn new(id: String, timestamp: DateTime<Utc>, new: NewAlert) -> Self {
        Self {
            id,
            timestamp,
            severity: new.severity,
            category: new.category,
            title: new.title,
            description: new.description,
            source: new.source,
            metrics: new.metrics,
            status: AlertStatus::Active,
            assigned_to: None,
            escalation_level: 0,
            correlation_id: new.correlation_id,
            actions: Vec::new(),
        }
    }

    /// Action log in insertion order
    pub fn actions(&self) -> &[AlertAction] {
        &self.actions
    }

    /// Most recent action, if any
    pub fn last_action(&self) -> Option<&AlertAction> {
        self.actions.last()
    }

    pub(crate) fn push_action(&mut self, action: AlertAction) {
        self.actions.push(action);
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

/// Input for creating an alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlert {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub category: Category,
    pub source: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// Channels for the initial notification; empty means every channel
    #[serde(default)]
    pub channels: Vec<String>,
}

/// Comparison operator of a rule condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
    /// Any unrecognised operator; never matches
    #[serde(other)]
    Unknown,
}

/// Threshold condition of a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub metric: String,
    pub operator: Operator,
    pub threshold: f64,
    /// Minutes the condition must hold before firing
    pub duration_minutes: u32,
    pub evaluation_window_minutes: u32,
}

/// One delay-triggered notification tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationLevel {
    pub level: u32,
    /// Minutes after alert creation
    pub delay_minutes: u32,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub assignees: Option<Vec<String>>,
}

/// Ordered escalation tiers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    #[serde(default)]
    pub levels: Vec<EscalationLevel>,
}

impl EscalationPolicy {
    /// First tier whose number equals `level`, in declaration order
    pub fn level(&self, level: u32) -> Option<&EscalationLevel> {
        self.levels.iter().find(|l| l.level == level)
    }
}

/// A threshold rule with its escalation and notification policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub severity: Severity,
    pub condition: Condition,
    pub enabled: bool,
    #[serde(default)]
    pub escalation_policy: EscalationPolicy,
    #[serde(default)]
    pub notification_channels: Vec<String>,
    pub cooldown_minutes: u32,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
}

/// Input for adding a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlertRule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    pub severity: Severity,
    pub condition: Condition,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub escalation_policy: EscalationPolicy,
    #[serde(default)]
    pub notification_channels: Vec<String>,
    #[serde(default = "default_cooldown")]
    pub cooldown_minutes: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_cooldown() -> u32 {
    30
}

impl NewAlertRule {
    pub(crate) fn into_rule(self, id: String) -> AlertRule {
        AlertRule {
            id,
            name: self.name,
            description: self.description,
            category: self.category,
            severity: self.severity,
            condition: self.condition,
            enabled: self.enabled,
            escalation_policy: self.escalation_policy,
            notification_channels: self.notification_channels,
            cooldown_minutes: self.cooldown_minutes,
            last_triggered: None,
        }
    }
}
