//! Alerting Engine
//!
//! Threshold rules over metric history, persistence and cooldown gating,
//! alert lifecycle tracking, escalation, and severity-filtered notification
//! routing.

mod condition;
mod engine;
mod error;
mod manager;
mod notify;
mod rules;
mod settings;
mod summary;
mod types;

pub use condition::{evaluate, is_in_cooldown, PersistenceChecker, MIN_PERSISTENCE_SAMPLES};
pub use engine::AlertEngine;
pub use error::AlertingError;
pub use manager::{AlertLifecycleManager, SYSTEM_ACTOR};
pub use notify::{
    ChannelConfig, Delivery, LogNotifier, MemoryNotifier, NotificationRouter, Notifier, NotifyError,
};
pub use rules::{default_rules, RuleRegistry};
pub use settings::{ConfigError, EngineConfig, LoggingConfig, ServerConfig};
pub use summary::{AlertSummary, SummaryOptions, TopIssue};
pub use types::{
    ActionKind, Alert, AlertAction, AlertRule, AlertStatus, Category, Condition, EscalationLevel,
    EscalationPolicy, NewAlert, NewAlertRule, Operator, Severity,
};

pub use metric_history::{MetricHistory, MetricSample};
