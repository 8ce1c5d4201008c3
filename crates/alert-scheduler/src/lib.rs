//! Alert Schedulers
//!
//! Two periodic loops over the alert engine:
//! - rule evaluation (default every minute): sample metric producers, record
//!   history, fire alerts for persistent conditions outside cooldown
//! - escalation (default every five minutes): advance unacknowledged alerts
//!   through their rule's escalation tiers

mod escalation;
mod evaluation;
mod handle;
mod sources;

pub use escalation::{EscalationReport, EscalationScheduler};
pub use evaluation::{RuleEvaluationScheduler, RuleOutcome, TickReport, RULE_ALERT_SOURCE};
pub use handle::SchedulerHandle;
pub use sources::{
    GaugeSet, HealthProbe, HealthStatus, MetricCollector, MetricSnapshot, MetricsSource,
    SourceError, StaticProbe, HEALTH_STATUS_METRIC,
};
