//! Rule Evaluation Scheduler

use crate::sources::{MetricCollector, MetricSnapshot};
use alerting::{
    evaluate, is_in_cooldown, AlertEngine, AlertRule, AlertingError, NewAlert, PersistenceChecker,
};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Source label of rule-generated alerts
pub const RULE_ALERT_SOURCE: &str = "alert-rule";

/// What happened to one rule during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// No current value for the rule's metric
    UnknownMetric,
    ConditionNotMet,
    NotPersistent,
    InCooldown,
    /// Alert created, with its id
    Fired(String),
}

/// Result of one evaluation tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub samples_recorded: usize,
    pub rules_evaluated: usize,
    pub rules_skipped: usize,
    pub rules_failed: usize,
    /// Ids of alerts created this tick
    pub alerts_created: Vec<String>,
}

/// Samples producers, records history, and fires alerts for enabled rules
pub struct RuleEvaluationScheduler {
    engine: AlertEngine,
    collector: MetricCollector,
    checker: PersistenceChecker,
    interval: Duration,
}

impl RuleEvaluationScheduler {
    /// Create a scheduler ticking at `interval`
    pub fn new(engine: AlertEngine, collector: MetricCollector, interval: Duration) -> Self {
        info!("Rule evaluation scheduler created ({:?} interval)", interval);
        Self {
            checker: engine.persistence_checker(),
            engine,
            collector,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one tick now
    pub async fn tick(&self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick as of `now`
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        let snapshot = self.collector.collect().await;
        self.record_snapshot(&snapshot, now, &mut report);

        for rule in self.engine.rules().enabled().await {
            report.rules_evaluated += 1;
            match self.evaluate_rule(&rule, &snapshot, now).await {
                Ok(RuleOutcome::Fired(alert_id)) => report.alerts_created.push(alert_id),
                Ok(RuleOutcome::UnknownMetric) => report.rules_skipped += 1,
                Ok(outcome) => debug!(rule = %rule.id, ?outcome, "Rule did not fire"),
                Err(e) => {
                    report.rules_failed += 1;
                    metrics::counter!("alert_engine_rule_evaluation_errors_total").increment(1);
                    error!(rule = %rule.id, "Rule evaluation failed: {}", e);
                }
            }
        }

        report
    }

    fn record_snapshot(
        &self,
        snapshot: &MetricSnapshot,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let history = self.engine.history();
        for (metric, value) in snapshot {
            match history.record(metric, now, *value) {
                Ok(()) => report.samples_recorded += 1,
                Err(e) => warn!(metric = %metric, "Failed to record sample: {}", e),
            }
        }

        if let Err(e) = history.prune(now) {
            warn!("Failed to prune metric history: {}", e);
        }
    }

    /// Evaluate one rule against the current snapshot and create an alert if warranted
    pub async fn evaluate_rule(
        &self,
        rule: &AlertRule,
        snapshot: &MetricSnapshot,
        now: DateTime<Utc>,
    ) -> Result<RuleOutcome, AlertingError> {
        let Some(&value) = snapshot.get(&rule.condition.metric) else {
            warn!(
                rule = %rule.id,
                metric = %rule.condition.metric,
                "No current value for metric, skipping rule"
            );
            return Ok(RuleOutcome::UnknownMetric);
        };

        if !evaluate(&rule.condition, value) {
            return Ok(RuleOutcome::ConditionNotMet);
        }

        if !self.checker.is_persistent(rule, now)? {
            return Ok(RuleOutcome::NotPersistent);
        }

        if is_in_cooldown(rule, now) {
            debug!(rule = %rule.id, "Rule in cooldown");
            return Ok(RuleOutcome::InCooldown);
        }

        let description = if rule.description.is_empty() {
            format!("Current value: {}", value)
        } else {
            format!("{}. Current value: {}", rule.description, value)
        };

        let alert = self
            .engine
            .manager()
            .create_at(
                NewAlert {
                    title: rule.name.clone(),
                    description,
                    severity: rule.severity,
                    category: rule.category,
                    source: RULE_ALERT_SOURCE.to_string(),
                    metrics: [(rule.condition.metric.clone(), value)].into_iter().collect(),
                    correlation_id: Some(rule.id.clone()),
                    channels: rule.notification_channels.clone(),
                },
                now,
            )
            .await;

        if let Err(e) = self.engine.rules().mark_triggered(&rule.id, now).await {
            // Rule removed while the tick was running; the alert stands
            warn!(rule = %rule.id, "Could not record trigger time: {}", e);
        }

        Ok(RuleOutcome::Fired(alert.id))
    }

    /// Tick every interval until a shutdown signal arrives
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting rule evaluation scheduler");

        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    debug!("Rule evaluation scheduler received shutdown signal");
                    break;
                }

                _ = interval.tick() => {
                    let report = self.tick().await;
                    info!(
                        samples = report.samples_recorded,
                        rules = report.rules_evaluated,
                        skipped = report.rules_skipped,
                        failed = report.rules_failed,
                        alerts = report.alerts_created.len(),
                        "Rule evaluation tick complete"
                    );
                }
            }
        }

        info!("Rule evaluation scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::GaugeSet;
    use alerting::{
        Category, Condition, EngineConfig, MemoryNotifier, NewAlertRule, Operator, Severity,
    };
    use chrono::TimeZone;
    use std::sync::Arc;

    struct Fixture {
        engine: AlertEngine,
        gauges: Arc<GaugeSet>,
        scheduler: RuleEvaluationScheduler,
        sink: Arc<MemoryNotifier>,
    }

    fn fixture() -> Fixture {
        let sink = Arc::new(MemoryNotifier::new());
        let engine = AlertEngine::new(
            EngineConfig {
                seed_default_rules: false,
                ..Default::default()
            },
            sink.clone(),
        );
        let gauges = Arc::new(GaugeSet::new("system"));
        let collector = MetricCollector::new(Duration::from_secs(1)).with_source(gauges.clone());
        let scheduler =
            RuleEvaluationScheduler::new(engine.clone(), collector, Duration::from_secs(60));
        Fixture {
            engine,
            gauges,
            scheduler,
            sink,
        }
    }

    fn cpu_rule(cooldown_minutes: u32) -> NewAlertRule {
        NewAlertRule {
            name: "High CPU".into(),
            description: "CPU above 80%".into(),
            category: Category::Performance,
            severity: Severity::Critical,
            condition: Condition {
                metric: "cpu_usage".into(),
                operator: Operator::Gt,
                threshold: 80.0,
                duration_minutes: 5,
                evaluation_window_minutes: 10,
            },
            enabled: true,
            escalation_policy: Default::default(),
            notification_channels: vec!["slack".into()],
            cooldown_minutes,
        }
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
    }

    #[tokio::test]
    async fn test_sustained_breach_fires_with_rule_severity() {
        let f = fixture();
        let rule = f.engine.add_alert_rule(cpu_rule(30)).await.unwrap();
        let history = f.engine.history();
        for (minute, value) in [(0, 85.0), (2, 90.0), (4, 88.0)] {
            history.record("cpu_usage", at(minute), value).unwrap();
        }

        f.gauges.set("cpu_usage", 88.0);
        let report = f.scheduler.tick_at(at(5)).await;

        assert_eq!(report.alerts_created.len(), 1);
        let alert = f.engine.get_alert(&report.alerts_created[0]).await.unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.title, "High CPU");
        assert_eq!(alert.correlation_id.as_deref(), Some(rule.id.as_str()));
        assert_eq!(alert.metrics["cpu_usage"], 88.0);
        assert!(alert.description.contains("88"));
        assert_eq!(alert.timestamp, at(5));
        assert_eq!(f.sink.channels_for(&alert.id), vec!["slack".to_string()]);

        let stored = f.engine.rules().get(&rule.id).await.unwrap();
        assert_eq!(stored.last_triggered, Some(at(5)));
    }

    #[tokio::test]
    async fn test_single_spike_does_not_fire() {
        let f = fixture();
        let rule = f.engine.add_alert_rule(cpu_rule(30)).await.unwrap();

        f.gauges.set("cpu_usage", 95.0);
        let snapshot = f.scheduler.collector.collect().await;
        f.engine.history().record("cpu_usage", at(0), 95.0).unwrap();

        let outcome = f.scheduler.evaluate_rule(&rule, &snapshot, at(0)).await.unwrap();
        assert_eq!(outcome, RuleOutcome::NotPersistent);
        assert!(f.engine.get_active_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_then_allows() {
        let f = fixture();
        f.engine.add_alert_rule(cpu_rule(30)).await.unwrap();
        f.gauges.set("cpu_usage", 90.0);
        let history = f.engine.history();

        // Sampler has been seeing high CPU for a few minutes
        for minute in -4..0 {
            history.record("cpu_usage", at(minute), 90.0).unwrap();
        }
        let first = f.scheduler.tick_at(at(0)).await;
        assert_eq!(first.alerts_created.len(), 1);

        for minute in 1..10 {
            history.record("cpu_usage", at(minute), 90.0).unwrap();
        }
        let suppressed = f.scheduler.tick_at(at(10)).await;
        assert!(suppressed.alerts_created.is_empty());

        for minute in 11..31 {
            history.record("cpu_usage", at(minute), 90.0).unwrap();
        }
        let second = f.scheduler.tick_at(at(31)).await;
        assert_eq!(second.alerts_created.len(), 1);
        assert_eq!(f.engine.get_active_alerts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_metric_skipped_and_other_rules_still_run() {
        let f = fixture();
        let mut orphan = cpu_rule(30);
        orphan.name = "Queue depth".into();
        orphan.condition.metric = "queue.depth".into();
        f.engine.add_alert_rule(orphan).await.unwrap();
        f.engine.add_alert_rule(cpu_rule(30)).await.unwrap();

        f.gauges.set("cpu_usage", 99.0);
        f.scheduler.tick_at(at(0)).await;
        let report = f.scheduler.tick_at(at(1)).await;

        assert_eq!(report.rules_evaluated, 2);
        assert_eq!(report.rules_skipped, 1);
        assert_eq!(report.alerts_created.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_rule_not_evaluated() {
        let f = fixture();
        let rule = f.engine.add_alert_rule(cpu_rule(30)).await.unwrap();
        f.engine.toggle_alert_rule(&rule.id, false).await.unwrap();

        f.gauges.set("cpu_usage", 99.0);
        f.scheduler.tick_at(at(0)).await;
        let report = f.scheduler.tick_at(at(1)).await;

        assert_eq!(report.rules_evaluated, 0);
        assert!(report.alerts_created.is_empty());
        assert_eq!(report.samples_recorded, 1);
    }

    #[tokio::test]
    async fn test_condition_not_met_after_recovery() {
        let f = fixture();
        let rule = f.engine.add_alert_rule(cpu_rule(30)).await.unwrap();

        f.gauges.set("cpu_usage", 40.0);
        let snapshot = f.scheduler.collector.collect().await;
        let outcome = f.scheduler.evaluate_rule(&rule, &snapshot, at(0)).await.unwrap();
        assert_eq!(outcome, RuleOutcome::ConditionNotMet);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_each_interval_until_shutdown() {
        let f = fixture();
        f.gauges.set("cpu_usage", 42.0);
        let (tx, rx) = broadcast::channel(1);
        let scheduler = f.scheduler;

        let task = tokio::spawn(async move { scheduler.run(rx).await });

        // First tick lands one interval after start
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(f.engine.history().len("cpu_usage"), 0);

        // Ticks at 60s and 120s
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(f.engine.history().len("cpu_usage"), 2);

        tx.send(()).unwrap();
        task.await.unwrap();

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(f.engine.history().len("cpu_usage"), 2);
    }
}
