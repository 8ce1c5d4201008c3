//! Escalation Scheduler

use alerting::AlertEngine;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Result of one escalation pass
#[derive(Debug, Clone, Default)]
pub struct EscalationReport {
    pub alerts_checked: usize,
    /// (alert id, new level) for every alert that moved up a tier
    pub escalated: Vec<(String, u32)>,
    /// Active alerts whose originating rule is gone
    pub missing_rule: usize,
    pub failed: usize,
}

/// Periodically walks active rule alerts up their rule's escalation policy
pub struct EscalationScheduler {
    engine: AlertEngine,
    interval: Duration,
}

impl EscalationScheduler {
    pub fn new(engine: AlertEngine, interval: Duration) -> Self {
        info!("Escalation scheduler created ({:?} interval)", interval);
        Self { engine, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn tick(&self) -> EscalationReport {
        self.tick_at(Utc::now()).await
    }

    /// Run one pass as of `now`; each alert moves at most one tier
    pub async fn tick_at(&self, now: DateTime<Utc>) -> EscalationReport {
        let mut report = EscalationReport::default();

        for alert in self.engine.manager().active_alerts().await {
            // Manually created alerts have no rule and no policy
            let Some(rule_id) = alert.correlation_id.as_deref() else {
                continue;
            };
            report.alerts_checked += 1;

            let Some(rule) = self.engine.rules().get(rule_id).await else {
                debug!(
                    alert_id = %alert.id,
                    rule = rule_id,
                    "Rule no longer exists, not escalating"
                );
                report.missing_rule += 1;
                continue;
            };

            match self
                .engine
                .manager()
                .escalate(&alert.id, &rule.escalation_policy, now)
                .await
            {
                Ok(Some(escalated)) => report
                    .escalated
                    .push((escalated.id, escalated.escalation_level)),
                Ok(None) => {}
                Err(e) => {
                    // Alert evicted between listing and escalating
                    report.failed += 1;
                    warn!(alert_id = %alert.id, "Escalation failed: {}", e);
                }
            }
        }

        report
    }

    /// Tick every interval until a shutdown signal arrives
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting escalation scheduler");

        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    debug!("Escalation scheduler received shutdown signal");
                    break;
                }

                _ = interval.tick() => {
                    let report = self.tick().await;
                    if !report.escalated.is_empty() {
                        info!(
                            checked = report.alerts_checked,
                            escalated = report.escalated.len(),
                            "Escalation pass complete"
                        );
                    }
                }
            }
        }

        info!("Escalation scheduler stopped");
    }
}
