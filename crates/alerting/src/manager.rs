//! Alert Lifecycle Manager
//!
//! Owns every alert. Each mutation re-validates the alert's status under the
//! write lock, so an acknowledgement racing an escalation tick cannot lose
//! either update. Notifications go out after the lock is released.

use crate::notify::NotificationRouter;
use crate::summary::{AlertSummary, SummaryOptions};
use crate::types::{ActionKind, Alert, AlertAction, AlertStatus, EscalationPolicy, NewAlert};
use crate::AlertingError;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Actor recorded for engine-initiated actions
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Default)]
struct AlertStore {
    by_id: HashMap<String, Alert>,
    /// Creation order
    order: Vec<String>,
}

impl AlertStore {
    fn ordered(&self) -> impl Iterator<Item = &Alert> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Alert, AlertingError> {
        self.by_id
            .get_mut(id)
            .ok_or_else(|| AlertingError::AlertNotFound(id.to_string()))
    }

    /// Evict the oldest resolved alerts once over capacity
    fn enforce_retention(&mut self, max: usize) {
        if self.order.len() <= max {
            return;
        }

        let mut excess = self.order.len() - max;
        let by_id = &mut self.by_id;
        self.order.retain(|id| {
            if excess == 0 {
                return true;
            }
            match by_id.get(id) {
                Some(alert) if alert.status == AlertStatus::Resolved => {
                    by_id.remove(id);
                    excess -= 1;
                    false
                }
                _ => true,
            }
        });
    }

    fn active_count(&self) -> usize {
        self.by_id.values().filter(|a| a.is_active()).count()
    }
}

/// Create, acknowledge, resolve, comment on and escalate alerts
pub struct AlertLifecycleManager {
    alerts: RwLock<AlertStore>,
    router: Arc<NotificationRouter>,
    max_retained: usize,
    summary_options: SummaryOptions,
}

impl AlertLifecycleManager {
    /// Create a manager delivering through the given router
    pub fn new(
        router: Arc<NotificationRouter>,
        max_retained: usize,
        summary_options: SummaryOptions,
    ) -> Self {
        info!("Creating alert lifecycle manager (retaining up to {} alerts)", max_retained);
        Self {
            alerts: RwLock::new(AlertStore::default()),
            router,
            max_retained,
            summary_options,
        }
    }

    pub fn router(&self) -> &Arc<NotificationRouter> {
        &self.router
    }

    /// Create an alert now
    pub async fn create(&self, new_alert: NewAlert) -> Alert {
        self.create_at(new_alert, Utc::now()).await
    }

    /// Create an ACTIVE alert stamped with `now` and send the initial notification
    pub async fn create_at(&self, new_alert: NewAlert, now: DateTime<Utc>) -> Alert {
        let channels = new_alert.channels.clone();
        let mut alert = Alert::new(Uuid::new_v4().to_string(), now, new_alert);
        alert.push_action(AlertAction::new(now, ActionKind::Created, SYSTEM_ACTOR));

        let active = {
            let mut store = self.alerts.write().await;
            store.order.push(alert.id.clone());
            store.by_id.insert(alert.id.clone(), alert.clone());
            store.enforce_retention(self.max_retained);
            store.active_count()
        };

        metrics::counter!(
            "alert_engine_alerts_created_total",
            "severity" => alert.severity.as_str()
        )
        .increment(1);
        metrics::gauge!("alert_engine_active_alerts").set(active as f64);
        info!(
            alert_id = %alert.id,
            severity = alert.severity.as_str(),
            rule = alert.correlation_id.as_deref().unwrap_or("-"),
            "Alert created: {}",
            alert.title
        );

        if channels.is_empty() {
            self.router.broadcast(&alert).await;
        } else {
            self.router.send(&alert, &channels, None).await;
        }

        alert
    }

    /// Move an ACTIVE alert to ACKNOWLEDGED and assign it to `user`
    ///
    /// Any other status leaves the alert untouched.
    pub async fn acknowledge(
        &self,
        id: &str,
        user: &str,
        comment: Option<String>,
    ) -> Result<Alert, AlertingError> {
        let (alert, active) = {
            let mut store = self.alerts.write().await;
            let alert = store.get_mut(id)?;

            if alert.status != AlertStatus::Active {
                warn!(
                    alert_id = %id,
                    status = ?alert.status,
                    "Acknowledge ignored: alert is not active"
                );
                return Ok(alert.clone());
            }

            alert.status = AlertStatus::Acknowledged;
            alert.assigned_to = Some(user.to_string());
            alert.push_action(
                AlertAction::new(Utc::now(), ActionKind::Acknowledged, user).with_comment(comment),
            );
            let alert = alert.clone();
            (alert, store.active_count())
        };

        metrics::gauge!("alert_engine_active_alerts").set(active as f64);
        info!(alert_id = %id, user, "Alert acknowledged");
        Ok(alert)
    }

    /// Resolve an ACTIVE or ACKNOWLEDGED alert; RESOLVED alerts are returned unchanged
    pub async fn resolve(
        &self,
        id: &str,
        user: &str,
        comment: Option<String>,
    ) -> Result<Alert, AlertingError> {
        let (alert, active) = {
            let mut store = self.alerts.write().await;
            let alert = store.get_mut(id)?;

            if alert.status == AlertStatus::Resolved {
                warn!(alert_id = %id, "Resolve ignored: alert already resolved");
                return Ok(alert.clone());
            }

            alert.status = AlertStatus::Resolved;
            alert.push_action(
                AlertAction::new(Utc::now(), ActionKind::Resolved, user).with_comment(comment),
            );
            let alert = alert.clone();
            (alert, store.active_count())
        };

        metrics::gauge!("alert_engine_active_alerts").set(active as f64);
        info!(alert_id = %id, user, "Alert resolved");
        Ok(alert)
    }

    /// Append a comment in any status
    pub async fn comment(&self, id: &str, user: &str, text: &str) -> Result<Alert, AlertingError> {
        let mut store = self.alerts.write().await;
        let alert = store.get_mut(id)?;
        alert.push_action(
            AlertAction::new(Utc::now(), ActionKind::Commented, user)
                .with_comment(Some(text.to_string())),
        );
        debug!(alert_id = %id, user, "Comment added");
        Ok(alert.clone())
    }

    /// Advance an ACTIVE alert to its next escalation tier if that tier's delay has elapsed
    ///
    /// Returns the escalated alert, or `None` when nothing changed (alert not
    /// active, no next tier defined, or delay not yet reached).
    pub async fn escalate(
        &self,
        id: &str,
        policy: &EscalationPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, AlertingError> {
        let (alert, channels, level) = {
            let mut store = self.alerts.write().await;
            let alert = store.get_mut(id)?;

            if alert.status != AlertStatus::Active {
                return Ok(None);
            }

            let target = alert.escalation_level + 1;
            let Some(tier) = policy.level(target) else {
                return Ok(None);
            };

            if now - alert.timestamp < Duration::minutes(i64::from(tier.delay_minutes)) {
                return Ok(None);
            }

            alert.escalation_level = target;
            alert.push_action(
                AlertAction::new(now, ActionKind::Escalated, SYSTEM_ACTOR).with_metadata(json!({
                    "level": target,
                    "channels": tier.channels,
                    "assignees": tier.assignees,
                })),
            );
            (alert.clone(), tier.channels.clone(), target)
        };

        metrics::counter!("alert_engine_escalations_total").increment(1);
        warn!(alert_id = %id, level, "Alert escalated: {}", alert.title);

        self.router.send(&alert, &channels, Some(level)).await;
        Ok(Some(alert))
    }

    pub async fn get(&self, id: &str) -> Option<Alert> {
        self.alerts.read().await.by_id.get(id).cloned()
    }

    /// ACTIVE alerts in creation order
    pub async fn active_alerts(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .await
            .ordered()
            .filter(|a| a.is_active())
            .cloned()
            .collect()
    }

    /// Every retained alert in creation order
    pub async fn all_alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.ordered().cloned().collect()
    }

    /// Summary at `now`
    pub async fn summary_at(&self, now: DateTime<Utc>) -> AlertSummary {
        let store = self.alerts.read().await;
        AlertSummary::build(store.ordered(), now, self.summary_options)
    }

    pub async fn summary(&self) -> AlertSummary {
        self.summary_at(Utc::now()).await
    }

    pub async fn len(&self) -> usize {
        self.alerts.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelConfig, MemoryNotifier};
    use crate::types::{Category, EscalationLevel, Severity};
    use chrono::TimeZone;
    use std::time::Duration as StdDuration;

    fn setup() -> (AlertLifecycleManager, Arc<MemoryNotifier>) {
        let sink = Arc::new(MemoryNotifier::new());
        let router = NotificationRouter::new(StdDuration::from_secs(1))
            .with_channel(ChannelConfig::new("slack", &Severity::ALL), sink.clone())
            .with_channel(ChannelConfig::new("email", &Severity::ALL), sink.clone())
            .with_channel(ChannelConfig::new("pager", &Severity::ALL), sink.clone());
        let manager = AlertLifecycleManager::new(Arc::new(router), 100, SummaryOptions::default());
        (manager, sink)
    }

    fn new_alert(channels: &[&str]) -> NewAlert {
        NewAlert {
            title: "High CPU".into(),
            description: "cpu at 91".into(),
            severity: Severity::Error,
            category: Category::Performance,
            source: "alert-rule".into(),
            metrics: [("cpu.usage".to_string(), 91.0)].into_iter().collect(),
            correlation_id: Some("rule-1".into()),
            channels: channels.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn policy() -> EscalationPolicy {
        EscalationPolicy {
            levels: vec![
                EscalationLevel {
                    level: 1,
                    delay_minutes: 0,
                    channels: vec!["email".into()],
                    assignees: None,
                },
                EscalationLevel {
                    level: 2,
                    delay_minutes: 15,
                    channels: vec!["pager".into()],
                    assignees: Some(vec!["oncall".into()]),
                },
            ],
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_sets_initial_state() {
        let (manager, sink) = setup();
        let alert = manager.create_at(new_alert(&["slack"]), t0()).await;

        assert_eq!(alert.status, AlertStatus::Active);
        assert_eq!(alert.escalation_level, 0);
        assert_eq!(alert.timestamp, t0());
        assert_eq!(alert.actions().len(), 1);
        assert_eq!(alert.actions()[0].kind, ActionKind::Created);
        assert_eq!(sink.channels_for(&alert.id), vec!["slack".to_string()]);
    }

    #[tokio::test]
    async fn test_create_without_channels_broadcasts() {
        let (manager, sink) = setup();
        let alert = manager.create(new_alert(&[])).await;
        assert_eq!(sink.channels_for(&alert.id).len(), 3);
    }

    #[tokio::test]
    async fn test_acknowledge_then_resolve() {
        let (manager, _) = setup();
        let alert = manager.create(new_alert(&["slack"])).await;

        let acked = manager
            .acknowledge(&alert.id, "alice", Some("looking".into()))
            .await
            .unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(acked.assigned_to.as_deref(), Some("alice"));
        assert_eq!(acked.last_action().unwrap().comment.as_deref(), Some("looking"));

        let resolved = manager.resolve(&alert.id, "alice", None).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.actions().len(), 3);

        // Terminal: nothing changes afterwards
        let again = manager.acknowledge(&alert.id, "bob", None).await.unwrap();
        assert_eq!(again.status, AlertStatus::Resolved);
        assert_eq!(again.assigned_to.as_deref(), Some("alice"));
        let again = manager.resolve(&alert.id, "bob", None).await.unwrap();
        assert_eq!(again.actions().len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_directly_from_active() {
        let (manager, _) = setup();
        let alert = manager.create(new_alert(&["slack"])).await;

        let resolved = manager.resolve(&alert.id, "bob", None).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.last_action().unwrap().kind, ActionKind::Resolved);
        assert!(manager.active_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_acknowledge_twice_is_noop() {
        let (manager, _) = setup();
        let alert = manager.create(new_alert(&["slack"])).await;

        manager.acknowledge(&alert.id, "alice", None).await.unwrap();
        let second = manager.acknowledge(&alert.id, "bob", None).await.unwrap();
        assert_eq!(second.assigned_to.as_deref(), Some("alice"));
        assert_eq!(second.actions().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_id_not_found() {
        let (manager, _) = setup();
        assert!(matches!(
            manager.acknowledge("nope", "alice", None).await,
            Err(AlertingError::AlertNotFound(_))
        ));
        assert!(matches!(
            manager.resolve("nope", "alice", None).await,
            Err(AlertingError::AlertNotFound(_))
        ));
        assert!(manager.comment("nope", "alice", "hi").await.is_err());
    }

    #[tokio::test]
    async fn test_comment_allowed_after_resolve() {
        let (manager, _) = setup();
        let alert = manager.create(new_alert(&["slack"])).await;
        manager.resolve(&alert.id, "alice", None).await.unwrap();

        let commented = manager.comment(&alert.id, "bob", "postmortem filed").await.unwrap();
        assert_eq!(commented.status, AlertStatus::Resolved);
        assert_eq!(commented.last_action().unwrap().kind, ActionKind::Commented);
    }

    #[tokio::test]
    async fn test_escalation_walks_tiers_one_step_per_call() {
        let (manager, sink) = setup();
        let alert = manager.create_at(new_alert(&["slack"]), t0()).await;
        let policy = policy();

        let at16 = t0() + Duration::minutes(16);
        let first = manager.escalate(&alert.id, &policy, at16).await.unwrap().unwrap();
        assert_eq!(first.escalation_level, 1);
        let second = manager.escalate(&alert.id, &policy, at16).await.unwrap().unwrap();
        assert_eq!(second.escalation_level, 2);
        assert!(manager.escalate(&alert.id, &policy, at16).await.unwrap().is_none());

        let last = second.last_action().unwrap();
        assert_eq!(last.kind, ActionKind::Escalated);
        assert_eq!(last.metadata.as_ref().unwrap()["level"], 2);
        assert_eq!(
            sink.channels_for(&alert.id),
            vec!["slack".to_string(), "email".to_string(), "pager".to_string()]
        );
    }

    #[tokio::test]
    async fn test_escalation_waits_for_delay() {
        let (manager, _) = setup();
        let alert = manager.create_at(new_alert(&["slack"]), t0()).await;
        let policy = policy();

        let at5 = t0() + Duration::minutes(5);
        manager.escalate(&alert.id, &policy, at5).await.unwrap();
        assert!(manager.escalate(&alert.id, &policy, at5).await.unwrap().is_none());
        assert_eq!(manager.get(&alert.id).await.unwrap().escalation_level, 1);
    }

    #[tokio::test]
    async fn test_acknowledged_alert_never_escalates() {
        let (manager, _) = setup();
        let alert = manager.create_at(new_alert(&["slack"]), t0()).await;
        manager.acknowledge(&alert.id, "alice", None).await.unwrap();

        let late = t0() + Duration::minutes(120);
        assert!(manager.escalate(&alert.id, &policy(), late).await.unwrap().is_none());
        assert_eq!(manager.get(&alert.id).await.unwrap().escalation_level, 0);
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest_resolved() {
        let sink = Arc::new(MemoryNotifier::new());
        let router = NotificationRouter::new(StdDuration::from_secs(1))
            .with_channel(ChannelConfig::new("slack", &Severity::ALL), sink);
        let manager = AlertLifecycleManager::new(Arc::new(router), 2, SummaryOptions::default());

        let first = manager.create(new_alert(&["slack"])).await;
        let second = manager.create(new_alert(&["slack"])).await;
        manager.resolve(&first.id, "alice", None).await.unwrap();
        let third = manager.create(new_alert(&["slack"])).await;

        assert_eq!(manager.len().await, 2);
        assert!(manager.get(&first.id).await.is_none());
        assert!(manager.get(&second.id).await.is_some());
        assert!(manager.get(&third.id).await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_ack_and_escalation_keep_both_updates() {
        let (manager, _) = setup();
        let manager = Arc::new(manager);
        let alert = manager.create_at(new_alert(&["slack"]), t0()).await;
        let policy = policy();

        let escalator = {
            let manager = manager.clone();
            let id = alert.id.clone();
            tokio::spawn(async move {
                manager
                    .escalate(&id, &policy, t0() + Duration::minutes(1))
                    .await
            })
        };
        let acked = manager.acknowledge(&alert.id, "alice", None).await.unwrap();
        escalator.await.unwrap().unwrap();

        let stored = manager.get(&alert.id).await.unwrap();
        assert_eq!(stored.status, AlertStatus::Acknowledged);
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        // Either order is valid, but the log reflects every applied change
        let kinds: Vec<_> = stored.actions().iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&ActionKind::Acknowledged));
        assert_eq!(
            kinds.contains(&ActionKind::Escalated),
            stored.escalation_level == 1
        );
    }
}
