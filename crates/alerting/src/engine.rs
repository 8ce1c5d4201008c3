//! Alert Engine facade
//!
//! Wires the metric history, rule registry, lifecycle manager, and
//! notification router together and exposes the operations consumed by the
//! control surface.

use crate::condition::PersistenceChecker;
use crate::manager::AlertLifecycleManager;
use crate::notify::{LogNotifier, NotificationRouter, Notifier};
use crate::rules::{default_rules, RuleRegistry};
use crate::settings::EngineConfig;
use crate::summary::AlertSummary;
use crate::types::{Alert, AlertRule, NewAlert, NewAlertRule};
use crate::AlertingError;
use metric_history::MetricHistory;
use std::sync::Arc;
use tracing::info;

/// Shared handles to every engine component
#[derive(Clone)]
pub struct AlertEngine {
    history: Arc<MetricHistory>,
    rules: Arc<RuleRegistry>,
    manager: Arc<AlertLifecycleManager>,
    config: Arc<EngineConfig>,
}

impl AlertEngine {
    /// Build an engine whose configured channels deliver through `notifier`
    pub fn new(config: EngineConfig, notifier: Arc<dyn Notifier>) -> Self {
        let router = NotificationRouter::from_channels(
            &config.channels,
            notifier,
            config.notification_timeout(),
        );

        let rules = if config.seed_default_rules {
            RuleRegistry::with_rules(default_rules())
        } else {
            RuleRegistry::new()
        };

        info!(
            "Alert engine created ({} channels, default rules: {})",
            config.channels.len(),
            config.seed_default_rules
        );

        Self {
            history: Arc::new(MetricHistory::new(config.history_retention_minutes)),
            rules: Arc::new(rules),
            manager: Arc::new(AlertLifecycleManager::new(
                Arc::new(router),
                config.max_retained_alerts,
                config.summary_options(),
            )),
            config: Arc::new(config),
        }
    }

    /// Build an engine that logs notifications
    pub fn with_log_notifier(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(LogNotifier))
    }

    pub fn history(&self) -> &Arc<MetricHistory> {
        &self.history
    }

    pub fn rules(&self) -> &Arc<RuleRegistry> {
        &self.rules
    }

    pub fn manager(&self) -> &Arc<AlertLifecycleManager> {
        &self.manager
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn persistence_checker(&self) -> PersistenceChecker {
        PersistenceChecker::new(self.history.clone())
    }

    pub async fn create_alert(&self, new_alert: NewAlert) -> Alert {
        self.manager.create(new_alert).await
    }

    pub async fn acknowledge_alert(
        &self,
        id: &str,
        user: &str,
        comment: Option<String>,
    ) -> Result<Alert, AlertingError> {
        self.manager.acknowledge(id, user, comment).await
    }

    pub async fn resolve_alert(
        &self,
        id: &str,
        user: &str,
        comment: Option<String>,
    ) -> Result<Alert, AlertingError> {
        self.manager.resolve(id, user, comment).await
    }

    pub async fn comment_alert(
        &self,
        id: &str,
        user: &str,
        text: &str,
    ) -> Result<Alert, AlertingError> {
        self.manager.comment(id, user, text).await
    }

    pub async fn get_alert(&self, id: &str) -> Result<Alert, AlertingError> {
        self.manager
            .get(id)
            .await
            .ok_or_else(|| AlertingError::AlertNotFound(id.to_string()))
    }

    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        self.manager.active_alerts().await
    }

    pub async fn get_alert_summary(&self) -> AlertSummary {
        self.manager.summary().await
    }

    pub async fn add_alert_rule(&self, rule: NewAlertRule) -> Result<AlertRule, AlertingError> {
        self.rules.add(rule).await
    }

    pub async fn get_alert_rules(&self) -> Vec<AlertRule> {
        self.rules.list().await
    }

    pub async fn toggle_alert_rule(
        &self,
        id: &str,
        enabled: bool,
    ) -> Result<AlertRule, AlertingError> {
        self.rules.toggle(id, enabled).await
    }

    pub async fn remove_alert_rule(&self, id: &str) -> Result<AlertRule, AlertingError> {
        self.rules.remove(id).await
    }
}
