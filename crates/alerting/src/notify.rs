//! Notification Routing
//!
//! Channels accept a configured set of severities. Delivery is bounded by a
//! timeout, and failures are logged and counted here; they never reach the
//! caller.

use crate::types::{Alert, Severity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery timed out after {0}ms")]
    Timeout(u64),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Channel unavailable: {0}")]
    Unavailable(String),
}

/// Delivery sink for a notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sink name, for logs
    fn name(&self) -> &str;

    /// Deliver an alert on a channel; `escalation_level` is set for escalations
    async fn send(
        &self,
        channel: &str,
        alert: &Alert,
        escalation_level: Option<u32>,
    ) -> Result<(), NotifyError>;
}

/// Emits one structured log event per notification
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(
        &self,
        channel: &str,
        alert: &Alert,
        escalation_level: Option<u32>,
    ) -> Result<(), NotifyError> {
        info!(
            target: "alert_notifications",
            channel,
            alert_id = %alert.id,
            severity = alert.severity.as_str(),
            category = alert.category.as_str(),
            escalation_level = escalation_level.unwrap_or(0),
            "{}",
            alert.title
        );
        Ok(())
    }
}

/// A delivered notification captured by [`MemoryNotifier`]
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub channel: String,
    pub alert_id: String,
    pub escalation_level: Option<u32>,
}

/// Keeps every delivery in memory (mock sink for tests and dry runs)
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    deliveries: Mutex<Vec<Delivery>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of deliveries so far
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Channels that received the given alert, in delivery order
    pub fn channels_for(&self, alert_id: &str) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .filter(|d| d.alert_id == alert_id)
            .map(|d| d.channel)
            .collect()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(
        &self,
        channel: &str,
        alert: &Alert,
        escalation_level: Option<u32>,
    ) -> Result<(), NotifyError> {
        let mut deliveries = self
            .deliveries
            .lock()
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;
        deliveries.push(Delivery {
            channel: channel.to_string(),
            alert_id: alert.id.clone(),
            escalation_level,
        });
        Ok(())
    }
}

/// Channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Severities this channel accepts
    #[serde(default = "all_severities")]
    pub severities: Vec<Severity>,
}

fn default_enabled() -> bool {
    true
}

fn all_severities() -> Vec<Severity> {
    Severity::ALL.to_vec()
}

impl ChannelConfig {
    pub fn new(name: &str, severities: &[Severity]) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            severities: severities.to_vec(),
        }
    }

    pub fn accepts(&self, severity: Severity) -> bool {
        self.enabled && self.severities.contains(&severity)
    }
}

struct Channel {
    config: ChannelConfig,
    notifier: Arc<dyn Notifier>,
}

/// Routes alerts to named channels filtered by severity
pub struct NotificationRouter {
    channels: HashMap<String, Channel>,
    /// Registration order, used for broadcast
    order: Vec<String>,
    timeout: Duration,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl NotificationRouter {
    /// Create a router with no channels
    pub fn new(timeout: Duration) -> Self {
        Self {
            channels: HashMap::new(),
            order: Vec::new(),
            timeout,
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Create a router where every configured channel uses the same sink
    pub fn from_channels(
        configs: &[ChannelConfig],
        notifier: Arc<dyn Notifier>,
        timeout: Duration,
    ) -> Self {
        configs.iter().fold(Self::new(timeout), |router, config| {
            router.with_channel(config.clone(), notifier.clone())
        })
    }

    /// Register a channel (replaces one with the same name)
    pub fn with_channel(mut self, config: ChannelConfig, notifier: Arc<dyn Notifier>) -> Self {
        debug!(
            "Registering channel {} with sink {}",
            config.name,
            notifier.name()
        );
        if !self.channels.contains_key(&config.name) {
            self.order.push(config.name.clone());
        }
        self.channels
            .insert(config.name.clone(), Channel { config, notifier });
        self
    }

    /// Registered channel names in registration order
    pub fn channel_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Deliver to the named channels that accept the alert's severity
    ///
    /// Returns the number of successful deliveries.
    pub async fn send(
        &self,
        alert: &Alert,
        channels: &[String],
        escalation_level: Option<u32>,
    ) -> usize {
        let mut sent = 0;

        for name in channels {
            let Some(channel) = self.channels.get(name) else {
                warn!(channel = %name, alert_id = %alert.id, "Unknown notification channel");
                continue;
            };

            if !channel.config.accepts(alert.severity) {
                debug!(
                    channel = %name,
                    severity = alert.severity.as_str(),
                    "Channel does not accept severity"
                );
                continue;
            }

            let delivery = channel.notifier.send(name, alert, escalation_level);
            let result = match tokio::time::timeout(self.timeout, delivery).await {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Timeout(self.timeout.as_millis() as u64)),
            };

            match result {
                Ok(()) => {
                    sent += 1;
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(
                        "alert_engine_notifications_failed_total",
                        "channel" => name.clone()
                    )
                    .increment(1);
                    error!(channel = %name, alert_id = %alert.id, "Notification failed: {}", e);
                }
            }
        }

        sent
    }

    /// Deliver to every registered channel that accepts the alert's severity
    pub async fn broadcast(&self, alert: &Alert) -> usize {
        self.send(alert, &self.order, None).await
    }

    /// Total successful deliveries
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Total failed or timed-out deliveries
    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
