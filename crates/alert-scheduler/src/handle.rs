//! Background task handle for both schedulers

use crate::escalation::EscalationScheduler;
use crate::evaluation::RuleEvaluationScheduler;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Owns the spawned scheduler tasks and their shutdown channel
pub struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl SchedulerHandle {
    /// Spawn both loops on the current runtime
    pub fn spawn(evaluation: RuleEvaluationScheduler, escalation: EscalationScheduler) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        let evaluation_rx = shutdown_tx.subscribe();
        let escalation_rx = shutdown_tx.subscribe();

        let tasks = vec![
            (
                "rule-evaluation",
                tokio::spawn(async move { evaluation.run(evaluation_rx).await }),
            ),
            (
                "escalation",
                tokio::spawn(async move { escalation.run(escalation_rx).await }),
            ),
        ];

        info!("Spawned {} scheduler tasks", tasks.len());
        Self { shutdown_tx, tasks }
    }

    /// True once every task has exited
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|(_, task)| task.is_finished())
    }

    /// Signal both loops and wait for them to exit
    pub async fn shutdown(self) {
        info!("Stopping schedulers");
        // Err only when every receiver is already gone
        let _ = self.shutdown_tx.send(());

        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                error!(task = name, "Scheduler task ended abnormally: {}", e);
            }
        }

        info!("Schedulers stopped");
    }
}
