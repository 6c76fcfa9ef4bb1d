//! Recurring maintenance: decay sweep and weak-waypoint pruning.
//!
//! Decay runs once at start and then every `decay_interval_hours`; pruning runs
//! after each `prune_interval_hours`. Failures are logged and the loop carries on.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

use crate::config::MaintenanceConfig;
use crate::engine::HsgEngine;

const SECS_PER_HOUR: u64 = 3600;

/// Handle to the running maintenance tasks.
pub struct MaintenanceScheduler {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceScheduler {
    /// Start both tasks with intervals from `config`. A zero interval disables that task.
    pub fn start(engine: HsgEngine, config: &MaintenanceConfig) -> Self {
        let hours = |h: u64| (h > 0).then(|| Duration::from_secs(h * SECS_PER_HOUR));
        Self::start_with_intervals(
            engine,
            hours(config.decay_interval_hours),
            hours(config.prune_interval_hours),
        )
    }

    pub fn start_with_intervals(
        engine: HsgEngine,
        decay_every: Option<Duration>,
        prune_every: Option<Duration>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        if let Some(period) = decay_every {
            let engine = engine.clone();
            let mut rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                let mut timer = interval(period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = rx.changed() => break,
                        _ = timer.tick() => match engine.run_decay_process().await {
                            Ok(stats) => tracing::info!(processed = stats.processed, decayed = stats.decayed, "scheduled decay"),
                            Err(e) => tracing::error!(error = %e, "scheduled decay failed"),
                        },
                    }
                }
                tracing::debug!("decay task stopped");
            }));
        }

        if let Some(period) = prune_every {
            let mut rx = shutdown_rx;
            tasks.push(tokio::spawn(async move {
                let mut timer = interval_at(Instant::now() + period, period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = rx.changed() => break,
                        _ = timer.tick() => match engine.prune_weak_waypoints().await {
                            Ok(pruned) => tracing::info!(pruned, "scheduled prune"),
                            Err(e) => tracing::error!(error = %e, "scheduled prune failed"),
                        },
                    }
                }
                tracing::debug!("prune task stopped");
            }));
        }

        tracing::info!(
            decay_secs = decay_every.map(|d| d.as_secs()),
            prune_secs = prune_every.map(|d| d.as_secs()),
            "maintenance scheduler started"
        );
        Self { shutdown_tx, tasks }
    }

    /// Signal both tasks and wait for them to finish their current run.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "maintenance task ended abnormally");
            }
        }
        tracing::info!("maintenance scheduler stopped");
    }
}
