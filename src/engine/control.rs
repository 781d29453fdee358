//! Supervisor: owns the timers that drive the lister.
//!
//! Three schedules share one loop: the submission pass, the periodic
//! snapshot save, and a diagnostic line with the set sizes. Shutdown is
//! explicit and always ends with one final save.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Interval, MissedTickBehavior, interval_at};
use tracing::{error, info, warn};

use super::lister::Lister;
use crate::error::Result;
use crate::telemetry::metrics;

/// Timer configuration for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How often a submission pass runs.
    pub submit_interval: Duration,
    /// How often snapshots are written.
    pub save_interval: Duration,
    /// How often set sizes are logged. `None` disables the line.
    pub stats_interval: Option<Duration>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            submit_interval: Duration::from_secs(60),
            save_interval: Duration::from_secs(30 * 60),
            stats_interval: Some(Duration::from_secs(10)),
        }
    }
}

pub struct Supervisor {
    lister: Lister,
    config: SupervisorConfig,
    shutdown: Arc<Notify>,
}

impl Clone for Supervisor {
    fn clone(&self) -> Self {
        Self {
            lister: self.lister.clone(),
            config: self.config.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

fn schedule(period: Duration) -> Interval {
    let mut interval = interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}

impl Supervisor {
    pub fn new(lister: Lister, config: SupervisorConfig) -> Self {
        Self {
            lister,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn lister(&self) -> &Lister {
        &self.lister
    }

    /// Signal the loop to stop. Safe to call before `run` starts.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run until shutdown, then save once more.
    ///
    /// A submission pass interrupted by shutdown is abandoned mid-call; its
    /// in-flight identifier is kept in the final pending snapshot.
    pub async fn run(&self) -> Result<()> {
        let mut submit = schedule(self.config.submit_interval);
        let mut save = schedule(self.config.save_interval);
        let mut stats = self.config.stats_interval.map(schedule);

        info!(
            submit_secs = self.config.submit_interval.as_secs(),
            save_secs = self.config.save_interval.as_secs(),
            "supervisor started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("saving before shutdown");
                    return self.final_save().await;
                }
                _ = submit.tick() => {
                    tokio::select! {
                        _ = self.lister.drain() => {}
                        _ = self.shutdown.notified() => {
                            warn!("shutdown during submission pass");
                            return self.final_save().await;
                        }
                    }
                }
                _ = save.tick() => {
                    if let Err(e) = self.lister.save().await {
                        error!("periodic save failed: {e}");
                    }
                }
                _ = tick(&mut stats) => {
                    let snapshot = self.lister.stats();
                    metrics::record_queue_stats(snapshot);
                    info!(
                        added = snapshot.added,
                        pending = snapshot.pending,
                        in_flight = snapshot.in_flight,
                        "queue sizes"
                    );
                }
            }
        }
    }

    async fn final_save(&self) -> Result<()> {
        match self.lister.save().await {
            Ok(true) => Ok(()),
            Ok(false) => {
                info!("not ready, nothing to save");
                Ok(())
            }
            Err(e) => {
                error!("final save failed: {e}");
                Err(e)
            }
        }
    }
}
