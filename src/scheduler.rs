// Raffle Settlement - Scheduler
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::raffle_error::StoreError;
use crate::raffle_processor::{PassReport, RaffleProcessor};
use crate::utils;

#[derive(Debug, PartialEq)]
pub enum PassOutcome {
    Finished(PassReport),
    Failed(StoreError),
    /// Another pass was still in flight
    Skipped,
}

/// Fires completion passes on a fixed interval, never more than one at a time.
pub struct Scheduler {
    processor: Arc<RaffleProcessor>,
    period: Duration,
    pass_guard: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(processor: Arc<RaffleProcessor>, period: Duration) -> Self {
        Self {
            processor,
            period,
            pass_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Run one pass now unless one is already running
    pub async fn trigger(&self) -> PassOutcome {
        let _guard = match self.pass_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Completion pass already running, trigger skipped");
                return PassOutcome::Skipped;
            }
        };
        execute(&self.processor).await
    }

    /// Tick until `shutdown` fires, then wait for the in-flight pass to finish.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(period = ?self.period, "Raffle completion scheduler started");
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.pass_guard.clone().try_lock_owned() {
                        Ok(guard) => {
                            let processor = self.processor.clone();
                            // the guard moves into the task and is released however it ends
                            tokio::spawn(async move {
                                let _guard = guard;
                                execute(&processor).await;
                            });
                        }
                        Err(_) => warn!("Previous completion pass still running, tick skipped"),
                    }
                }
            }
        }

        let _drain = self.pass_guard.lock().await;
        info!("Raffle completion scheduler stopped");
    }
}

async fn execute(processor: &RaffleProcessor) -> PassOutcome {
    info!("Running raffle completion scheduler...");
    match processor.run_pass(utils::now_unix()).await {
        Ok(report) => PassOutcome::Finished(report),
        Err(e) => {
            error!(error = %e, "Error in completing raffles");
            PassOutcome::Failed(e)
        }
    }
}
