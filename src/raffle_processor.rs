// Raffle Settlement - Completion Processor
use std::collections::HashSet;
use std::sync::Arc;

use rand::{rngs::StdRng, RngCore, SeedableRng};
use solana_sdk::clock::UnixTimestamp;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::dispersal::{DispersalOutcome, PrizeDispersal};
use crate::raffle_error::StoreError;
use crate::raffle_state::Raffle;
use crate::selector::{select_winners, Selection};
use crate::settlement::PrizeSettlement;
use crate::store::RaffleStore;

/// Counters for one completion pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Raffles moved from live to completed
    pub completed: usize,
    /// Raffles whose prize is now fully dispersed
    pub dispersed: usize,
    /// Raffles left with unpaid winners
    pub partial: usize,
    /// Raffles skipped because of an error
    pub failed: usize,
}

/// Closes expired raffles, draws winners and hands them to prize dispersal.
pub struct RaffleProcessor {
    store: Arc<dyn RaffleStore>,
    dispersal: PrizeDispersal,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl RaffleProcessor {
    pub fn new(store: Arc<dyn RaffleStore>, settlement: Arc<dyn PrizeSettlement>) -> Self {
        Self::with_rng(store, settlement, StdRng::from_entropy())
    }

    /// Use a caller-supplied randomness source for winner draws
    pub fn with_rng<R>(
        store: Arc<dyn RaffleStore>,
        settlement: Arc<dyn PrizeSettlement>,
        rng: R,
    ) -> Self
    where
        R: RngCore + Send + 'static,
    {
        Self {
            dispersal: PrizeDispersal::new(store.clone(), settlement),
            store,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// One completion-and-dispersal pass.
    ///
    /// Only the candidate scans propagate errors; per-raffle failures are logged
    /// and counted.
    pub async fn run_pass(&self, now: UnixTimestamp) -> Result<PassReport, StoreError> {
        let mut report = PassReport::default();
        let mut attempted = HashSet::new();

        let expired = self.store.find_expired_live(now).await?;
        info!(count = expired.len(), "Found expired raffles to complete");

        for raffle in expired {
            let raffle_id = raffle.raffle_id.clone();
            match self.complete_raffle(&raffle, now).await {
                Ok(Some(completed)) => {
                    report.completed += 1;
                    if completed.awaiting_dispersal() {
                        info!(%raffle_id, winners = ?completed.winners_list, "Raffle completed");
                        attempted.insert(raffle_id);
                        self.disperse(completed, now, &mut report).await;
                    } else {
                        info!(%raffle_id, "Raffle completed. No valid entries for prize distribution");
                    }
                }
                Ok(None) => debug!(%raffle_id, "Raffle already completed, skipping selection"),
                Err(e) => {
                    error!(%raffle_id, error = %e, "Error completing raffle");
                    report.failed += 1;
                }
            }
        }

        let undispersed = self.store.find_undispersed().await?;
        for raffle in undispersed {
            if attempted.contains(&raffle.raffle_id) {
                continue;
            }
            debug!(raffle_id = %raffle.raffle_id, "Retrying prize dispersal");
            self.disperse(raffle, now, &mut report).await;
        }

        info!(
            completed = report.completed,
            dispersed = report.dispersed,
            partial = report.partial,
            failed = report.failed,
            "Completion pass finished"
        );
        Ok(report)
    }

    /// Draw winners and apply the live -> completed transition.
    ///
    /// Returns `None` if another writer completed the raffle first.
    pub async fn complete_raffle(
        &self,
        raffle: &Raffle,
        now: UnixTimestamp,
    ) -> Result<Option<Raffle>, StoreError> {
        let credits = raffle.wallet_credits();
        let selection = {
            let mut rng = self.rng.lock().await;
            select_winners(&credits, raffle.winners_count, &mut *rng)
        };
        if selection == Selection::NoEntries {
            debug!(raffle_id = %raffle.raffle_id, "No entries to draw from");
        }
        self.store
            .complete_if_live(&raffle.raffle_id, &selection, now)
            .await
    }

    async fn disperse(&self, raffle: Raffle, now: UnixTimestamp, report: &mut PassReport) {
        let raffle_id = raffle.raffle_id.clone();
        match self.dispersal.disperse(raffle, now).await {
            Ok(DispersalOutcome::Dispersed { .. }) => report.dispersed += 1,
            Ok(DispersalOutcome::Partial { unpaid, .. }) => {
                debug!(%raffle_id, ?unpaid, "Unpaid winners left for the next pass");
                report.partial += 1;
            }
            Err(e) => {
                error!(%raffle_id, error = %e, "Error dispersing prize");
                report.failed += 1;
            }
        }
    }
}
