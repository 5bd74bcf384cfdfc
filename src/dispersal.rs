// Raffle Settlement - Prize Dispersal
use std::sync::Arc;

use solana_sdk::clock::UnixTimestamp;
use tracing::{debug, error, info, warn};

use crate::raffle_error::{DispersalError, SettlementError};
use crate::raffle_state::{CoinType, PendingPayout, Raffle, RaffleStatus};
use crate::settlement::PrizeSettlement;
use crate::store::RaffleStore;
use crate::utils;

#[derive(Clone, Debug, PartialEq)]
pub enum DispersalOutcome {
    /// Every winner has a payout record
    Dispersed { paid_now: usize },
    /// Some winners remain unpaid and will be retried
    Partial { paid_now: usize, unpaid: Vec<String> },
}

/// Splits a completed raffle's prize across its winners and pays each one.
pub struct PrizeDispersal {
    store: Arc<dyn RaffleStore>,
    settlement: Arc<dyn PrizeSettlement>,
}

impl PrizeDispersal {
    pub fn new(store: Arc<dyn RaffleStore>, settlement: Arc<dyn PrizeSettlement>) -> Self {
        Self { store, settlement }
    }

    /// Pay every winner of `raffle` that has no payout record yet.
    ///
    /// Settlement failures are isolated per winner; store failures abort.
    pub async fn disperse(
        &self,
        mut raffle: Raffle,
        now: UnixTimestamp,
    ) -> Result<DispersalOutcome, DispersalError> {
        let invalid = |reason: &str| DispersalError::Validation {
            raffle_id: raffle.raffle_id.clone(),
            reason: reason.to_string(),
        };

        if raffle.status != RaffleStatus::Completed {
            return Err(invalid("raffle is not completed"));
        }
        let winners = raffle.resolved_winners();
        if winners.is_empty() {
            return Err(invalid("no winners to pay"));
        }
        let ticker = match raffle.prize_type {
            CoinType::Token => Some(
                raffle
                    .prize_ticker
                    .clone()
                    .ok_or_else(|| invalid("token prize without ticker"))?,
            ),
            CoinType::Native => None,
        };
        let (share, remainder) = utils::split_prize(raffle.prize_amount, winners.len());
        if share == 0 {
            return Err(invalid("prize smaller than winner count"));
        }
        if remainder > 0 {
            debug!(raffle_id = %raffle.raffle_id, remainder, "Prize remainder kept by treasury");
        }

        let mut paid_now = 0;
        let mut unpaid = Vec::new();

        for winner in &winners {
            if raffle.payout_for(winner).is_some() {
                continue;
            }

            if let Some(pending) = raffle.pending_payout_for(winner).cloned() {
                match self
                    .settlement
                    .find_settlement(winner, pending.amount, ticker.as_deref())
                    .await
                {
                    Ok(Some(tx_id)) => {
                        info!(raffle_id = %raffle.raffle_id, %winner, %tx_id, "Reconciled earlier payout");
                        raffle.record_payout(winner, &tx_id, pending.amount, now);
                        self.store.save(&raffle).await?;
                        paid_now += 1;
                        continue;
                    }
                    Ok(None) => {
                        warn!(raffle_id = %raffle.raffle_id, %winner, "Earlier payout not found on ledger, resending");
                        raffle.clear_pending_payout(winner);
                    }
                    Err(e) => {
                        error!(raffle_id = %raffle.raffle_id, %winner, error = %e, "Unable to reconcile earlier payout");
                        unpaid.push(winner.clone());
                        continue;
                    }
                }
            }

            // persisted before submission so a crash leaves a reconcilable trace
            raffle.pending_payouts.push(PendingPayout {
                recipient: winner.clone(),
                amount: share,
                started_at: now,
            });
            self.store.save(&raffle).await?;

            match self.pay(winner, share, ticker.as_deref()).await {
                Ok(tx_id) => {
                    info!(raffle_id = %raffle.raffle_id, %winner, %tx_id, amount = share, "Sent prize");
                    raffle.record_payout(winner, &tx_id, share, now);
                    paid_now += 1;
                }
                Err(e) => {
                    error!(raffle_id = %raffle.raffle_id, %winner, error = %e, "Error sending prize");
                    if !e.is_ambiguous() {
                        raffle.clear_pending_payout(winner);
                    }
                    unpaid.push(winner.clone());
                }
            }
            self.store.save(&raffle).await?;
        }

        if raffle.all_winners_paid() {
            raffle.prize_confirmed = true;
            raffle.prize_dispersed = true;
            self.store.save(&raffle).await?;
            info!(raffle_id = %raffle.raffle_id, winners = winners.len(), "Prize fully dispersed");
            Ok(DispersalOutcome::Dispersed { paid_now })
        } else {
            warn!(raffle_id = %raffle.raffle_id, unpaid = unpaid.len(), "Prize partially dispersed");
            Ok(DispersalOutcome::Partial { paid_now, unpaid })
        }
    }

    async fn pay(
        &self,
        winner: &str,
        amount: u64,
        ticker: Option<&str>,
    ) -> Result<String, SettlementError> {
        match ticker {
            Some(ticker) => self.settlement.send_token(winner, amount, ticker).await,
            None => self.settlement.send_native(winner, amount).await,
        }
    }
}
