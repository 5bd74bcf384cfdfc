// Raffle Settlement - State
use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::clock::UnixTimestamp;

use crate::raffle_error::RaffleError;
use crate::selector::Selection;
use crate::utils;

/// Winner value recorded when a raffle closes without entries
pub const NO_ENTRIES: &str = "No Entries";

/// Ticker of the ledger's native coin
pub const NATIVE_TICKER: &str = "KAS";

/// Status of a raffle
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaffleStatus {
    /// Raffle is open for entries
    Live,
    /// Deadline passed and winners were drawn
    Completed,
}

/// Coin used for deposits or prizes
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoinType {
    /// Native coin, paid with a single transaction
    Native,
    /// Protocol token, paid through commit/reveal
    Token,
}

/// Accumulated deposits of one wallet
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq)]
pub struct Entry {
    pub wallet_address: String,
    /// First deposit transaction of this wallet
    pub tx_id: String,
    pub credits_added: f64,
    /// Deposited amount in base units
    pub amount: u64,
    pub confirmed_at: UnixTimestamp,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq)]
pub enum TransactionKind {
    Deposit { credits_added: f64 },
    Payout { recipient: String },
}

/// Audit record in the append-only transaction ledger
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq)]
pub struct ProcessedTransaction {
    pub tx_id: String,
    pub coin_type: String,
    pub amount: u64,
    pub kind: TransactionKind,
    pub timestamp: UnixTimestamp,
}

/// Payment submitted but not yet recorded as settled
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq)]
pub struct PendingPayout {
    pub recipient: String,
    pub amount: u64,
    pub started_at: UnixTimestamp,
}

/// Parameters accepted when a raffle is created
#[derive(Clone, Debug)]
pub struct NewRaffle {
    pub raffle_id: String,
    pub creator: String,
    pub entry_coin: CoinType,
    pub token_ticker: Option<String>,
    pub time_frame: UnixTimestamp,
    pub credit_conversion: f64,
    pub prize_type: CoinType,
    pub prize_amount: u64,
    pub prize_ticker: Option<String>,
    pub treasury_address: String,
    pub winners_count: u32,
}

/// Raffle record
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq)]
pub struct Raffle {
    pub raffle_id: String,
    pub creator: String,
    pub entry_coin: CoinType,
    /// Deposit token ticker (token raffles only)
    pub token_ticker: Option<String>,
    /// Deadline after which the raffle can be completed
    pub time_frame: UnixTimestamp,
    /// Deposit base units per credit
    pub credit_conversion: f64,
    pub prize_type: CoinType,
    /// Prize in base units
    pub prize_amount: u64,
    pub prize_ticker: Option<String>,
    pub prize_display: String,
    pub treasury_address: String,
    pub prize_confirmed: bool,
    /// Set by manual prize confirmation
    pub prize_transaction_id: Option<String>,
    pub prize_dispersed: bool,
    pub winners_count: u32,
    pub winners_list: Vec<String>,
    /// Single-winner mirror of `winners_list`
    pub winner: Option<String>,
    pub entries: Vec<Entry>,
    pub total_entries: f64,
    pub current_entries: f64,
    pub processed_transactions: Vec<ProcessedTransaction>,
    pub pending_payouts: Vec<PendingPayout>,
    pub status: RaffleStatus,
    pub completed_at: Option<UnixTimestamp>,
    pub created_at: UnixTimestamp,
}

fn normalize_ticker(ticker: Option<String>) -> Option<String> {
    ticker
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
}

impl Raffle {
    /// Create a new live raffle
    pub fn new(params: NewRaffle, now: UnixTimestamp) -> Result<Self, RaffleError> {
        let invalid = |reason: &str| Err(RaffleError::InvalidParameters(reason.to_string()));

        if params.raffle_id.trim().is_empty() || params.creator.trim().is_empty() {
            return invalid("raffle id and creator are required");
        }
        if params.treasury_address.trim().is_empty() {
            return invalid("treasury address is required");
        }
        if params.winners_count == 0 {
            return invalid("winners count must be at least 1");
        }
        if !(params.credit_conversion.is_finite() && params.credit_conversion > 0.0) {
            return invalid("credit conversion must be positive");
        }
        if params.prize_amount == 0 {
            return invalid("prize amount must be positive");
        }

        let token_ticker = match params.entry_coin {
            CoinType::Token => match normalize_ticker(params.token_ticker) {
                Some(ticker) => Some(ticker),
                None => return invalid("token raffles require a token ticker"),
            },
            CoinType::Native => None,
        };
        let prize_ticker = match params.prize_type {
            CoinType::Token => match normalize_ticker(params.prize_ticker) {
                Some(ticker) => Some(ticker),
                None => return invalid("token prizes require a prize ticker"),
            },
            CoinType::Native => None,
        };

        let prize_display = format!(
            "{} {}",
            utils::format_coins(params.prize_amount),
            prize_ticker.as_deref().unwrap_or(NATIVE_TICKER)
        );

        Ok(Self {
            raffle_id: params.raffle_id,
            creator: params.creator,
            entry_coin: params.entry_coin,
            token_ticker,
            time_frame: params.time_frame,
            credit_conversion: params.credit_conversion,
            prize_type: params.prize_type,
            prize_amount: params.prize_amount,
            prize_ticker,
            prize_display,
            treasury_address: params.treasury_address,
            prize_confirmed: false,
            prize_transaction_id: None,
            prize_dispersed: false,
            winners_count: params.winners_count,
            winners_list: Vec::new(),
            winner: None,
            entries: Vec::new(),
            total_entries: 0.0,
            current_entries: 0.0,
            processed_transactions: Vec::new(),
            pending_payouts: Vec::new(),
            status: RaffleStatus::Live,
            completed_at: None,
            created_at: now,
        })
    }

    /// Check if the raffle deadline has passed
    pub fn has_ended(&self, now: UnixTimestamp) -> bool {
        now >= self.time_frame
    }

    /// Label stored with deposit records
    pub fn entry_coin_label(&self) -> String {
        match self.entry_coin {
            CoinType::Native => NATIVE_TICKER.to_string(),
            CoinType::Token => self.token_ticker.clone().unwrap_or_default(),
        }
    }

    /// Label stored with payout records
    pub fn prize_coin_label(&self) -> String {
        match self.prize_type {
            CoinType::Native => NATIVE_TICKER.to_string(),
            CoinType::Token => self.prize_ticker.clone().unwrap_or_default(),
        }
    }

    /// Credit a confirmed deposit to its wallet
    pub fn record_entry(
        &mut self,
        tx_id: &str,
        wallet_address: &str,
        amount: u64,
        now: UnixTimestamp,
    ) -> Result<f64, RaffleError> {
        if self.status != RaffleStatus::Live || self.has_ended(now) {
            return Err(RaffleError::RaffleNotLive(self.raffle_id.clone()));
        }
        if amount == 0 {
            return Err(RaffleError::EntryAmountTooLow);
        }
        if self.processed_transactions.iter().any(|t| t.tx_id == tx_id) {
            return Err(RaffleError::DuplicateDeposit(tx_id.to_string()));
        }

        let credits = utils::calculate_credits(amount, self.credit_conversion);
        self.current_entries += credits;
        self.total_entries += credits;

        match self
            .entries
            .iter_mut()
            .find(|e| e.wallet_address == wallet_address)
        {
            Some(entry) => {
                entry.credits_added += credits;
                entry.amount += amount;
                entry.confirmed_at = now;
            }
            None => self.entries.push(Entry {
                wallet_address: wallet_address.to_string(),
                tx_id: tx_id.to_string(),
                credits_added: credits,
                amount,
                confirmed_at: now,
            }),
        }

        self.processed_transactions.push(ProcessedTransaction {
            tx_id: tx_id.to_string(),
            coin_type: self.entry_coin_label(),
            amount,
            kind: TransactionKind::Deposit {
                credits_added: credits,
            },
            timestamp: now,
        });

        Ok(credits)
    }

    /// Manually confirm the prize with an external transaction id
    pub fn confirm_prize(&mut self, tx_id: &str) {
        self.prize_confirmed = true;
        self.prize_transaction_id = Some(tx_id.to_string());
    }

    /// Per-wallet credit totals, in order of first appearance
    pub fn wallet_credits(&self) -> Vec<(String, f64)> {
        let mut totals: Vec<(String, f64)> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            match totals.iter_mut().find(|(w, _)| *w == entry.wallet_address) {
                Some((_, credits)) => *credits += entry.credits_added,
                None => totals.push((entry.wallet_address.clone(), entry.credits_added)),
            }
        }
        totals
    }

    /// Apply a selection result and close the raffle.
    ///
    /// Returns false without touching the record if the raffle is not live.
    pub fn complete(&mut self, selection: &Selection, now: UnixTimestamp) -> bool {
        if self.status != RaffleStatus::Live {
            return false;
        }
        match selection {
            Selection::NoEntries => {
                self.winner = Some(NO_ENTRIES.to_string());
                self.winners_list = Vec::new();
            }
            Selection::Winners(winners) => {
                self.winner = match winners.as_slice() {
                    [single] => Some(single.clone()),
                    _ => None,
                };
                self.winners_list = winners.clone();
            }
        }
        self.status = RaffleStatus::Completed;
        self.completed_at = Some(now);
        true
    }

    /// Winners eligible for a payout
    pub fn resolved_winners(&self) -> Vec<String> {
        if !self.winners_list.is_empty() {
            return self.winners_list.clone();
        }
        match &self.winner {
            Some(winner) if winner != NO_ENTRIES => vec![winner.clone()],
            _ => Vec::new(),
        }
    }

    /// Settled payout record for a wallet
    pub fn payout_for(&self, wallet: &str) -> Option<&ProcessedTransaction> {
        self.processed_transactions.iter().find(|t| {
            matches!(&t.kind, TransactionKind::Payout { recipient } if recipient == wallet)
        })
    }

    pub fn pending_payout_for(&self, wallet: &str) -> Option<&PendingPayout> {
        self.pending_payouts.iter().find(|p| p.recipient == wallet)
    }

    pub fn clear_pending_payout(&mut self, wallet: &str) {
        self.pending_payouts.retain(|p| p.recipient != wallet);
    }

    /// Record a settled payout and drop its pending marker
    pub fn record_payout(&mut self, wallet: &str, tx_id: &str, amount: u64, now: UnixTimestamp) {
        self.clear_pending_payout(wallet);
        self.processed_transactions.push(ProcessedTransaction {
            tx_id: tx_id.to_string(),
            coin_type: self.prize_coin_label(),
            amount,
            kind: TransactionKind::Payout {
                recipient: wallet.to_string(),
            },
            timestamp: now,
        });
        self.prize_confirmed = true;
    }

    /// Number of payout records in the ledger
    pub fn payout_count(&self) -> usize {
        self.processed_transactions
            .iter()
            .filter(|t| matches!(t.kind, TransactionKind::Payout { .. }))
            .count()
    }

    /// True once every resolved winner has a payout record
    pub fn all_winners_paid(&self) -> bool {
        let winners = self.resolved_winners();
        !winners.is_empty() && winners.iter().all(|w| self.payout_for(w).is_some())
    }

    /// Completed raffle with winners still awaiting payment
    pub fn awaiting_dispersal(&self) -> bool {
        self.status == RaffleStatus::Completed
            && !self.prize_dispersed
            && !self.resolved_winners().is_empty()
    }
}
