#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

use raffle_settlement::raffle_error::SettlementError;
use raffle_settlement::settlement::{
    Address, LedgerRpc, Outpoint, PrizeSettlement, Transaction, TxId, UtxoEntry, UtxosChanged,
};
use raffle_settlement::{CoinType, NewRaffle, Raffle};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn new_raffle(raffle_id: &str, time_frame: i64, prize_amount: u64, winners_count: u32) -> Raffle {
    Raffle::new(
        NewRaffle {
            raffle_id: raffle_id.to_string(),
            creator: "creator".to_string(),
            entry_coin: CoinType::Native,
            token_ticker: None,
            time_frame,
            credit_conversion: 1.0,
            prize_type: CoinType::Native,
            prize_amount,
            prize_ticker: None,
            treasury_address: "treasury".to_string(),
            winners_count,
        },
        time_frame - 3600,
    )
    .unwrap()
}

pub fn new_token_raffle(
    raffle_id: &str,
    time_frame: i64,
    prize_amount: u64,
    winners_count: u32,
) -> Raffle {
    let mut raffle = new_raffle(raffle_id, time_frame, prize_amount, winners_count);
    raffle.prize_type = CoinType::Token;
    raffle.prize_ticker = Some("NACHO".to_string());
    raffle
}

/// Credit deposits shortly before the deadline
pub fn enter(raffle: &mut Raffle, deposits: &[(&str, u64)]) {
    let at = raffle.time_frame - 10;
    for (i, (wallet, amount)) in deposits.iter().enumerate() {
        let tx_id = format!("deposit-{}-{}-{}", raffle.raffle_id, wallet, i);
        raffle.record_entry(&tx_id, wallet, *amount, at).unwrap();
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SettlementCall {
    Native {
        destination: String,
        amount: u64,
    },
    Token {
        destination: String,
        amount: u64,
        ticker: String,
    },
    Find {
        destination: String,
        amount: u64,
    },
}

/// Settlement double with scripted failures and an optional gate
#[derive(Default)]
pub struct ScriptedSettlement {
    calls: Mutex<Vec<SettlementCall>>,
    failures: Mutex<HashMap<String, VecDeque<SettlementError>>>,
    settled: Mutex<HashMap<String, String>>,
    counter: AtomicUsize,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedSettlement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each payment signals `started` and then waits for `release`
    pub fn gated(started: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            gate: Some((started, release)),
            ..Self::default()
        }
    }

    pub fn fail_next(&self, destination: &str, error: SettlementError) {
        self.failures
            .lock()
            .unwrap()
            .entry(destination.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn seed_settled(&self, destination: &str, tx_id: &str) {
        self.settled
            .lock()
            .unwrap()
            .insert(destination.to_string(), tx_id.to_string());
    }

    pub fn calls(&self) -> Vec<SettlementCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn payment_calls(&self) -> Vec<SettlementCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, SettlementCall::Find { .. }))
            .collect()
    }

    pub fn paid_destinations(&self) -> Vec<String> {
        self.payment_calls()
            .into_iter()
            .map(|c| match c {
                SettlementCall::Native { destination, .. }
                | SettlementCall::Token { destination, .. }
                | SettlementCall::Find { destination, .. } => destination,
            })
            .collect()
    }

    async fn pay(&self, call: SettlementCall, destination: &str) -> Result<String, SettlementError> {
        self.calls.lock().unwrap().push(call);
        if let Some((started, release)) = &self.gate {
            started.notify_one();
            release.notified().await;
        }
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(destination)
            .and_then(|queue| queue.pop_front());
        if let Some(error) = failure {
            return Err(error);
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("payout-tx-{}", n))
    }
}

#[async_trait]
impl PrizeSettlement for ScriptedSettlement {
    async fn send_native(&self, destination: &str, amount: u64) -> Result<String, SettlementError> {
        let call = SettlementCall::Native {
            destination: destination.to_string(),
            amount,
        };
        self.pay(call, destination).await
    }

    async fn send_token(
        &self,
        destination: &str,
        amount: u64,
        ticker: &str,
    ) -> Result<String, SettlementError> {
        let call = SettlementCall::Token {
            destination: destination.to_string(),
            amount,
            ticker: ticker.to_string(),
        };
        self.pay(call, destination).await
    }

    async fn find_settlement(
        &self,
        destination: &str,
        amount: u64,
        _ticker: Option<&str>,
    ) -> Result<Option<String>, SettlementError> {
        self.calls.lock().unwrap().push(SettlementCall::Find {
            destination: destination.to_string(),
            amount,
        });
        Ok(self.settled.lock().unwrap().get(destination).cloned())
    }
}

#[derive(Default)]
struct LedgerState {
    utxos: Vec<UtxoEntry>,
    known: Vec<Address>,
    submitted: Vec<Transaction>,
    subscribers: Vec<(Vec<Address>, UnboundedSender<UtxosChanged>)>,
    outbound: Vec<(Address, u64, Option<String>, TxId)>,
    mempool: Vec<Transaction>,
    reject_at: Option<(usize, String)>,
    attempts: usize,
    connects: usize,
    disconnects: usize,
    active: usize,
    max_active: usize,
    daa_score: u64,
}

/// In-memory ledger node.
///
/// Outputs to known addresses become UTXOs. Notifications are sent for the first
/// `confirm_limit` submissions only, so later ones never mature. A `deferred` node
/// holds submissions in a mempool and leaves the UTXO index untouched until
/// `confirm_all`, rejecting any input already spent by a mempool transaction.
pub struct MockLedger {
    state: Mutex<LedgerState>,
    confirm_limit: usize,
    deferred: bool,
    latency: Duration,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::with_confirm_limit(usize::MAX)
    }

    pub fn with_confirm_limit(confirm_limit: usize) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            confirm_limit,
            deferred: false,
            latency: Duration::from_millis(5),
        }
    }

    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::new()
        }
    }

    /// Create a funding UTXO for `address`
    pub fn fund(&self, address: &Address, amount: u64) {
        let mut state = self.state.lock().unwrap();
        if !state.known.contains(address) {
            state.known.push(address.clone());
        }
        let n = state.utxos.len() as u8;
        state.daa_score += 1;
        let entry = UtxoEntry {
            outpoint: Outpoint {
                tx_id: TxId([n.wrapping_add(200); 32]),
                index: 0,
            },
            address: address.clone(),
            amount,
            script_public_key: address.script_public_key(),
            block_daa_score: state.daa_score,
        };
        state.utxos.push(entry);
    }

    pub fn reject_next(&self, reason: &str) {
        let mut state = self.state.lock().unwrap();
        state.reject_at = Some((state.attempts, reason.to_string()));
    }

    /// Reject the submission with zero-based attempt number `attempt`
    pub fn reject_attempt(&self, attempt: usize, reason: &str) {
        self.state.lock().unwrap().reject_at = Some((attempt, reason.to_string()));
    }

    /// Accept every mempool transaction in submission order
    pub fn confirm_all(&self) {
        let mut state = self.state.lock().unwrap();
        let pending: Vec<Transaction> = state.mempool.drain(..).collect();
        for transaction in pending {
            let tx_id = transaction.id().unwrap();
            apply(&mut state, &transaction, tx_id, true);
        }
    }

    pub fn record_outbound(&self, to: &Address, amount: u64, ticker: Option<&str>, tx_id: TxId) {
        self.state.lock().unwrap().outbound.push((
            to.clone(),
            amount,
            ticker.map(str::to_string),
            tx_id,
        ));
    }

    pub fn submitted(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn utxos_for(&self, address: &Address) -> Vec<UtxoEntry> {
        self.state
            .lock()
            .unwrap()
            .utxos
            .iter()
            .filter(|u| &u.address == address)
            .cloned()
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    pub fn max_concurrent_sessions(&self) -> usize {
        self.state.lock().unwrap().max_active
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn connect(&self) -> Result<(), SettlementError> {
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        state.active += 1;
        state.max_active = state.max_active.max(state.active);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SettlementError> {
        let mut state = self.state.lock().unwrap();
        state.disconnects += 1;
        state.active = state.active.saturating_sub(1);
        Ok(())
    }

    async fn get_utxos_by_address(
        &self,
        address: &Address,
    ) -> Result<Vec<UtxoEntry>, SettlementError> {
        tokio::time::sleep(self.latency).await;
        Ok(self.utxos_for(address))
    }

    async fn submit_transaction(&self, transaction: &Transaction) -> Result<TxId, SettlementError> {
        let mut state = self.state.lock().unwrap();
        let attempt = state.attempts;
        state.attempts += 1;
        if matches!(&state.reject_at, Some((n, _)) if *n == attempt) {
            if let Some((_, reason)) = state.reject_at.take() {
                return Err(SettlementError::Rejected(reason));
            }
        }
        let tx_id = transaction.id()?;

        if self.deferred {
            check_mempool_inputs(&state, transaction)?;
            state.submitted.push(transaction.clone());
            state.mempool.push(transaction.clone());
            return Ok(tx_id);
        }

        let confirmed = state.submitted.len() < self.confirm_limit;
        state.submitted.push(transaction.clone());
        apply(&mut state, transaction, tx_id, confirmed);
        Ok(tx_id)
    }

    async fn subscribe_utxos_changed(
        &self,
        addresses: &[Address],
    ) -> Result<UnboundedReceiver<UtxosChanged>, SettlementError> {
        let mut state = self.state.lock().unwrap();
        for address in addresses {
            if !state.known.contains(address) {
                state.known.push(address.clone());
            }
        }
        let (sender, receiver) = unbounded_channel();
        state.subscribers.push((addresses.to_vec(), sender));
        Ok(receiver)
    }

    async fn find_outbound_transfer(
        &self,
        _from: &Address,
        to: &Address,
        amount: u64,
        ticker: Option<&str>,
    ) -> Result<Option<TxId>, SettlementError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .outbound
            .iter()
            .find(|(dest, value, t, _)| dest == to && *value == amount && t.as_deref() == ticker)
            .map(|(_, _, _, tx_id)| *tx_id))
    }
}

/// Inputs must be indexed or created in the mempool, and not spent by it already
fn check_mempool_inputs(
    state: &LedgerState,
    transaction: &Transaction,
) -> Result<(), SettlementError> {
    let mut spent = Vec::new();
    let mut created = Vec::new();
    for pending in &state.mempool {
        spent.extend(pending.inputs.iter().map(|i| i.previous_outpoint));
        let tx_id = pending.id()?;
        created.extend((0..pending.outputs.len()).map(|index| Outpoint {
            tx_id,
            index: index as u32,
        }));
    }

    for input in &transaction.inputs {
        let outpoint = input.previous_outpoint;
        if spent.contains(&outpoint) {
            return Err(SettlementError::Rejected(
                "double spend of mempool input".to_string(),
            ));
        }
        let indexed = state.utxos.iter().any(|u| u.outpoint == outpoint);
        if !indexed && !created.contains(&outpoint) {
            return Err(SettlementError::Rejected("missing input".to_string()));
        }
    }
    Ok(())
}

/// Move a transaction into the UTXO index, optionally notifying subscribers
fn apply(state: &mut LedgerState, transaction: &Transaction, tx_id: TxId, notify: bool) {
    let spent: Vec<Outpoint> = transaction
        .inputs
        .iter()
        .map(|i| i.previous_outpoint)
        .collect();
    state.utxos.retain(|u| !spent.contains(&u.outpoint));

    state.daa_score += 1;
    let mut created = Vec::new();
    for (index, output) in transaction.outputs.iter().enumerate() {
        let owner = state
            .known
            .iter()
            .find(|a| a.script_public_key() == output.script_public_key)
            .cloned();
        if let Some(address) = owner {
            created.push(UtxoEntry {
                outpoint: Outpoint {
                    tx_id,
                    index: index as u32,
                },
                address,
                amount: output.value,
                script_public_key: output.script_public_key.clone(),
                block_daa_score: state.daa_score,
            });
        }
    }
    state.utxos.extend(created.iter().cloned());

    if !notify {
        return;
    }
    for (addresses, sender) in &state.subscribers {
        let added: Vec<UtxoEntry> = created
            .iter()
            .filter(|u| addresses.contains(&u.address))
            .cloned()
            .collect();
        if !added.is_empty() {
            let _ = sender.send(UtxosChanged {
                added,
                removed: spent.clone(),
            });
        }
    }
}
