// Raffle Settlement - Treasury Settlement Client
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::signature::{Keypair, Signer};
use tokio::sync::{mpsc::UnboundedReceiver, Mutex};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::raffle_error::SettlementError;
use crate::settlement::address::{Address, NetworkId};
use crate::settlement::rpc::{LedgerRpc, UtxosChanged};
use crate::settlement::script::{commit_script, ScriptBuilder, TransferEnvelope};
use crate::settlement::transaction::{
    build_payment, Outpoint, Transaction, TransactionInput, TransactionOutput, TxId, UtxoEntry,
    SIGHASH_ALL,
};
use crate::settlement::PrizeSettlement;

/// Priority fee added to every treasury payment (0.0001 coin)
pub const DEFAULT_PRIORITY_FEE: u64 = 10_000;
/// Amount locked at the script-hash address by a commit (0.3 coin)
pub const DEFAULT_COMMIT_AMOUNT: u64 = 30_000_000;
/// Fee deducted when the commit output is revealed back to the treasury (0.1 coin)
pub const DEFAULT_REVEAL_FEE: u64 = 10_000_000;
pub const DEFAULT_MATURITY_TIMEOUT: Duration = Duration::from_secs(120);
/// How long unconfirmed treasury bookkeeping is trusted over the node's view
pub const IN_FLIGHT_TTL: Duration = Duration::from_secs(600);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeSchedule {
    pub priority_fee: u64,
    pub commit_amount: u64,
    pub reveal_fee: u64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            priority_fee: DEFAULT_PRIORITY_FEE,
            commit_amount: DEFAULT_COMMIT_AMOUNT,
            reveal_fee: DEFAULT_REVEAL_FEE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettlementSettings {
    pub network: NetworkId,
    pub fees: FeeSchedule,
    pub commit_timeout: Duration,
    pub reveal_timeout: Duration,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            network: NetworkId::Mainnet,
            fees: FeeSchedule::default(),
            commit_timeout: DEFAULT_MATURITY_TIMEOUT,
            reveal_timeout: DEFAULT_MATURITY_TIMEOUT,
        }
    }
}

/// Open ledger connection; disconnects on drop if not closed explicitly
struct Session<L: LedgerRpc + 'static> {
    rpc: Arc<L>,
    open: bool,
}

impl<L: LedgerRpc + 'static> Session<L> {
    async fn open(rpc: Arc<L>) -> Result<Self, SettlementError> {
        rpc.connect().await?;
        Ok(Self { rpc, open: true })
    }

    async fn close(mut self) {
        self.open = false;
        if let Err(e) = self.rpc.disconnect().await {
            warn!(error = %e, "Ledger disconnect failed");
        }
    }
}

impl<L: LedgerRpc + 'static> Drop for Session<L> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        // cancelled mid-call: finish teardown in the background
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let rpc = self.rpc.clone();
            handle.spawn(async move {
                if let Err(e) = rpc.disconnect().await {
                    warn!(error = %e, "Ledger disconnect after cancellation failed");
                }
            });
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct SpentMark {
    /// Node listed the outpoint as unspent after we spent it
    listed: bool,
    at: Instant,
}

/// Treasury spends and change the node's UTXO index may not reflect yet.
///
/// A mempool transaction leaves its inputs listed as unspent and its outputs unlisted
/// until it is accepted, so the node's view alone would double-spend.
#[derive(Debug, Default)]
struct InFlight {
    spent: HashMap<Outpoint, SpentMark>,
    change: Vec<(UtxoEntry, Instant)>,
}

impl InFlight {
    /// Merge the node's treasury UTXOs with our own unconfirmed submissions
    fn spendable(&mut self, reported: Vec<UtxoEntry>, now: Instant) -> Vec<UtxoEntry> {
        let fresh = |at: Instant| now.saturating_duration_since(at) < IN_FLIGHT_TTL;

        self.spent.retain(|outpoint, mark| {
            if reported.iter().any(|u| &u.outpoint == outpoint) {
                mark.listed = true;
                true
            } else {
                // listed before and gone now: the spend is accepted
                !mark.listed && fresh(mark.at)
            }
        });
        self.change.retain(|(entry, at)| {
            !reported.iter().any(|u| u.outpoint == entry.outpoint) && fresh(*at)
        });

        let spent = &self.spent;
        reported
            .into_iter()
            .chain(self.change.iter().map(|(entry, _)| entry.clone()))
            .filter(|u| !spent.contains_key(&u.outpoint))
            .collect()
    }

    /// Track a submitted treasury-funded transaction
    fn record(
        &mut self,
        tx_id: TxId,
        transaction: &Transaction,
        spent: &[UtxoEntry],
        treasury: &Address,
        now: Instant,
    ) {
        for entry in spent {
            self.change.retain(|(c, _)| c.outpoint != entry.outpoint);
            self.spent.insert(
                entry.outpoint,
                SpentMark {
                    listed: false,
                    at: now,
                },
            );
        }
        let script = treasury.script_public_key();
        for (index, output) in transaction.outputs.iter().enumerate() {
            if output.script_public_key != script {
                continue;
            }
            let entry = UtxoEntry {
                outpoint: Outpoint {
                    tx_id,
                    index: index as u32,
                },
                address: treasury.clone(),
                amount: output.value,
                script_public_key: output.script_public_key.clone(),
                block_daa_score: 0,
            };
            self.change.push((entry, now));
        }
    }

    fn clear(&mut self) {
        self.spent.clear();
        self.change.clear();
    }
}

/// Pays prizes out of the treasury wallet.
///
/// Every call holds the treasury lock for its whole duration, so at most one
/// transaction spends from the treasury UTXO set at a time.
pub struct SettlementClient<L: LedgerRpc + 'static> {
    rpc: Arc<L>,
    treasury: Arc<Keypair>,
    treasury_address: Address,
    settings: SettlementSettings,
    treasury_lock: Mutex<()>,
    /// Only touched while `treasury_lock` is held
    in_flight: Mutex<InFlight>,
}

impl<L: LedgerRpc + 'static> SettlementClient<L> {
    pub fn new(rpc: Arc<L>, treasury: Arc<Keypair>, settings: SettlementSettings) -> Self {
        let treasury_address = Address::pubkey(settings.network, &treasury.pubkey());
        Self {
            rpc,
            treasury,
            treasury_address,
            settings,
            treasury_lock: Mutex::new(()),
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    pub fn treasury_address(&self) -> &Address {
        &self.treasury_address
    }

    pub fn settings(&self) -> &SettlementSettings {
        &self.settings
    }

    /// Run `op` with the treasury locked and a ledger session open
    async fn with_session<T, F, Fut>(&self, op: F) -> Result<T, SettlementError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SettlementError>>,
    {
        let _treasury = self.treasury_lock.lock().await;
        let session = Session::open(self.rpc.clone()).await?;
        let result = op().await;
        session.close().await;
        result
    }

    fn parse_destination(&self, destination: &str) -> Result<Address, SettlementError> {
        let address = Address::from_str(destination)?;
        if address.network != self.settings.network {
            return Err(SettlementError::InvalidAddress(format!(
                "{} is not a {:?} address",
                destination, self.settings.network
            )));
        }
        Ok(address)
    }

    fn sign(&self, sighash: &[u8; 32]) -> Vec<u8> {
        let signature = self.treasury.sign_message(sighash);
        let mut bytes = signature.as_ref().to_vec();
        bytes.push(SIGHASH_ALL);
        bytes
    }

    /// Sign every input of a treasury payment with a pay-to-pubkey unlock
    fn sign_treasury_inputs(
        &self,
        transaction: &mut Transaction,
        spent: &[UtxoEntry],
    ) -> Result<(), SettlementError> {
        let mut scripts = Vec::with_capacity(spent.len());
        for (index, entry) in spent.iter().enumerate() {
            let sighash =
                transaction.signature_hash(index, &entry.script_public_key, entry.amount)?;
            let mut builder = ScriptBuilder::new();
            builder.add_data(&self.sign(&sighash));
            scripts.push(builder.into_script());
        }
        for (input, script) in transaction.inputs.iter_mut().zip(scripts) {
            input.signature_script = script;
        }
        Ok(())
    }

    async fn signed_payment(
        &self,
        destination: &Address,
        amount: u64,
    ) -> Result<(Transaction, Vec<UtxoEntry>), SettlementError> {
        let reported = self.rpc.get_utxos_by_address(&self.treasury_address).await?;
        let utxos = self
            .in_flight
            .lock()
            .await
            .spendable(reported, Instant::now());
        let (mut transaction, spent) = build_payment(
            &utxos,
            destination,
            amount,
            self.settings.fees.priority_fee,
            &self.treasury_address,
        )?;
        self.sign_treasury_inputs(&mut transaction, &spent)?;
        Ok((transaction, spent))
    }

    /// Submit a treasury-funded transaction and remember what it spent
    async fn submit_payment(
        &self,
        transaction: &Transaction,
        spent: &[UtxoEntry],
    ) -> Result<TxId, SettlementError> {
        match self.rpc.submit_transaction(transaction).await {
            Ok(tx_id) => {
                self.in_flight.lock().await.record(
                    tx_id,
                    transaction,
                    spent,
                    &self.treasury_address,
                    Instant::now(),
                );
                Ok(tx_id)
            }
            Err(e) => {
                if matches!(e, SettlementError::Rejected(_)) {
                    // drop bookkeeping that may no longer match the mempool
                    self.in_flight.lock().await.clear();
                }
                Err(e)
            }
        }
    }

    async fn native_transfer(
        &self,
        destination: &Address,
        amount: u64,
    ) -> Result<TxId, SettlementError> {
        let (transaction, spent) = self.signed_payment(destination, amount).await?;
        let tx_id = self.submit_payment(&transaction, &spent).await?;
        info!(%tx_id, %destination, amount, "Submitted native transfer");
        Ok(tx_id)
    }

    async fn token_transfer(
        &self,
        destination: &Address,
        amount: u64,
        ticker: &str,
    ) -> Result<TxId, SettlementError> {
        let fees = self.settings.fees;
        let envelope = TransferEnvelope::transfer(ticker, amount, destination);
        let redeem_script = commit_script(&self.treasury.pubkey(), &envelope)?;
        let script_address = Address::for_script(self.settings.network, &redeem_script);

        // subscribe before submitting so the commit notification cannot be missed
        let mut notifications = self
            .rpc
            .subscribe_utxos_changed(&[self.treasury_address.clone(), script_address.clone()])
            .await?;

        // a matured commit left behind by a failed reveal is spent instead of committing again
        let leftover = self
            .rpc
            .get_utxos_by_address(&script_address)
            .await?
            .into_iter()
            .filter(|u| u.amount > fees.reveal_fee)
            .max_by_key(|u| u.amount);

        let commit_utxo = match leftover {
            Some(entry) => {
                info!(
                    commit_id = %entry.outpoint.tx_id,
                    %script_address,
                    "Reusing unspent commit output"
                );
                entry
            }
            None => {
                let (commit, spent) = self
                    .signed_payment(&script_address, fees.commit_amount)
                    .await?;
                let commit_id = self.submit_payment(&commit, &spent).await?;
                info!(%commit_id, %script_address, ticker, amount, "Submitted token commit");

                match wait_for_utxo(
                    &mut notifications,
                    commit_id,
                    &script_address,
                    self.settings.commit_timeout,
                )
                .await
                {
                    Ok(Some(entry)) => entry,
                    Ok(None) => return Err(SettlementError::SubscriptionClosed),
                    Err(_) => {
                        warn!(%commit_id, "Commit not observed before deadline, reveal skipped");
                        return Err(SettlementError::CommitTimeout(self.settings.commit_timeout));
                    }
                }
            }
        };
        let commit_id = commit_utxo.outpoint.tx_id;
        debug!(%commit_id, amount = commit_utxo.amount, "Commit output matured");

        let reveal_value = commit_utxo
            .amount
            .checked_sub(fees.reveal_fee)
            .filter(|value| *value > 0)
            .ok_or(SettlementError::InsufficientFunds {
                needed: fees.reveal_fee,
                available: commit_utxo.amount,
            })?;

        let mut reveal = Transaction::new(
            vec![TransactionInput::new(commit_utxo.outpoint)],
            vec![TransactionOutput::to_address(&self.treasury_address, reveal_value)],
        );
        let sighash =
            reveal.signature_hash(0, &commit_utxo.script_public_key, commit_utxo.amount)?;
        let mut unlock = ScriptBuilder::new();
        unlock.add_data(&self.sign(&sighash)).add_data(&redeem_script);
        reveal.inputs[0].signature_script = unlock.into_script();

        let reveal_id = self.rpc.submit_transaction(&reveal).await?;
        info!(%reveal_id, %commit_id, %destination, "Submitted token reveal");

        match wait_for_utxo(
            &mut notifications,
            reveal_id,
            &self.treasury_address,
            self.settings.reveal_timeout,
        )
        .await
        {
            Ok(Some(_)) => Ok(reveal_id),
            Ok(None) => Err(SettlementError::SubscriptionClosed),
            Err(_) => Err(SettlementError::RevealTimeout(self.settings.reveal_timeout)),
        }
    }
}

/// Wait until a UTXO created by `tx_id` at `address` shows up.
///
/// The node only notifies outputs of accepted transactions, so an observed output
/// counts as mature; `block_daa_score` is not compared against a depth.
///
/// `Ok(None)` means the notification stream ended first.
async fn wait_for_utxo(
    notifications: &mut UnboundedReceiver<UtxosChanged>,
    tx_id: TxId,
    address: &Address,
    deadline: Duration,
) -> Result<Option<UtxoEntry>, tokio::time::error::Elapsed> {
    timeout(deadline, async {
        while let Some(change) = notifications.recv().await {
            if let Some(entry) = change
                .added
                .into_iter()
                .find(|e| e.outpoint.tx_id == tx_id && &e.address == address)
            {
                return Some(entry);
            }
        }
        None
    })
    .await
}

#[async_trait]
impl<L: LedgerRpc + 'static> PrizeSettlement for SettlementClient<L> {
    async fn send_native(&self, destination: &str, amount: u64) -> Result<String, SettlementError> {
        let destination = self.parse_destination(destination)?;
        self.with_session(|| self.native_transfer(&destination, amount))
            .await
            .map(|id| id.to_string())
    }

    async fn send_token(
        &self,
        destination: &str,
        amount: u64,
        ticker: &str,
    ) -> Result<String, SettlementError> {
        let destination = self.parse_destination(destination)?;
        self.with_session(|| self.token_transfer(&destination, amount, ticker))
            .await
            .map(|id| id.to_string())
    }

    async fn find_settlement(
        &self,
        destination: &str,
        amount: u64,
        ticker: Option<&str>,
    ) -> Result<Option<String>, SettlementError> {
        let destination = self.parse_destination(destination)?;
        let found = self
            .with_session(|| {
                self.rpc
                    .find_outbound_transfer(&self.treasury_address, &destination, amount, ticker)
            })
            .await?;
        Ok(found.map(|id| id.to_string()))
    }
}
