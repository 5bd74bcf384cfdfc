use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::raffle_error::SettlementError;
use crate::settlement::address::Address;
use crate::settlement::transaction::{Outpoint, Transaction, TxId, UtxoEntry};

/// UTXO-set change notification for subscribed addresses
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UtxosChanged {
    pub added: Vec<UtxoEntry>,
    pub removed: Vec<Outpoint>,
}

/// Connection to a ledger node
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn connect(&self) -> Result<(), SettlementError>;

    async fn disconnect(&self) -> Result<(), SettlementError>;

    async fn get_utxos_by_address(&self, address: &Address)
        -> Result<Vec<UtxoEntry>, SettlementError>;

    /// Broadcast a signed transaction, returning its id
    async fn submit_transaction(&self, transaction: &Transaction) -> Result<TxId, SettlementError>;

    /// Stream UTXO changes for the given addresses; dropping the receiver unsubscribes
    async fn subscribe_utxos_changed(
        &self,
        addresses: &[Address],
    ) -> Result<UnboundedReceiver<UtxosChanged>, SettlementError>;

    /// Look up an accepted outbound transfer from `from` to `to`.
    ///
    /// `ticker` selects token transfers known to the indexer; `None` means native.
    async fn find_outbound_transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: u64,
        ticker: Option<&str>,
    ) -> Result<Option<TxId>, SettlementError>;
}
