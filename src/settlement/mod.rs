//! Outbound prize payments from the treasury wallet.
//!
//! Native prizes are a single signed transaction. Token prizes use commit/reveal:
//! the commit locks a small amount under a script carrying the transfer envelope,
//! the reveal spends it back to the treasury and is what indexers read as the transfer.

pub mod address;
pub mod client;
pub mod rpc;
pub mod script;
pub mod transaction;

use async_trait::async_trait;

use crate::raffle_error::SettlementError;

pub use address::{Address, AddressVersion, NetworkId};
pub use client::{FeeSchedule, SettlementClient, SettlementSettings};
pub use rpc::{LedgerRpc, UtxosChanged};
pub use transaction::{Outpoint, Transaction, TxId, UtxoEntry};

/// Payment capability used by the dispersal coordinator
#[async_trait]
pub trait PrizeSettlement: Send + Sync {
    /// Pay `amount` base units of the native coin; returns the transaction id
    async fn send_native(&self, destination: &str, amount: u64) -> Result<String, SettlementError>;

    /// Transfer `amount` token base units; returns the reveal transaction id
    async fn send_token(
        &self,
        destination: &str,
        amount: u64,
        ticker: &str,
    ) -> Result<String, SettlementError>;

    /// Find an already accepted payment matching these terms
    async fn find_settlement(
        &self,
        destination: &str,
        amount: u64,
        ticker: Option<&str>,
    ) -> Result<Option<String>, SettlementError>;
}
