// Raffle Settlement - Errors
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the raffle record itself
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RaffleError {
    /// Creation parameters failed validation
    #[error("Invalid raffle parameters: {0}")]
    InvalidParameters(String),

    /// Raffle is not accepting entries
    #[error("Raffle {0} is no longer live")]
    RaffleNotLive(String),

    /// Deposit amount must be positive
    #[error("Entry amount must be greater than zero")]
    EntryAmountTooLow,

    /// Deposit transaction was already credited
    #[error("Deposit {0} has already been processed")]
    DuplicateDeposit(String),
}

/// Errors returned by the raffle store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Backing store could not be reached
    #[error("Raffle store unavailable: {0}")]
    Unavailable(String),

    /// No raffle with this id
    #[error("Raffle {0} not found")]
    NotFound(String),

    /// Raffle id already taken
    #[error("Raffle {0} already exists")]
    AlreadyExists(String),

    /// Record could not be encoded or decoded
    #[error("Raffle record encoding failed: {0}")]
    Encoding(String),
}

/// Errors returned while executing an outbound payment
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementError {
    /// Treasury UTXO set cannot cover amount plus fees
    #[error("Insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// Ledger rejected the transaction
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// Connection to the ledger node failed
    #[error("Ledger network error: {0}")]
    Network(String),

    /// Commit transaction did not mature before the deadline
    #[error("Commit transaction not observed within {0:?}")]
    CommitTimeout(Duration),

    /// Reveal transaction did not mature before the deadline
    #[error("Reveal transaction not observed within {0:?}")]
    RevealTimeout(Duration),

    /// Notification stream ended while waiting for a UTXO
    #[error("UTXO notification stream closed")]
    SubscriptionClosed,

    /// Destination could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Transaction or payload could not be built
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl SettlementError {
    /// True when the transaction may have reached the ledger despite the error.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            SettlementError::Network(_)
                | SettlementError::CommitTimeout(_)
                | SettlementError::RevealTimeout(_)
                | SettlementError::SubscriptionClosed
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SettlementError::CommitTimeout(_) | SettlementError::RevealTimeout(_)
        )
    }
}

/// Errors returned by the prize dispersal coordinator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispersalError {
    /// Raffle is not in a dispersable state
    #[error("Invalid dispersal input for raffle {raffle_id}: {reason}")]
    Validation { raffle_id: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while loading process configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required variable not set
    #[error("Missing configuration variable {0}")]
    Missing(&'static str),

    /// Variable set but not parseable
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    /// Keypair file could not be read
    #[error("Unable to read treasury keypair from {path}: {reason}")]
    Keypair { path: String, reason: String },

    /// Configured treasury address does not belong to the keypair
    #[error("Treasury address {configured} does not match keypair address {derived}")]
    TreasuryMismatch { configured: String, derived: String },
}
