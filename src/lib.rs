// Raffle Settlement
// Completes time-boxed raffles, draws weighted winners and pays prizes from the treasury wallet

pub mod config;
pub mod dispersal;
pub mod raffle_error;
pub mod raffle_processor;
pub mod raffle_state;
pub mod scheduler;
pub mod selector;
pub mod settlement;
pub mod store;
pub mod utils;

pub use config::Config;
pub use dispersal::{DispersalOutcome, PrizeDispersal};
pub use raffle_processor::{PassReport, RaffleProcessor};
pub use raffle_state::{CoinType, NewRaffle, Raffle, RaffleStatus, NO_ENTRIES};
pub use scheduler::{PassOutcome, Scheduler};
pub use selector::{select_winners, Selection};
pub use settlement::{PrizeSettlement, SettlementClient};
pub use store::{MemoryRaffleStore, RaffleStore};
