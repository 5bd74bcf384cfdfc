// Raffle Settlement - Configuration
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signature::{read_keypair_file, Keypair, Signer};

use crate::raffle_error::ConfigError;
use crate::settlement::{Address, FeeSchedule, NetworkId, SettlementSettings};

pub const ENV_NETWORK: &str = "RAFFLE_NETWORK";
pub const ENV_TREASURY_ADDRESS: &str = "RAFFLE_TREASURY_ADDRESS";
pub const ENV_TREASURY_KEYPAIR: &str = "RAFFLE_TREASURY_KEYPAIR";
pub const ENV_SCHEDULER_INTERVAL_SECS: &str = "RAFFLE_SCHEDULER_INTERVAL_SECS";
pub const ENV_COMMIT_TIMEOUT_SECS: &str = "RAFFLE_COMMIT_TIMEOUT_SECS";
pub const ENV_REVEAL_TIMEOUT_SECS: &str = "RAFFLE_REVEAL_TIMEOUT_SECS";
pub const ENV_PRIORITY_FEE: &str = "RAFFLE_PRIORITY_FEE";
pub const ENV_COMMIT_AMOUNT: &str = "RAFFLE_COMMIT_AMOUNT";
pub const ENV_REVEAL_FEE: &str = "RAFFLE_REVEAL_FEE";

const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 60;

/// Process-wide settings, read once at start-up
pub struct Config {
    pub treasury: Arc<Keypair>,
    pub treasury_address: Address,
    pub scheduler_interval: Duration,
    pub settlement: SettlementSettings,
}

impl Config {
    /// Load from the environment, after applying a `.env` file if present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let network = match lookup(ENV_NETWORK) {
            Some(value) => NetworkId::from_str(&value).map_err(|_| ConfigError::Invalid {
                name: ENV_NETWORK,
                value,
            })?,
            None => NetworkId::Mainnet,
        };

        let keypair_path =
            lookup(ENV_TREASURY_KEYPAIR).ok_or(ConfigError::Missing(ENV_TREASURY_KEYPAIR))?;
        let treasury = read_keypair_file(&keypair_path).map_err(|e| ConfigError::Keypair {
            path: keypair_path.clone(),
            reason: e.to_string(),
        })?;
        let derived = Address::pubkey(network, &treasury.pubkey());

        let configured =
            lookup(ENV_TREASURY_ADDRESS).ok_or(ConfigError::Missing(ENV_TREASURY_ADDRESS))?;
        let treasury_address =
            Address::from_str(&configured).map_err(|_| ConfigError::Invalid {
                name: ENV_TREASURY_ADDRESS,
                value: configured.clone(),
            })?;
        if treasury_address != derived {
            return Err(ConfigError::TreasuryMismatch {
                configured,
                derived: derived.to_string(),
            });
        }

        let defaults = SettlementSettings::default();
        let fees = FeeSchedule {
            priority_fee: parse_or(&lookup, ENV_PRIORITY_FEE, defaults.fees.priority_fee)?,
            commit_amount: parse_or(&lookup, ENV_COMMIT_AMOUNT, defaults.fees.commit_amount)?,
            reveal_fee: parse_or(&lookup, ENV_REVEAL_FEE, defaults.fees.reveal_fee)?,
        };
        if fees.reveal_fee >= fees.commit_amount {
            return Err(ConfigError::Invalid {
                name: ENV_REVEAL_FEE,
                value: fees.reveal_fee.to_string(),
            });
        }

        let settlement = SettlementSettings {
            network,
            fees,
            commit_timeout: seconds_or(
                &lookup,
                ENV_COMMIT_TIMEOUT_SECS,
                defaults.commit_timeout.as_secs(),
            )?,
            reveal_timeout: seconds_or(
                &lookup,
                ENV_REVEAL_TIMEOUT_SECS,
                defaults.reveal_timeout.as_secs(),
            )?,
        };

        Ok(Self {
            treasury: Arc::new(treasury),
            treasury_address,
            scheduler_interval: seconds_or(
                &lookup,
                ENV_SCHEDULER_INTERVAL_SECS,
                DEFAULT_SCHEDULER_INTERVAL_SECS,
            )?,
            settlement,
        })
    }
}

fn parse_or<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn seconds_or<F>(lookup: &F, name: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_or(lookup, name, default)?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
