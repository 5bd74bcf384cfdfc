use std::fmt;
use std::str::FromStr;

use solana_sdk::{hash::hashv, pubkey::Pubkey};

use crate::raffle_error::SettlementError;
use crate::settlement::script::{OP_CHECKSIG, OP_DATA_32, OP_EQUAL, OP_SHA256};

/// Ledger network the treasury operates on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NetworkId {
    Mainnet,
    Testnet,
}

impl NetworkId {
    /// Human-readable prefix used in addresses
    pub fn prefix(&self) -> &'static str {
        match self {
            NetworkId::Mainnet => "kaspa",
            NetworkId::Testnet => "kaspatest",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "kaspa" => Some(NetworkId::Mainnet),
            "kaspatest" => Some(NetworkId::Testnet),
            _ => None,
        }
    }
}

impl FromStr for NetworkId {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(NetworkId::Mainnet),
            "testnet" => Ok(NetworkId::Testnet),
            other => Err(SettlementError::InvalidAddress(format!(
                "unknown network {}",
                other
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressVersion {
    /// Pays to a public key
    PubKey,
    /// Pays to the hash of a redeem script
    ScriptHash,
}

impl AddressVersion {
    fn tag(&self) -> char {
        match self {
            AddressVersion::PubKey => 'q',
            AddressVersion::ScriptHash => 'p',
        }
    }
}

/// Ledger address, rendered as `<prefix>:<version tag><base58 payload>`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    pub network: NetworkId,
    pub version: AddressVersion,
    pub payload: [u8; 32],
}

impl Address {
    pub fn pubkey(network: NetworkId, key: &Pubkey) -> Self {
        Self {
            network,
            version: AddressVersion::PubKey,
            payload: key.to_bytes(),
        }
    }

    /// Pay-to-script-hash address for a redeem script
    pub fn for_script(network: NetworkId, redeem_script: &[u8]) -> Self {
        Self {
            network,
            version: AddressVersion::ScriptHash,
            payload: hashv(&[redeem_script]).to_bytes(),
        }
    }

    /// Locking script for outputs paying this address
    pub fn script_public_key(&self) -> Vec<u8> {
        let mut script = Vec::with_capacity(35);
        match self.version {
            AddressVersion::PubKey => {
                script.push(OP_DATA_32);
                script.extend_from_slice(&self.payload);
                script.push(OP_CHECKSIG);
            }
            AddressVersion::ScriptHash => {
                script.push(OP_SHA256);
                script.push(OP_DATA_32);
                script.extend_from_slice(&self.payload);
                script.push(OP_EQUAL);
            }
        }
        script
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}{}",
            self.network.prefix(),
            self.version.tag(),
            Pubkey::new_from_array(self.payload)
        )
    }
}

impl FromStr for Address {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SettlementError::InvalidAddress(s.to_string());

        let (prefix, rest) = s.trim().split_once(':').ok_or_else(invalid)?;
        let network = NetworkId::from_prefix(prefix).ok_or_else(invalid)?;
        let mut chars = rest.chars();
        let version = match chars.next() {
            Some('q') => AddressVersion::PubKey,
            Some('p') => AddressVersion::ScriptHash,
            _ => return Err(invalid()),
        };
        let payload = Pubkey::from_str(chars.as_str()).map_err(|_| invalid())?;

        Ok(Self {
            network,
            version,
            payload: payload.to_bytes(),
        })
    }
}
