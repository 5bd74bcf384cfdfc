//! Script construction for the commit/reveal token transfer.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::raffle_error::SettlementError;
use crate::settlement::address::Address;

pub const OP_FALSE: u8 = 0x00;
pub const OP_DATA_32: u8 = 0x20;
pub const OP_DATA_75: u8 = 0x4b;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_IF: u8 = 0x63;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_SHA256: u8 = 0xa8;
pub const OP_CHECKSIG: u8 = 0xac;

/// Marker pushed ahead of the envelope so indexers recognise it
pub const PROTOCOL_MARKER: &[u8] = b"kasplex";

/// Token protocol tag carried in the envelope
pub const PROTOCOL_TAG: &str = "krc-20";

#[derive(Debug, Default, Clone)]
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_op(&mut self, opcode: u8) -> &mut Self {
        self.script.push(opcode);
        self
    }

    /// Push data with the smallest push opcode that fits
    pub fn add_data(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len();
        if len == 0 {
            self.script.push(OP_FALSE);
            return self;
        }
        if len <= OP_DATA_75 as usize {
            self.script.push(len as u8);
        } else if len <= u8::MAX as usize {
            self.script.push(OP_PUSHDATA1);
            self.script.push(len as u8);
        } else if len <= u16::MAX as usize {
            self.script.push(OP_PUSHDATA2);
            self.script.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.script.push(OP_PUSHDATA4);
            self.script.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.script.extend_from_slice(data);
        self
    }

    pub fn script(&self) -> &[u8] {
        &self.script
    }

    pub fn into_script(self) -> Vec<u8> {
        self.script
    }
}

/// Token transfer intent embedded in the commit script
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TransferEnvelope {
    #[serde(rename = "p")]
    pub protocol: String,
    pub op: String,
    pub tick: String,
    /// Amount in token base units, as a decimal string
    pub amt: String,
    pub to: String,
}

impl TransferEnvelope {
    pub fn transfer(ticker: &str, amount: u64, destination: &Address) -> Self {
        Self {
            protocol: PROTOCOL_TAG.to_string(),
            op: "transfer".to_string(),
            tick: ticker.trim().to_lowercase(),
            amt: amount.to_string(),
            to: destination.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, SettlementError> {
        serde_json::to_vec(self).map_err(|e| SettlementError::Encoding(e.to_string()))
    }
}

/// Redeem script: spendable only with the treasury signature, carrying the
/// envelope in an unexecuted `OP_FALSE OP_IF ... OP_ENDIF` branch.
pub fn commit_script(
    treasury: &Pubkey,
    envelope: &TransferEnvelope,
) -> Result<Vec<u8>, SettlementError> {
    let payload = envelope.to_json()?;
    let mut builder = ScriptBuilder::new();
    builder
        .add_data(treasury.as_ref())
        .add_op(OP_CHECKSIG)
        .add_op(OP_FALSE)
        .add_op(OP_IF)
        .add_data(PROTOCOL_MARKER)
        .add_op(OP_FALSE)
        .add_data(&payload)
        .add_op(OP_ENDIF);
    Ok(builder.into_script())
}
