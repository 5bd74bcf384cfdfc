use std::fmt;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::hash::{hashv, Hash};

use crate::raffle_error::SettlementError;
use crate::settlement::address::Address;

/// Appended to every signature: the hash commits to all inputs and outputs
pub const SIGHASH_ALL: u8 = 0x01;

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TxId(pub [u8; 32]);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Hash::new_from_array(self.0))
    }
}

impl FromStr for TxId {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_str(s)
            .map(|h| TxId(h.to_bytes()))
            .map_err(|e| SettlementError::Encoding(format!("transaction id {}: {}", s, e)))
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Outpoint {
    pub tx_id: TxId,
    pub index: u32,
}

/// Spendable output as reported by the ledger node
#[derive(Clone, Debug, PartialEq)]
pub struct UtxoEntry {
    pub outpoint: Outpoint,
    pub address: Address,
    pub amount: u64,
    pub script_public_key: Vec<u8>,
    pub block_daa_score: u64,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq)]
pub struct TransactionInput {
    pub previous_outpoint: Outpoint,
    pub signature_script: Vec<u8>,
    pub sequence: u64,
}

impl TransactionInput {
    pub fn new(previous_outpoint: Outpoint) -> Self {
        Self {
            previous_outpoint,
            signature_script: Vec::new(),
            sequence: 0,
        }
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq)]
pub struct TransactionOutput {
    pub value: u64,
    pub script_public_key: Vec<u8>,
}

impl TransactionOutput {
    pub fn to_address(address: &Address, value: u64) -> Self {
        Self {
            value,
            script_public_key: address.script_public_key(),
        }
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq)]
pub struct Transaction {
    pub version: u16,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u64,
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn new(inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>) -> Self {
        Self {
            version: 0,
            inputs,
            outputs,
            lock_time: 0,
            payload: Vec::new(),
        }
    }

    /// Encoding with signature scripts blanked, shared by id and sighash
    fn unsigned_bytes(&self) -> Result<Vec<u8>, SettlementError> {
        let mut stripped = self.clone();
        for input in stripped.inputs.iter_mut() {
            input.signature_script.clear();
        }
        borsh::to_vec(&stripped).map_err(|e| SettlementError::Encoding(e.to_string()))
    }

    /// Transaction id; stable across signing
    pub fn id(&self) -> Result<TxId, SettlementError> {
        let bytes = self.unsigned_bytes()?;
        Ok(TxId(hashv(&[b"txid", &bytes]).to_bytes()))
    }

    /// Digest signed for input `index`, committing to the spent output
    pub fn signature_hash(
        &self,
        index: usize,
        spent_script: &[u8],
        spent_amount: u64,
    ) -> Result<[u8; 32], SettlementError> {
        if index >= self.inputs.len() {
            return Err(SettlementError::Encoding(format!(
                "input {} out of range",
                index
            )));
        }
        let bytes = self.unsigned_bytes()?;
        Ok(hashv(&[
            b"sighash",
            &bytes,
            &(index as u32).to_le_bytes(),
            spent_script,
            &spent_amount.to_le_bytes(),
            &[SIGHASH_ALL],
        ])
        .to_bytes())
    }

    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Index of the first output locked by `address`
    pub fn output_index_for(&self, address: &Address) -> Option<u32> {
        let script = address.script_public_key();
        self.outputs
            .iter()
            .position(|o| o.script_public_key == script)
            .map(|i| i as u32)
    }
}

/// Pick UTXOs largest-first until `target` is covered
pub fn select_utxos(utxos: &[UtxoEntry], target: u64) -> Result<Vec<UtxoEntry>, SettlementError> {
    let mut candidates: Vec<&UtxoEntry> = utxos.iter().collect();
    candidates.sort_by(|a, b| b.amount.cmp(&a.amount));

    let mut selected = Vec::new();
    let mut total: u64 = 0;
    for utxo in candidates {
        if total >= target {
            break;
        }
        total = total.saturating_add(utxo.amount);
        selected.push(utxo.clone());
    }

    if total < target {
        return Err(SettlementError::InsufficientFunds {
            needed: target,
            available: total,
        });
    }
    Ok(selected)
}

/// Unsigned payment of `amount` to `destination` plus `fee`, change back to `change`.
///
/// Returns the transaction together with the entries it spends, in input order.
pub fn build_payment(
    utxos: &[UtxoEntry],
    destination: &Address,
    amount: u64,
    fee: u64,
    change: &Address,
) -> Result<(Transaction, Vec<UtxoEntry>), SettlementError> {
    let target = amount
        .checked_add(fee)
        .ok_or_else(|| SettlementError::Encoding("payment amount overflow".to_string()))?;
    let spent = select_utxos(utxos, target)?;
    let funded: u64 = spent.iter().map(|u| u.amount).sum();

    let inputs = spent
        .iter()
        .map(|u| TransactionInput::new(u.outpoint))
        .collect();
    let mut outputs = vec![TransactionOutput::to_address(destination, amount)];
    let change_value = funded - target;
    if change_value > 0 {
        outputs.push(TransactionOutput::to_address(change, change_value));
    }

    Ok((Transaction::new(inputs, outputs), spent))
}
