// Raffle Settlement - Raffle Store
use std::collections::HashMap;

use async_trait::async_trait;
use borsh::BorshDeserialize;
use solana_sdk::clock::UnixTimestamp;
use tokio::sync::RwLock;

use crate::raffle_error::StoreError;
use crate::raffle_state::{Raffle, RaffleStatus};
use crate::selector::Selection;

/// Persistence boundary for raffle records
#[async_trait]
pub trait RaffleStore: Send + Sync {
    async fn get(&self, raffle_id: &str) -> Result<Raffle, StoreError>;

    async fn insert(&self, raffle: &Raffle) -> Result<(), StoreError>;

    /// Overwrite an existing record
    async fn save(&self, raffle: &Raffle) -> Result<(), StoreError>;

    /// Live raffles whose deadline is at or before `now`
    async fn find_expired_live(&self, now: UnixTimestamp) -> Result<Vec<Raffle>, StoreError>;

    /// Completed raffles with resolved winners that are not fully paid
    async fn find_undispersed(&self) -> Result<Vec<Raffle>, StoreError>;

    /// Atomically move a live raffle to completed with the given selection.
    ///
    /// Returns `None` when the raffle was no longer live.
    async fn complete_if_live(
        &self,
        raffle_id: &str,
        selection: &Selection,
        now: UnixTimestamp,
    ) -> Result<Option<Raffle>, StoreError>;
}

/// In-process store holding borsh-encoded records
#[derive(Default)]
pub struct MemoryRaffleStore {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

fn encode(raffle: &Raffle) -> Result<Vec<u8>, StoreError> {
    borsh::to_vec(raffle).map_err(|e| StoreError::Encoding(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Raffle, StoreError> {
    Raffle::try_from_slice(bytes).map_err(|e| StoreError::Encoding(e.to_string()))
}

impl MemoryRaffleStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn scan<F>(&self, predicate: F) -> Result<Vec<Raffle>, StoreError>
    where
        F: Fn(&Raffle) -> bool + Send,
    {
        let records = self.records.read().await;
        let mut matches = Vec::new();
        for bytes in records.values() {
            let raffle = decode(bytes)?;
            if predicate(&raffle) {
                matches.push(raffle);
            }
        }
        // HashMap order is arbitrary; keep scans reproducible
        matches.sort_by(|a, b| {
            a.time_frame
                .cmp(&b.time_frame)
                .then_with(|| a.raffle_id.cmp(&b.raffle_id))
        });
        Ok(matches)
    }
}

#[async_trait]
impl RaffleStore for MemoryRaffleStore {
    async fn get(&self, raffle_id: &str) -> Result<Raffle, StoreError> {
        let records = self.records.read().await;
        let bytes = records
            .get(raffle_id)
            .ok_or_else(|| StoreError::NotFound(raffle_id.to_string()))?;
        decode(bytes)
    }

    async fn insert(&self, raffle: &Raffle) -> Result<(), StoreError> {
        let bytes = encode(raffle)?;
        let mut records = self.records.write().await;
        if records.contains_key(&raffle.raffle_id) {
            return Err(StoreError::AlreadyExists(raffle.raffle_id.clone()));
        }
        records.insert(raffle.raffle_id.clone(), bytes);
        Ok(())
    }

    async fn save(&self, raffle: &Raffle) -> Result<(), StoreError> {
        let bytes = encode(raffle)?;
        let mut records = self.records.write().await;
        match records.get_mut(&raffle.raffle_id) {
            Some(slot) => {
                *slot = bytes;
                Ok(())
            }
            None => Err(StoreError::NotFound(raffle.raffle_id.clone())),
        }
    }

    async fn find_expired_live(&self, now: UnixTimestamp) -> Result<Vec<Raffle>, StoreError> {
        self.scan(|r| r.status == RaffleStatus::Live && r.time_frame <= now)
            .await
    }

    async fn find_undispersed(&self) -> Result<Vec<Raffle>, StoreError> {
        self.scan(Raffle::awaiting_dispersal).await
    }

    async fn complete_if_live(
        &self,
        raffle_id: &str,
        selection: &Selection,
        now: UnixTimestamp,
    ) -> Result<Option<Raffle>, StoreError> {
        // write lock spans the check and the set
        let mut records = self.records.write().await;
        let slot = records
            .get_mut(raffle_id)
            .ok_or_else(|| StoreError::NotFound(raffle_id.to_string()))?;
        let mut raffle = decode(slot)?;
        if !raffle.complete(selection, now) {
            return Ok(None);
        }
        *slot = encode(&raffle)?;
        Ok(Some(raffle))
    }
}
