// SPDX-License-Identifier: Apache-2.0
//! View identity and the set of spend records.

use std::collections::HashMap;

use tx_builder::{AccountAddress, AccountKeys, PublicKey, SecretKey};

use crate::container::ContainerId;
use crate::error::{Result, WalletError};

/// The single view key pair every address of the wallet shares.
#[derive(Clone)]
pub struct ViewIdentity {
    pub public: PublicKey,
    pub secret: SecretKey,
}

/// One owned address. A missing spend secret makes it a tracking record.
#[derive(Clone)]
pub struct SpendRecord {
    pub spend_public: PublicKey,
    pub spend_secret: Option<SecretKey>,
    pub container: ContainerId,
    pub actual_balance: u64,
    pub pending_balance: u64,
    pub creation_timestamp: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackingMode {
    NoAddresses,
    Tracking,
    Spending,
}

/// Spend records in insertion order with key and container lookups.
#[derive(Default)]
pub struct KeyStore {
    records: Vec<SpendRecord>,
    by_spend_key: HashMap<PublicKey, usize>,
    by_container: HashMap<ContainerId, usize>,
}

impl KeyStore {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn tracking_mode(&self) -> TrackingMode {
        match self.records.first() {
            None => TrackingMode::NoAddresses,
            Some(record) if record.spend_secret.is_none() => TrackingMode::Tracking,
            Some(_) => TrackingMode::Spending,
        }
    }

    /// Mixing tracking and spending records is rejected up front, as is a
    /// duplicate spend key.
    pub fn insert(&mut self, record: SpendRecord) -> Result<()> {
        match (self.tracking_mode(), record.spend_secret.is_some()) {
            (TrackingMode::Tracking, true) | (TrackingMode::Spending, false) => {
                return Err(WalletError::BadAddress(
                    "cannot mix tracking and spending addresses".into(),
                ))
            }
            _ => {}
        }
        if self.by_spend_key.contains_key(&record.spend_public) {
            return Err(WalletError::AddressAlreadyExists);
        }

        let index = self.records.len();
        self.by_spend_key.insert(record.spend_public, index);
        self.by_container.insert(record.container, index);
        self.records.push(record);
        Ok(())
    }

    pub fn remove(&mut self, spend_public: &PublicKey) -> Result<SpendRecord> {
        let index = *self
            .by_spend_key
            .get(spend_public)
            .ok_or_else(|| WalletError::ObjectNotFound("address".into()))?;
        let record = self.records.remove(index);
        self.rebuild_indexes();
        Ok(record)
    }

    fn rebuild_indexes(&mut self) {
        self.by_spend_key.clear();
        self.by_container.clear();
        for (index, record) in self.records.iter().enumerate() {
            self.by_spend_key.insert(record.spend_public, index);
            self.by_container.insert(record.container, index);
        }
    }

    pub fn get(&self, index: usize) -> Option<&SpendRecord> {
        self.records.get(index)
    }

    pub fn by_spend_key(&self, spend_public: &PublicKey) -> Result<&SpendRecord> {
        self.by_spend_key
            .get(spend_public)
            .map(|index| &self.records[*index])
            .ok_or(WalletError::WalletNotFound)
    }

    pub fn by_container(&self, container: ContainerId) -> Option<&SpendRecord> {
        self.by_container
            .get(&container)
            .map(|index| &self.records[*index])
    }

    pub fn by_container_mut(&mut self, container: ContainerId) -> Option<&mut SpendRecord> {
        self.by_container
            .get(&container)
            .map(|index| &mut self.records[*index])
    }

    pub fn contains(&self, spend_public: &PublicKey) -> bool {
        self.by_spend_key.contains_key(spend_public)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpendRecord> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.by_spend_key.clear();
        self.by_container.clear();
    }

    pub fn account_keys(&self, record: &SpendRecord, view: &ViewIdentity) -> AccountKeys {
        AccountKeys {
            address: AccountAddress {
                spend_public: record.spend_public,
                view_public: view.public,
            },
            view_secret: view.secret.clone(),
            spend_secret: record.spend_secret.clone(),
        }
    }
}
