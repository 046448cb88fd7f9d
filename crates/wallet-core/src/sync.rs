// SPDX-License-Identifier: Apache-2.0
//! Synchronizer seam and the adapter that feeds its callbacks into the
//! wallet's own execution context.
//!
//! Callbacks may arrive on any task; the adapter gathers whatever must be
//! read synchronously (per-container totals, which the synchronizer
//! guarantees are present for the callback's transaction) and posts a
//! [`SyncNotification`] onto the wallet's dispatcher queue, where a single
//! worker applies them in arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;
use tx_builder::{AccountAddress, AccountKeys, Hash, PublicKey, Transaction};

use crate::container::{ContainerId, TransfersContainer};
use crate::model::{ContainerAmounts, TransactionInfo};
use crate::node::NodeError;

/// Everything the synchronizer needs to scan for one address.
#[derive(Clone)]
pub struct AccountSubscription {
    pub keys: AccountKeys,
    pub sync_start_height: u32,
    pub sync_start_timestamp: u64,
    /// Extra confirmations before an output counts as spendable.
    pub transaction_spendable_age: u32,
}

/// Commands the wallet issues towards the synchronizer subsystem.
#[async_trait]
pub trait TransfersSynchronizer: Send + Sync {
    fn add_subscription(&self, subscription: AccountSubscription) -> ContainerId;

    fn remove_subscription(&self, address: &AccountAddress);

    fn subscriptions(&self) -> Vec<AccountAddress>;

    fn container(&self, id: ContainerId) -> Option<Arc<dyn TransfersContainer>>;

    /// Block hashes already processed for this view key.
    fn view_key_known_blocks(&self, view_public: &PublicKey) -> Vec<Hash>;

    async fn add_unconfirmed_transaction(&self, transaction: &Transaction)
        -> Result<(), NodeError>;

    async fn remove_unconfirmed_transaction(&self, hash: &Hash);

    /// Idempotent by flag on both sides.
    fn start(&self);
    fn stop(&self);
}

/// Work item queued from a synchronizer callback.
#[derive(Clone, Debug)]
pub enum SyncNotification {
    BlocksAdded(Vec<Hash>),
    ChainDetached { height: u32 },
    ProgressUpdated { processed: u32, total: u32 },
    Completed,
    TransactionUpdated {
        info: TransactionInfo,
        amounts: Vec<ContainerAmounts>,
    },
    TransactionDeleted { container: ContainerId, hash: Hash },
}

/// Observer handed to the synchronizer; every callback becomes a queued
/// notification.
#[derive(Clone)]
pub struct SyncAdapter {
    synchronizer: Arc<dyn TransfersSynchronizer>,
    queue: mpsc::UnboundedSender<SyncNotification>,
}

impl SyncAdapter {
    pub(crate) fn new(
        synchronizer: Arc<dyn TransfersSynchronizer>,
        queue: mpsc::UnboundedSender<SyncNotification>,
    ) -> Self {
        Self {
            synchronizer,
            queue,
        }
    }

    fn post(&self, notification: SyncNotification) {
        // The wallet dropping its receiver means it shut down; late
        // callbacks are then no-ops by design of the stop contract.
        let _ = self.queue.send(notification);
    }

    pub fn blocks_added(&self, block_hashes: Vec<Hash>) {
        self.post(SyncNotification::BlocksAdded(block_hashes));
    }

    pub fn blockchain_detached(&self, height: u32) {
        self.post(SyncNotification::ChainDetached { height });
    }

    pub fn synchronization_progress_updated(&self, processed: u32, total: u32) {
        self.post(SyncNotification::ProgressUpdated { processed, total });
    }

    pub fn synchronization_completed(&self) {
        self.post(SyncNotification::Completed);
    }

    /// Gather per-container totals while the synchronizer still guarantees
    /// the transaction is present, then queue the update.
    pub fn transaction_updated(&self, hash: &Hash, containers: &[ContainerId]) {
        let mut info: Option<TransactionInfo> = None;
        let mut amounts = Vec::with_capacity(containers.len());

        for id in containers {
            let Some(container) = self.synchronizer.container(*id) else {
                warn!(container = id.0, "transaction update for unknown container");
                continue;
            };
            let Some(tx) = container.transaction_information(hash) else {
                warn!(%hash, container = id.0, "container lost transaction mid-callback");
                continue;
            };

            amounts.push(ContainerAmounts {
                container: *id,
                input: -(tx.inputs_amount as i64),
                output: tx.outputs_amount as i64,
            });
            info.get_or_insert(tx.info);
        }

        if let Some(info) = info {
            self.post(SyncNotification::TransactionUpdated { info, amounts });
        }
    }

    pub fn transaction_deleted(&self, container: ContainerId, hash: &Hash) {
        self.post(SyncNotification::TransactionDeleted {
            container,
            hash: *hash,
        });
    }
}

/// Ordered chain of seen block hashes with lookup by hash.
#[derive(Default)]
pub struct BlockHashChain {
    hashes: Vec<Hash>,
    index_by_hash: HashMap<Hash, u32>,
}

impl BlockHashChain {
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn get(&self, height: u32) -> Option<Hash> {
        self.hashes.get(height as usize).copied()
    }

    pub fn height_of(&self, hash: &Hash) -> Option<u32> {
        self.index_by_hash.get(hash).copied()
    }

    pub fn hashes(&self, start_height: u32, count: usize) -> Vec<Hash> {
        let start = start_height as usize;
        if start >= self.hashes.len() {
            return Vec::new();
        }
        let end = self.hashes.len().min(start + count);
        self.hashes[start..end].to_vec()
    }

    pub fn extend(&mut self, new_hashes: impl IntoIterator<Item = Hash>) {
        for hash in new_hashes {
            let height = self.hashes.len() as u32;
            self.hashes.push(hash);
            self.index_by_hash.insert(hash, height);
        }
    }

    /// Drop every hash at `height` and above.
    pub fn detach(&mut self, height: u32) {
        while self.hashes.len() > height as usize {
            if let Some(hash) = self.hashes.pop() {
                self.index_by_hash.remove(&hash);
            }
        }
    }

    pub fn reset_to(&mut self, genesis: Hash) {
        self.hashes.clear();
        self.index_by_hash.clear();
        self.extend([genesis]);
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
        self.index_by_hash.clear();
    }

    pub fn snapshot(&self) -> Vec<Hash> {
        self.hashes.clone()
    }
}
