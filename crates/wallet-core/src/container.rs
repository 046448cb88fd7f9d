// SPDX-License-Identifier: Apache-2.0
//! Per-address output container seam.
//!
//! Containers are owned and mutated by the transfers synchronizer; the wallet
//! only ever reads them, addressing each one through an opaque [`ContainerId`]
//! handed out at subscription time.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tx_builder::{Hash, PublicKey};

use crate::model::TransactionInfo;

/// Stable handle into the synchronizer's container registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub u32);

/// An owned unspent output as the container reports it.
#[derive(Clone, Copy, Debug)]
pub struct SpendableOutput {
    pub amount: u64,
    pub global_index: u32,
    pub index_in_tx: u32,
    pub tx_public_key: PublicKey,
    pub output_key: PublicKey,
    pub tx_hash: Hash,
}

#[derive(Clone, Debug)]
pub struct ContainerTransaction {
    pub info: TransactionInfo,
    pub inputs_amount: u64,
    pub outputs_amount: u64,
}

pub trait TransfersContainer: Send + Sync {
    /// Total of unlocked, unspent outputs.
    fn available_unlocked(&self) -> u64;

    /// Total of still-locked, unspent outputs.
    fn available_locked(&self) -> u64;

    /// Unlocked outputs eligible for spending.
    fn spendable_outputs(&self) -> Vec<SpendableOutput>;

    /// Everything the container knows about one transaction.
    fn transaction_information(&self, hash: &Hash) -> Option<ContainerTransaction>;

    /// This container's outputs created by `hash`, any lock state.
    fn transaction_outputs(&self, hash: &Hash) -> Vec<SpendableOutput>;

    /// This container's outputs consumed by `hash`.
    fn transaction_inputs(&self, hash: &Hash) -> Vec<SpendableOutput>;
}

struct TrackedOutput {
    output: SpendableOutput,
    unlock_height: u32,
    spent_by: Option<Hash>,
}

#[derive(Default)]
struct MemoryContainerInner {
    current_height: u32,
    outputs: Vec<TrackedOutput>,
    transactions: HashMap<Hash, ContainerTransaction>,
}

/// Reference container: a height-aware output set behind an `RwLock`.
/// In-process synchronizers (and the test harness) mutate it; the wallet
/// reads it through the [`TransfersContainer`] trait like any other.
#[derive(Default)]
pub struct MemoryContainer {
    inner: RwLock<MemoryContainerInner>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_height(&self, height: u32) {
        self.inner.write().current_height = height;
    }

    pub fn credit(&self, output: SpendableOutput, unlock_height: u32) {
        self.inner.write().outputs.push(TrackedOutput {
            output,
            unlock_height,
            spent_by: None,
        });
    }

    pub fn mark_spent(&self, global_index: u32, spender: Hash) {
        let mut inner = self.inner.write();
        for tracked in &mut inner.outputs {
            if tracked.output.global_index == global_index {
                tracked.spent_by = Some(spender);
            }
        }
    }

    pub fn put_transaction(&self, transaction: ContainerTransaction) {
        let mut inner = self.inner.write();
        inner
            .transactions
            .insert(transaction.info.hash, transaction);
    }

    /// Drop a transaction and undo its effects, as a pool eviction or reorg
    /// would.
    pub fn forget_transaction(&self, hash: &Hash) {
        let mut inner = self.inner.write();
        inner.transactions.remove(hash);
        inner.outputs.retain(|t| t.output.tx_hash != *hash);
        for tracked in &mut inner.outputs {
            if tracked.spent_by == Some(*hash) {
                tracked.spent_by = None;
            }
        }
    }
}

impl TransfersContainer for MemoryContainer {
    fn available_unlocked(&self) -> u64 {
        let inner = self.inner.read();
        inner
            .outputs
            .iter()
            .filter(|t| t.spent_by.is_none() && t.unlock_height <= inner.current_height)
            .map(|t| t.output.amount)
            .sum()
    }

    fn available_locked(&self) -> u64 {
        let inner = self.inner.read();
        inner
            .outputs
            .iter()
            .filter(|t| t.spent_by.is_none() && t.unlock_height > inner.current_height)
            .map(|t| t.output.amount)
            .sum()
    }

    fn spendable_outputs(&self) -> Vec<SpendableOutput> {
        let inner = self.inner.read();
        inner
            .outputs
            .iter()
            .filter(|t| t.spent_by.is_none() && t.unlock_height <= inner.current_height)
            .map(|t| t.output)
            .collect()
    }

    fn transaction_information(&self, hash: &Hash) -> Option<ContainerTransaction> {
        self.inner.read().transactions.get(hash).cloned()
    }

    fn transaction_outputs(&self, hash: &Hash) -> Vec<SpendableOutput> {
        self.inner
            .read()
            .outputs
            .iter()
            .filter(|t| t.output.tx_hash == *hash)
            .map(|t| t.output)
            .collect()
    }

    fn transaction_inputs(&self, hash: &Hash) -> Vec<SpendableOutput> {
        self.inner
            .read()
            .outputs
            .iter()
            .filter(|t| t.spent_by == Some(*hash))
            .map(|t| t.output)
            .collect()
    }
}
