// SPDX-License-Identifier: Apache-2.0
//! Pending → spendable transitions keyed by unlock block height.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tx_builder::Hash;

use crate::container::ContainerId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockJob {
    pub container: ContainerId,
    pub transaction_hash: Hash,
}

/// Multiset of unlock jobs ordered by block height.
#[derive(Default, Serialize, Deserialize)]
pub struct UnlockScheduler {
    jobs: BTreeMap<u32, Vec<UnlockJob>>,
}

impl UnlockScheduler {
    pub fn insert(&mut self, unlock_height: u32, container: ContainerId, transaction_hash: Hash) {
        self.jobs.entry(unlock_height).or_default().push(UnlockJob {
            container,
            transaction_hash,
        });
    }

    /// Remove and return every job with unlock height `<= height`.
    pub fn drain_through(&mut self, height: u32) -> Vec<UnlockJob> {
        let Some(next_height) = height.checked_add(1) else {
            let all: Vec<UnlockJob> =
                std::mem::take(&mut self.jobs).into_values().flatten().collect();
            return all;
        };
        let keep = self.jobs.split_off(&next_height);
        let drained = std::mem::replace(&mut self.jobs, keep);
        drained.into_values().flatten().collect()
    }

    pub fn remove_transaction(&mut self, transaction_hash: &Hash) {
        self.jobs.retain(|_, bucket| {
            bucket.retain(|job| job.transaction_hash != *transaction_hash);
            !bucket.is_empty()
        });
    }

    pub fn remove_container(&mut self, container: ContainerId) {
        self.jobs.retain(|_, bucket| {
            bucket.retain(|job| job.container != container);
            !bucket.is_empty()
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &UnlockJob)> {
        self.jobs
            .iter()
            .flat_map(|(height, bucket)| bucket.iter().map(move |job| (*height, job)))
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}

/// Height at which a transaction confirmed at `block_height` becomes
/// spendable.
pub fn unlock_height(block_height: u32, soft_lock: u32, unlock_time: u64) -> u32 {
    let soft_locked = block_height.saturating_add(soft_lock);
    let explicit = unlock_time.min(u64::from(u32::MAX)) as u32;
    soft_locked.max(explicit)
}
