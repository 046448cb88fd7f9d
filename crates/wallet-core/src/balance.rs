// SPDX-License-Identifier: Apache-2.0
//! Cached per-address and aggregate balances.
//!
//! Aggregates are only ever moved by the delta between a container's fresh
//! numbers and the cached per-address pair; recomputing the sum from scratch
//! would race against concurrent journal mutations observed part-way.

use crate::container::TransfersContainer;
use crate::keystore::SpendRecord;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BalanceTracker {
    pub actual: u64,
    pub pending: u64,
}

impl BalanceTracker {
    /// Refresh one record from its container, moving the aggregates by the
    /// difference. Returns whether anything changed.
    pub fn refresh_record(
        &mut self,
        record: &mut SpendRecord,
        container: &dyn TransfersContainer,
    ) -> bool {
        let actual = container.available_unlocked();
        let pending = container.available_locked();

        if record.actual_balance < actual {
            self.actual += actual - record.actual_balance;
        } else {
            self.actual -= record.actual_balance - actual;
        }
        if record.pending_balance < pending {
            self.pending += pending - record.pending_balance;
        } else {
            self.pending -= record.pending_balance - pending;
        }

        let changed = record.actual_balance != actual || record.pending_balance != pending;
        record.actual_balance = actual;
        record.pending_balance = pending;
        changed
    }

    /// Forget a record that is being removed from the wallet.
    pub fn forget_record(&mut self, record: &SpendRecord) {
        self.actual -= record.actual_balance;
        self.pending -= record.pending_balance;
    }

    pub fn clear(&mut self) {
        *self = BalanceTracker::default();
    }
}
