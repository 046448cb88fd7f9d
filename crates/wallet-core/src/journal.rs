// SPDX-License-Identifier: Apache-2.0
//! Append-only journal of wallet transactions and their per-address
//! transfers.
//!
//! One vector of records is the source of truth; a hash map (hash → index)
//! and a sorted height map (block height → indexes) are maintained on every
//! mutation. Transfers live in a parallel sequence ordered by parent index,
//! so the rows of one transaction always form a contiguous run.

use std::collections::{BTreeMap, HashMap, HashSet};

use tx_builder::{Hash, SecretKey};

use crate::model::{TransactionInfo, Transfer, TransferKind, TxRecord, TxState, UNCONFIRMED_HEIGHT};

/// Per-address signed totals of one transaction's known transfers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferTotals {
    pub input: i64,
    pub output: i64,
}

#[derive(Default)]
pub struct TransferJournal {
    records: Vec<TxRecord>,
    by_hash: HashMap<Hash, usize>,
    by_height: BTreeMap<u32, Vec<usize>>,
    /// (parent index, transfer), sorted by parent index.
    transfers: Vec<(usize, Transfer)>,
}

impl TransferJournal {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TxRecord> {
        self.records.get(index)
    }

    pub fn index_of(&self, hash: &Hash) -> Option<usize> {
        self.by_hash.get(hash).copied()
    }

    pub fn indexes_at_height(&self, height: u32) -> &[usize] {
        self.by_height
            .get(&height)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn records(&self) -> &[TxRecord] {
        &self.records
    }

    fn link_height(&mut self, index: usize, height: u32) {
        self.by_height.entry(height).or_default().push(index);
    }

    fn unlink_height(&mut self, index: usize, height: u32) {
        if let Some(bucket) = self.by_height.get_mut(&height) {
            bucket.retain(|i| *i != index);
            if bucket.is_empty() {
                self.by_height.remove(&height);
            }
        }
    }

    fn push_record(&mut self, record: TxRecord) -> usize {
        debug_assert!(!self.by_hash.contains_key(&record.hash));
        let index = self.records.len();
        self.by_hash.insert(record.hash, index);
        let height = record.block_height;
        self.records.push(record);
        self.link_height(index, height);
        index
    }

    /// Insert a transaction first seen in a block (or the pool).
    pub fn insert_confirmed(&mut self, info: &TransactionInfo, total_amount: i64) -> usize {
        let is_coinbase = info.total_amount_in == 0;
        self.push_record(TxRecord {
            state: TxState::Succeeded,
            timestamp: info.timestamp,
            block_height: info.block_height,
            hash: info.hash,
            total_amount,
            fee: if is_coinbase {
                0
            } else {
                info.total_amount_in.saturating_sub(info.total_amount_out)
            },
            creation_time: info.timestamp,
            unlock_time: info.unlock_time,
            extra: info.extra.clone(),
            secret_key: None,
            is_coinbase,
        })
    }

    /// Insert a freshly composed outgoing transaction.
    pub fn insert_pending(
        &mut self,
        hash: Hash,
        fee: u64,
        extra: Vec<u8>,
        unlock_time: u64,
        creation_time: u64,
        secret_key: Option<SecretKey>,
    ) -> usize {
        self.push_record(TxRecord {
            state: TxState::Created,
            timestamp: 0,
            block_height: UNCONFIRMED_HEIGHT,
            hash,
            total_amount: 0,
            fee,
            creation_time,
            unlock_time,
            extra,
            secret_key,
            is_coinbase: false,
        })
    }

    pub fn update_state(&mut self, index: usize, state: TxState) -> bool {
        let record = &mut self.records[index];
        if record.state == state {
            return false;
        }
        record.state = state;
        true
    }

    /// Bring a record into agreement with what a container now reports.
    pub fn replace_meta(&mut self, index: usize, info: &TransactionInfo, total_amount: i64) -> bool {
        let old_height = self.records[index].block_height;
        let mut updated = false;

        {
            let record = &mut self.records[index];

            if record.block_height != info.block_height {
                record.block_height = info.block_height;
                updated = true;
            }
            if record.timestamp != info.timestamp {
                record.timestamp = info.timestamp;
                updated = true;
            }

            // A transaction observed by the synchronizer cannot still be
            // CREATED or FAILED; a cancelled one may resurface confirmed.
            let was_sent =
                record.state != TxState::Created && record.state != TxState::Failed;
            let is_confirmed = record.block_height != UNCONFIRMED_HEIGHT;
            if record.state != TxState::Succeeded && (was_sent || is_confirmed) {
                record.state = TxState::Succeeded;
                updated = true;
            }

            if record.total_amount != total_amount {
                record.total_amount = total_amount;
                updated = true;
            }
            if record.extra.is_empty() && !info.extra.is_empty() {
                record.extra = info.extra.clone();
                updated = true;
            }

            let is_coinbase = info.total_amount_in == 0;
            if record.is_coinbase != is_coinbase {
                record.is_coinbase = is_coinbase;
                updated = true;
            }
        }

        if old_height != info.block_height {
            self.unlink_height(index, old_height);
            self.link_height(index, info.block_height);
        }
        updated
    }

    /// Detach a record from its block after a reorg or pool eviction.
    pub fn mark_cancelled(&mut self, index: usize) -> bool {
        let mut updated = false;
        let old_height = self.records[index].block_height;
        {
            let record = &mut self.records[index];
            if record.state == TxState::Created || record.state == TxState::Succeeded {
                record.state = TxState::Cancelled;
                updated = true;
            }
            if record.block_height != UNCONFIRMED_HEIGHT {
                record.block_height = UNCONFIRMED_HEIGHT;
                updated = true;
            }
        }
        if old_height != UNCONFIRMED_HEIGHT {
            self.unlink_height(index, old_height);
            self.link_height(index, UNCONFIRMED_HEIGHT);
        }
        updated
    }

    // --- transfers ---------------------------------------------------------

    pub fn first_transfer_index(&self, tx_index: usize) -> usize {
        self.transfers.partition_point(|(parent, _)| *parent < tx_index)
    }

    pub fn transfer_count(&self, tx_index: usize) -> usize {
        let start = self.first_transfer_index(tx_index);
        self.transfers[start..]
            .iter()
            .take_while(|(parent, _)| *parent == tx_index)
            .count()
    }

    pub fn transfers(&self, tx_index: usize) -> Vec<Transfer> {
        let start = self.first_transfer_index(tx_index);
        self.transfers[start..]
            .iter()
            .take_while(|(parent, _)| *parent == tx_index)
            .map(|(_, transfer)| transfer.clone())
            .collect()
    }

    pub fn transfer(&self, tx_index: usize, transfer_index: usize) -> Option<Transfer> {
        self.transfers(tx_index).into_iter().nth(transfer_index)
    }

    /// Append outgoing destinations; only valid for the newest record, which
    /// keeps the sequence sorted by parent index.
    pub fn push_transfers(&mut self, tx_index: usize, destinations: &[Transfer]) {
        debug_assert!(tx_index + 1 == self.records.len());
        for destination in destinations {
            self.transfers.push((tx_index, destination.clone()));
        }
    }

    pub fn append_transfer(
        &mut self,
        tx_index: usize,
        first_transfer_index: usize,
        address: &str,
        amount: i64,
    ) {
        let mut position = first_transfer_index;
        while position < self.transfers.len() && self.transfers[position].0 <= tx_index {
            position += 1;
        }
        self.transfers.insert(
            position,
            (
                tx_index,
                Transfer {
                    kind: TransferKind::Usual,
                    address: address.to_string(),
                    amount,
                },
            ),
        );
    }

    /// Rewrite the first transfer of matching sign and address to `amount`,
    /// dropping any further rows for that (sign, address); appends when no
    /// row matched.
    pub fn adjust_transfer(
        &mut self,
        tx_index: usize,
        first_transfer_index: usize,
        address: &str,
        amount: i64,
    ) -> bool {
        debug_assert!(amount != 0);

        let update_outputs = amount > 0;
        let mut updated = false;
        let mut found_first = false;

        let mut position = first_transfer_index;
        while position < self.transfers.len() && self.transfers[position].0 == tx_index {
            let transfer = &mut self.transfers[position].1;
            let is_output = transfer.amount > 0;
            if is_output == update_outputs && transfer.address == address {
                if found_first {
                    self.transfers.remove(position);
                    updated = true;
                    continue;
                }
                if transfer.amount != amount {
                    transfer.amount = amount;
                    updated = true;
                }
                found_first = true;
            }
            position += 1;
        }

        if !found_first {
            self.transfers.insert(
                position,
                (
                    tx_index,
                    Transfer {
                        kind: TransferKind::Usual,
                        address: address.to_string(),
                        amount,
                    },
                ),
            );
            updated = true;
        }

        updated
    }

    pub fn erase_transfers(
        &mut self,
        tx_index: usize,
        first_transfer_index: usize,
        predicate: impl Fn(bool, &str) -> bool,
    ) -> bool {
        let mut erased = false;
        let mut position = first_transfer_index;
        while position < self.transfers.len() && self.transfers[position].0 == tx_index {
            let transfer = &self.transfers[position].1;
            if predicate(transfer.amount > 0, &transfer.address) {
                self.transfers.remove(position);
                erased = true;
            } else {
                position += 1;
            }
        }
        erased
    }

    pub fn erase_transfers_by_address(
        &mut self,
        tx_index: usize,
        first_transfer_index: usize,
        address: &str,
        erase_outputs: bool,
    ) -> bool {
        self.erase_transfers(tx_index, first_transfer_index, |is_output, candidate| {
            erase_outputs == is_output && candidate == address
        })
    }

    fn erase_foreign_transfers(
        &mut self,
        tx_index: usize,
        first_transfer_index: usize,
        known_addresses: &HashSet<String>,
        erase_outputs: bool,
    ) -> bool {
        self.erase_transfers(tx_index, first_transfer_index, |is_output, candidate| {
            erase_outputs == is_output && !known_addresses.contains(candidate)
        })
    }

    /// Known (non-anonymous) transfer totals per address.
    pub fn known_transfers_map(
        &self,
        tx_index: usize,
        first_transfer_index: usize,
    ) -> HashMap<String, TransferTotals> {
        let mut map: HashMap<String, TransferTotals> = HashMap::new();
        for (parent, transfer) in &self.transfers[first_transfer_index..] {
            if *parent != tx_index {
                break;
            }
            if transfer.address.is_empty() {
                continue;
            }
            let totals = map.entry(transfer.address.clone()).or_default();
            if transfer.amount < 0 {
                totals.input += transfer.amount;
            } else {
                totals.output += transfer.amount;
            }
        }
        map
    }

    fn update_address_transfers(
        &mut self,
        tx_index: usize,
        first_transfer_index: usize,
        address: &str,
        known_amount: i64,
        target_amount: i64,
    ) -> bool {
        if known_amount == target_amount {
            return false;
        }
        if known_amount == 0 {
            self.append_transfer(tx_index, first_transfer_index, address, target_amount);
            true
        } else if target_amount == 0 {
            self.erase_transfers_by_address(
                tx_index,
                first_transfer_index,
                address,
                known_amount > 0,
            )
        } else {
            self.adjust_transfer(tx_index, first_transfer_index, address, target_amount)
        }
    }

    fn update_unknown_transfers(
        &mut self,
        tx_index: usize,
        first_transfer_index: usize,
        my_addresses: &HashSet<String>,
        known_amount: i64,
        my_amount: i64,
        total_amount: i64,
        is_output: bool,
    ) -> bool {
        let mut updated = false;

        if known_amount.abs() > total_amount.abs() {
            updated |= self.erase_foreign_transfers(
                tx_index,
                first_transfer_index,
                my_addresses,
                is_output,
            );
            if total_amount == my_amount {
                updated |=
                    self.erase_transfers_by_address(tx_index, first_transfer_index, "", is_output);
            } else {
                updated |= self.adjust_transfer(
                    tx_index,
                    first_transfer_index,
                    "",
                    total_amount - my_amount,
                );
            }
        } else if known_amount == total_amount {
            updated |=
                self.erase_transfers_by_address(tx_index, first_transfer_index, "", is_output);
        } else {
            updated |= self.adjust_transfer(
                tx_index,
                first_transfer_index,
                "",
                total_amount - known_amount,
            );
        }

        updated
    }

    /// Bring this transaction's transfer rows into agreement with the
    /// per-address totals the containers now report. Amounts we cannot
    /// attribute to our own addresses fold into one anonymous row per sign.
    pub fn update_transaction_transfers(
        &mut self,
        tx_index: usize,
        container_totals: &[(String, TransferTotals)],
        all_inputs_amount: i64,
        all_outputs_amount: i64,
    ) -> bool {
        debug_assert!(all_inputs_amount <= 0);
        debug_assert!(all_outputs_amount >= 0);

        let first_transfer_index = self.first_transfer_index(tx_index);
        let initial = self.known_transfers_map(tx_index, first_transfer_index);

        let mut updated = false;
        let mut my_input_addresses = HashSet::new();
        let mut my_output_addresses = HashSet::new();
        let mut my_inputs_amount = 0i64;
        let mut my_outputs_amount = 0i64;

        for (address, totals) in container_totals {
            let known = initial.get(address).copied().unwrap_or_default();
            updated |= self.update_address_transfers(
                tx_index,
                first_transfer_index,
                address,
                known.input,
                totals.input,
            );
            updated |= self.update_address_transfers(
                tx_index,
                first_transfer_index,
                address,
                known.output,
                totals.output,
            );

            my_inputs_amount += totals.input;
            my_outputs_amount += totals.output;
            if totals.input != 0 {
                my_input_addresses.insert(address.clone());
            }
            if totals.output != 0 {
                my_output_addresses.insert(address.clone());
            }
        }

        let mut known_inputs_amount = 0i64;
        let mut known_outputs_amount = 0i64;
        for totals in self
            .known_transfers_map(tx_index, first_transfer_index)
            .values()
        {
            known_inputs_amount += totals.input;
            known_outputs_amount += totals.output;
        }

        updated |= self.update_unknown_transfers(
            tx_index,
            first_transfer_index,
            &my_input_addresses,
            known_inputs_amount,
            my_inputs_amount,
            all_inputs_amount,
            false,
        );
        updated |= self.update_unknown_transfers(
            tx_index,
            first_transfer_index,
            &my_output_addresses,
            known_outputs_amount,
            my_outputs_amount,
            all_outputs_amount,
            true,
        );

        updated
    }

    /// Strip a removed address out of every transaction. Input rows fold into
    /// the anonymous counterparty; records with no transfers to any remaining
    /// known address become DELETED. Returns the updated indexes and fills
    /// `deleted` with the fully dropped ones.
    pub fn delete_transfers_for_address(
        &mut self,
        address: &str,
        remaining_addresses: &HashSet<String>,
        deleted: &mut Vec<usize>,
    ) -> Vec<usize> {
        debug_assert!(!address.is_empty());

        let mut deleted_inputs = 0i64;
        let mut deleted_outputs = 0i64;
        let mut unknown_inputs = 0i64;
        let mut transfers_left = false;
        let mut first_tx_transfer = 0usize;
        let mut updated_transactions = Vec::new();

        let mut i = 0usize;
        while i < self.transfers.len() {
            {
                let transfer = &mut self.transfers[i].1;
                if transfer.address == address {
                    if transfer.amount >= 0 {
                        deleted_outputs += transfer.amount;
                    } else {
                        deleted_inputs += transfer.amount;
                        transfer.address.clear();
                    }
                } else if transfer.address.is_empty() {
                    if transfer.amount < 0 {
                        unknown_inputs += transfer.amount;
                    }
                } else if remaining_addresses.contains(&transfer.address) {
                    transfers_left = true;
                }
            }

            let tx_index = self.transfers[i].0;
            let last_of_tx =
                i + 1 == self.transfers.len() || self.transfers[i + 1].0 != tx_index;
            if last_of_tx {
                let before_merge = self.transfers.len();
                if deleted_inputs != 0 {
                    self.adjust_transfer(
                        tx_index,
                        first_tx_transfer,
                        "",
                        deleted_inputs + unknown_inputs,
                    );
                }
                debug_assert!(before_merge >= self.transfers.len());
                i -= before_merge - self.transfers.len();

                let record = &mut self.records[tx_index];
                record.total_amount -= deleted_inputs + deleted_outputs;
                if !transfers_left {
                    record.state = TxState::Deleted;
                    deleted.push(tx_index);
                }
                if deleted_inputs != 0 || deleted_outputs != 0 {
                    updated_transactions.push(tx_index);
                }

                deleted_inputs = 0;
                deleted_outputs = 0;
                unknown_inputs = 0;
                transfers_left = false;
                first_tx_transfer = i + 1;
            }

            i += 1;
        }

        updated_transactions
    }

    // --- snapshots ---------------------------------------------------------

    /// Copy out every record failing `filter_out`, remapping parent indexes
    /// to the compacted sequence.
    pub fn filter_for_snapshot(
        &self,
        filter_out: impl Fn(&TxRecord) -> bool,
    ) -> (Vec<TxRecord>, Vec<(usize, Transfer)>) {
        let mut records = Vec::new();
        let mut transfers = Vec::new();
        let mut dropped = 0usize;

        for (index, record) in self.records.iter().enumerate() {
            if filter_out(record) {
                dropped += 1;
                continue;
            }
            records.push(record.clone());
            for transfer in self.transfers(index) {
                transfers.push((index - dropped, transfer));
            }
        }

        (records, transfers)
    }

    pub fn to_parts(&self) -> (Vec<TxRecord>, Vec<(usize, Transfer)>) {
        (self.records.clone(), self.transfers.clone())
    }

    pub fn from_parts(records: Vec<TxRecord>, transfers: Vec<(usize, Transfer)>) -> Self {
        let mut journal = TransferJournal {
            records,
            transfers,
            ..Default::default()
        };
        for (index, record) in journal.records.iter().enumerate() {
            journal.by_hash.insert(record.hash, index);
            journal
                .by_height
                .entry(record.block_height)
                .or_default()
                .push(index);
        }
        journal
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.by_hash.clear();
        self.by_height.clear();
        self.transfers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(hash_byte: u8, height: u32, amount_in: u64, amount_out: u64) -> TransactionInfo {
        TransactionInfo {
            hash: Hash([hash_byte; 32]),
            block_height: height,
            timestamp: 1_700_000_000,
            unlock_time: 0,
            total_amount_in: amount_in,
            total_amount_out: amount_out,
            extra: Vec::new(),
        }
    }

    fn totals(input: i64, output: i64) -> TransferTotals {
        TransferTotals { input, output }
    }

    #[test]
    fn hash_and_height_views_stay_consistent() {
        let mut journal = TransferJournal::default();
        let a = journal.insert_confirmed(&info(1, 10, 0, 500), 500);
        let b = journal.insert_pending(Hash([2u8; 32]), 10, Vec::new(), 0, 0, None);

        assert_eq!(journal.index_of(&Hash([1u8; 32])), Some(a));
        assert_eq!(journal.indexes_at_height(10), &[a]);
        assert_eq!(journal.indexes_at_height(UNCONFIRMED_HEIGHT), &[b]);

        // Confirmation moves the record between height buckets.
        journal.replace_meta(b, &info(2, 11, 600, 590), -10);
        assert_eq!(journal.indexes_at_height(11), &[b]);
        assert!(journal.indexes_at_height(UNCONFIRMED_HEIGHT).is_empty());
    }

    #[test]
    fn replace_meta_resurrects_cancelled_transactions() {
        let mut journal = TransferJournal::default();
        let index = journal.insert_confirmed(&info(1, 10, 0, 500), 500);
        journal.mark_cancelled(index);
        assert_eq!(journal.get(index).unwrap().state, TxState::Cancelled);

        let updated = journal.replace_meta(index, &info(1, 12, 0, 500), 500);
        assert!(updated);
        let record = journal.get(index).unwrap();
        assert_eq!(record.state, TxState::Succeeded);
        assert_eq!(record.block_height, 12);
    }

    #[test]
    fn created_records_are_not_resurrected_by_pool_updates() {
        let mut journal = TransferJournal::default();
        let index = journal.insert_pending(Hash([1u8; 32]), 10, Vec::new(), 0, 0, None);
        let mut unconfirmed = info(1, UNCONFIRMED_HEIGHT, 600, 590);
        unconfirmed.timestamp = 0;
        journal.replace_meta(index, &unconfirmed, -10);
        assert_eq!(journal.get(index).unwrap().state, TxState::Created);
    }

    #[test]
    fn transfers_stay_contiguous_per_transaction() {
        let mut journal = TransferJournal::default();
        let a = journal.insert_confirmed(&info(1, 10, 0, 100), 100);
        let b = journal.insert_confirmed(&info(2, 10, 0, 200), 200);

        let first_a = journal.first_transfer_index(a);
        journal.append_transfer(a, first_a, "alice", 100);
        let first_b = journal.first_transfer_index(b);
        journal.append_transfer(b, first_b, "bob", 200);
        let first_a = journal.first_transfer_index(a);
        journal.append_transfer(a, first_a, "carol", 50);

        let a_rows = journal.transfers(a);
        assert_eq!(a_rows.len(), 2);
        assert_eq!(journal.transfers(b).len(), 1);
        assert_eq!(a_rows[0].address, "alice");
        assert_eq!(a_rows[1].address, "carol");
    }

    #[test]
    fn adjust_collapses_duplicate_rows() {
        let mut journal = TransferJournal::default();
        let index = journal.insert_confirmed(&info(1, 10, 0, 100), 100);
        journal.append_transfer(index, 0, "alice", 40);
        journal.append_transfer(index, 0, "alice", 60);

        let updated = journal.adjust_transfer(index, 0, "alice", 100);
        assert!(updated);
        let rows = journal.transfers(index);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, 100);
    }

    #[test]
    fn rewrite_folds_foreign_amounts_into_anonymous_row() {
        let mut journal = TransferJournal::default();
        let index = journal.insert_confirmed(&info(1, 10, 700, 690), -710);

        // We spent 700 and got back 90 change to "ours"; counterparty share
        // of outputs is unknown to us.
        let updated = journal.update_transaction_transfers(
            index,
            &[("ours".to_string(), totals(-700, 90))],
            -700,
            690,
        );
        assert!(updated);

        let rows = journal.transfers(index);
        assert!(rows.contains(&Transfer {
            kind: TransferKind::Usual,
            address: "ours".into(),
            amount: -700,
        }));
        assert!(rows.contains(&Transfer {
            kind: TransferKind::Usual,
            address: "ours".into(),
            amount: 90,
        }));
        assert!(rows.contains(&Transfer {
            kind: TransferKind::Usual,
            address: String::new(),
            amount: 600,
        }));
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn rewrite_erases_rows_that_drop_to_zero() {
        let mut journal = TransferJournal::default();
        let index = journal.insert_confirmed(&info(1, 10, 0, 500), 500);
        journal.update_transaction_transfers(
            index,
            &[("ours".to_string(), totals(0, 500))],
            0,
            500,
        );
        assert_eq!(journal.transfers(index).len(), 1);

        let updated = journal.update_transaction_transfers(
            index,
            &[("ours".to_string(), totals(0, 0))],
            0,
            0,
        );
        assert!(updated);
        assert!(journal.transfers(index).is_empty());
    }

    #[test]
    fn deleting_an_address_folds_its_inputs_and_keeps_shared_transactions() {
        let mut journal = TransferJournal::default();
        let index = journal.insert_confirmed(&info(1, 10, 0, 1_000), 1_000);
        journal.update_transaction_transfers(
            index,
            &[
                ("gone".to_string(), totals(0, 500)),
                ("kept".to_string(), totals(0, 500)),
            ],
            0,
            1_000,
        );

        let remaining: HashSet<String> = [String::from("kept")].into();
        let mut deleted = Vec::new();
        let updated = journal.delete_transfers_for_address("gone", &remaining, &mut deleted);

        assert_eq!(updated, vec![index]);
        assert!(deleted.is_empty());
        let record = journal.get(index).unwrap();
        assert_eq!(record.state, TxState::Succeeded);
        assert_eq!(record.total_amount, 500);
    }

    #[test]
    fn deleting_the_only_address_marks_records_deleted() {
        let mut journal = TransferJournal::default();
        let index = journal.insert_confirmed(&info(1, 10, 0, 500), 500);
        journal.update_transaction_transfers(
            index,
            &[("gone".to_string(), totals(0, 500))],
            0,
            500,
        );

        let mut deleted = Vec::new();
        journal.delete_transfers_for_address("gone", &HashSet::new(), &mut deleted);
        assert_eq!(deleted, vec![index]);
        assert_eq!(journal.get(index).unwrap().state, TxState::Deleted);
    }

    #[test]
    fn snapshot_filter_remaps_parent_indexes() {
        let mut journal = TransferJournal::default();
        let a = journal.insert_pending(Hash([1u8; 32]), 10, Vec::new(), 0, 0, None);
        let b = journal.insert_confirmed(&info(2, 10, 0, 500), 500);
        journal.push_transfers(
            b,
            &[Transfer {
                kind: TransferKind::Usual,
                address: "ours".into(),
                amount: 500,
            }],
        );
        let _ = a;

        let (records, transfers) =
            journal.filter_for_snapshot(|record| record.state == TxState::Created);
        assert_eq!(records.len(), 1);
        assert_eq!(transfers, vec![(0, Transfer {
            kind: TransferKind::Usual,
            address: "ours".into(),
            amount: 500,
        })]);
    }
}
