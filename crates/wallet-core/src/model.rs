// SPDX-License-Identifier: Apache-2.0
//! Journal entities and transfer request types.

use serde::{Deserialize, Serialize};
use tx_builder::{Hash, SecretKey};

use crate::container::ContainerId;

/// Block height sentinel for transactions not yet in a block.
pub const UNCONFIRMED_HEIGHT: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxState {
    Created,
    Succeeded,
    Failed,
    Cancelled,
    Deleted,
}

/// One tracked transaction. Identified externally by its insertion index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxRecord {
    pub state: TxState,
    pub timestamp: u64,
    pub block_height: u32,
    pub hash: Hash,
    /// Net effect on owned addresses; negative when we spend.
    pub total_amount: i64,
    pub fee: u64,
    pub creation_time: u64,
    pub unlock_time: u64,
    pub extra: Vec<u8>,
    pub secret_key: Option<SecretKey>,
    pub is_coinbase: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Usual,
    Donation,
    Change,
}

/// One leg of a transaction. An empty address stands for the anonymous
/// counterparty we cannot attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub kind: TransferKind,
    pub address: String,
    pub amount: i64,
}

/// What a container reports about one transaction.
#[derive(Clone, Debug)]
pub struct TransactionInfo {
    pub hash: Hash,
    pub block_height: u32,
    pub timestamp: u64,
    pub unlock_time: u64,
    pub total_amount_in: u64,
    pub total_amount_out: u64,
    pub extra: Vec<u8>,
}

/// Per-container signed totals of one transaction: `input <= 0 <= output`.
#[derive(Clone, Copy, Debug)]
pub struct ContainerAmounts {
    pub container: ContainerId,
    pub input: i64,
    pub output: i64,
}

/// One requested destination of a transfer.
#[derive(Clone, Debug)]
pub struct TransferOrder {
    pub address: String,
    pub amount: u64,
}

#[derive(Clone, Debug, Default)]
pub struct DonationSettings {
    pub address: String,
    pub threshold: u64,
}

/// User-facing request driving `transfer` / `make_transaction`.
#[derive(Clone, Debug, Default)]
pub struct TransferParameters {
    pub source_addresses: Vec<String>,
    pub destinations: Vec<TransferOrder>,
    pub fee: u64,
    pub mixin: u16,
    pub extra: Vec<u8>,
    pub unlock_timestamp: u64,
    pub donation: DonationSettings,
    pub change_destination: String,
}

#[derive(Clone, Debug)]
pub struct TransactionWithTransfers {
    pub transaction: TxRecord,
    pub transfers: Vec<Transfer>,
}

/// Confirmed transactions of one seen block.
#[derive(Clone, Debug)]
pub struct BlockTransactions {
    pub block_hash: Hash,
    pub transactions: Vec<TransactionWithTransfers>,
}

/// Result of `estimate_fusion`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FusionEstimate {
    pub fusion_ready_count: usize,
    pub total_output_count: usize,
}
