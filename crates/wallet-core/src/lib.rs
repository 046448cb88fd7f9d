// SPDX-License-Identifier: Apache-2.0
//! wallet-core — multi-address CryptoNote wallet engine.
//!
//! Pieces:
//! - KeyStore: one shared view identity plus the spend records
//! - TransferJournal: transactions and per-address transfers with insertion,
//!   hash and block-height views
//! - UnlockScheduler / BalanceTracker: pending → spendable transitions and
//!   delta-maintained balances
//! - SyncAdapter: synchronizer callbacks queued onto the wallet's own
//!   single-worker dispatcher
//! - selector / ring: input selection (with the fusion-bucket variant) and
//!   ring assembly from node-sampled outputs
//! - Wallet: the facade serializing every mutation behind one async lock,
//!   driving compose → persist → relay → commit/rollback
//! - persistence: Argon2 + ChaCha20-Poly1305 sealed snapshots
//!
//! The node, the synchronizer and the per-address containers are seams;
//! this crate binds to their contracts only.
pub mod balance;
pub mod container;
pub mod currency;
pub mod error;
pub mod events;
pub mod journal;
pub mod keystore;
pub mod model;
pub mod node;
pub mod persistence;
pub mod ring;
pub mod selector;
pub mod sync;
pub mod unlock;
pub mod wallet;

pub use container::{ContainerId, MemoryContainer, SpendableOutput, TransfersContainer};
pub use currency::Currency;
pub use error::{Result, WalletError};
pub use events::WalletEvent;
pub use model::{
    DonationSettings, FusionEstimate, TransactionInfo, TransactionWithTransfers, Transfer,
    TransferKind, TransferOrder, TransferParameters, TxRecord, TxState, UNCONFIRMED_HEIGHT,
};
pub use node::{Node, NodeError, RandomAmountOuts, RandomOutputEntry};
pub use sync::{AccountSubscription, SyncAdapter, SyncNotification, TransfersSynchronizer};
pub use wallet::Wallet;
