// SPDX-License-Identifier: Apache-2.0
//! tx-builder — CryptoNote transaction assembly.
//!
//! Pieces:
//! - types: key/hash newtypes shared across the wallet workspace
//! - decompose: canonical per-digit amount decomposition with dust folding
//! - crypto: `RingCrypto` seam (key generation, output/input key derivation,
//!   per-input signing) plus the Ed25519-backed default provider
//! - builder: output shuffle+sort composition, ring-input model and the
//!   serialized transaction prototype
//!
//! This crate purposely knows nothing about balances, journals or nodes; it
//! turns already-selected inputs and already-decomposed outputs into a signed
//! transaction blob.
pub mod builder;
pub mod crypto;
pub mod decompose;
pub mod types;

pub use builder::{
    compose_transaction, GlobalOutput, InputKeyInfo, KeyInput, KeyOutput, PreparedInput,
    RealOutput, ReceiverAmounts, Transaction, TransactionPrefix, TxBuildError,
};
pub use crypto::{CryptoError, DalekCrypto, EphemeralKeys, InputSignature, RingCrypto};
pub use decompose::decompose_amount;
pub use types::{AccountAddress, AccountKeys, Hash, KeyImage, KeyPair, PublicKey, SecretKey};
