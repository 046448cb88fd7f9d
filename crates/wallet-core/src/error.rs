// SPDX-License-Identifier: Apache-2.0
//! Wallet error taxonomy.

use thiserror::Error;
use tx_builder::{CryptoError, TxBuildError};

use crate::node::NodeError;

pub type Result<T> = std::result::Result<T, WalletError>;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet is not initialized")]
    NotInitialized,
    #[error("wallet is already initialized")]
    AlreadyInitialized,
    #[error("operation is not permitted in the current wallet state")]
    WrongState,
    #[error("operation cancelled")]
    OperationCancelled,

    #[error("wrong password")]
    WrongPassword,
    #[error("key generation failed")]
    KeyGenerationError,

    #[error("bad address: {0}")]
    BadAddress(String),
    #[error("address already exists")]
    AddressAlreadyExists,
    #[error("object not found: {0}")]
    ObjectNotFound(String),
    #[error("wallet record not found")]
    WalletNotFound,
    #[error("index out of range")]
    IndexOutOfRange,

    #[error("wrong parameters: {0}")]
    WrongParameters(String),
    #[error("wrong amount: {0}")]
    WrongAmount(String),
    #[error("destination amount is zero")]
    ZeroDestination,
    #[error("amounts overflow while summing")]
    SumOverflow,

    #[error("fee {fee} is below the node minimum {minimum}")]
    FeeTooSmall { fee: u64, minimum: u64 },
    #[error("change destination address required")]
    ChangeAddressRequired,
    #[error("change destination address not found in the wallet")]
    ChangeAddressNotFound,

    #[error("node returned fewer mixin outputs than requested")]
    MixinCountTooBig,
    #[error("transaction size exceeds the allowed maximum")]
    TransactionSizeTooBig,
    #[error("transaction extra is too large")]
    ExtraTooLarge,

    #[error("transaction cannot be committed")]
    TransferImpossible,
    #[error("transaction cannot be rolled back")]
    CancelImpossible,
    #[error("wallet is in tracking mode")]
    TrackingMode,
    #[error("internal wallet error: {0}")]
    InternalWalletError(String),

    #[error(transparent)]
    Node(#[from] NodeError),
}

impl From<CryptoError> for WalletError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MissingSpendKey => WalletError::TrackingMode,
            CryptoError::InvalidKey => WalletError::KeyGenerationError,
            CryptoError::DerivationMismatch => {
                WalletError::InternalWalletError("one-time key derivation mismatch".into())
            }
        }
    }
}

impl From<TxBuildError> for WalletError {
    fn from(err: TxBuildError) -> Self {
        match err {
            TxBuildError::Crypto(inner) => inner.into(),
            other => WalletError::InternalWalletError(other.to_string()),
        }
    }
}
