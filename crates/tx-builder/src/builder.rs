// SPDX-License-Identifier: Apache-2.0
//! Transaction composition.
//!
//! Outputs are first shuffled with a CSPRNG and then stable-sorted by amount:
//! the shuffle breaks any link between same-amount outputs and their
//! destination order, the sort fixes a canonical wire order. Inputs keep the
//! order the selector produced.

use rand::{seq::SliceRandom, thread_rng};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::crypto::{CryptoError, InputSignature, RingCrypto};
use crate::types::{AccountAddress, AccountKeys, Hash, KeyImage, PublicKey, SecretKey};

#[derive(Debug, Error)]
pub enum TxBuildError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("real output position {position} outside ring of {len}")]
    InvalidRing { position: usize, len: usize },
    #[error("transaction codec failed: {0}")]
    Codec(String),
}

/// Decomposed amounts all paid to a single receiver.
#[derive(Clone, Debug)]
pub struct ReceiverAmounts {
    pub receiver: AccountAddress,
    pub amounts: Vec<u64>,
}

/// One ring member addressed by its global output index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalOutput {
    pub index: u32,
    pub target_key: PublicKey,
}

/// Where the real output sits inside the ring and how to re-derive its keys.
#[derive(Clone, Debug)]
pub struct RealOutput {
    pub tx_public_key: PublicKey,
    pub ring_position: usize,
    pub index_in_tx: u32,
}

#[derive(Clone, Debug)]
pub struct InputKeyInfo {
    pub amount: u64,
    pub ring: Vec<GlobalOutput>,
    pub real: RealOutput,
}

/// A selected real input together with the keys of the address that owns it.
#[derive(Clone)]
pub struct PreparedInput {
    pub key_info: InputKeyInfo,
    pub account: AccountKeys,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInput {
    pub amount: u64,
    pub key_offsets: Vec<u32>,
    pub key_image: KeyImage,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOutput {
    pub amount: u64,
    pub key: PublicKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPrefix {
    pub version: u8,
    pub unlock_time: u64,
    pub inputs: Vec<KeyInput>,
    pub outputs: Vec<KeyOutput>,
    pub extra: Vec<u8>,
    pub public_key: PublicKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub prefix: TransactionPrefix,
    pub signatures: Vec<InputSignature>,
}

const TX_VERSION: u8 = 1;

impl TransactionPrefix {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.extend_from_slice(&self.unlock_time.to_le_bytes());
        out.extend_from_slice(&(self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            out.extend_from_slice(&input.amount.to_le_bytes());
            out.extend_from_slice(&(input.key_offsets.len() as u64).to_le_bytes());
            for offset in &input.key_offsets {
                out.extend_from_slice(&offset.to_le_bytes());
            }
            out.extend_from_slice(&input.key_image.0);
        }
        out.extend_from_slice(&(self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            out.extend_from_slice(&output.amount.to_le_bytes());
            out.extend_from_slice(&output.key.0);
        }
        out.extend_from_slice(&(self.extra.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.extra);
        out.extend_from_slice(&self.public_key.0);
    }

    pub fn hash(&self) -> Hash {
        let mut bytes = Vec::with_capacity(128);
        self.encode_into(&mut bytes);
        let mut hasher = Keccak256::new();
        hasher.update(&bytes);
        Hash(hasher.finalize().into())
    }
}

impl Transaction {
    pub fn hash(&self) -> Hash {
        let mut bytes = Vec::with_capacity(160);
        self.prefix.encode_into(&mut bytes);
        for sig in &self.signatures {
            bytes.extend_from_slice(&sig.0);
        }
        let mut hasher = Keccak256::new();
        hasher.update(&bytes);
        Hash(hasher.finalize().into())
    }

    pub fn input_total(&self) -> u64 {
        self.prefix
            .inputs
            .iter()
            .fold(0u64, |acc, i| acc.saturating_add(i.amount))
    }

    pub fn output_total(&self) -> u64 {
        self.prefix
            .outputs
            .iter()
            .fold(0u64, |acc, o| acc.saturating_add(o.amount))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TxBuildError> {
        bincode::serialize(self).map_err(|e| TxBuildError::Codec(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TxBuildError> {
        bincode::deserialize(bytes).map_err(|e| TxBuildError::Codec(e.to_string()))
    }
}

/// Assemble and sign a transaction from decomposed outputs and prepared ring
/// inputs. Returns the transaction together with its secret key.
pub fn compose_transaction(
    crypto: &dyn RingCrypto,
    decomposed: &[ReceiverAmounts],
    inputs: &[PreparedInput],
    extra: Vec<u8>,
    unlock_time: u64,
) -> Result<(Transaction, SecretKey), TxBuildError> {
    let mut amounts_to_receivers: Vec<(&AccountAddress, u64)> = Vec::new();
    for output in decomposed {
        for amount in &output.amounts {
            amounts_to_receivers.push((&output.receiver, *amount));
        }
    }

    amounts_to_receivers.shuffle(&mut thread_rng());
    amounts_to_receivers.sort_by_key(|(_, amount)| *amount);

    let tx_keys = crypto.generate_keys();

    let mut outputs = Vec::with_capacity(amounts_to_receivers.len());
    for (position, (receiver, amount)) in amounts_to_receivers.iter().enumerate() {
        let key = crypto.derive_output_key(&tx_keys.secret, receiver, position)?;
        outputs.push(KeyOutput {
            amount: *amount,
            key,
        });
    }

    let mut key_inputs = Vec::with_capacity(inputs.len());
    let mut ephemerals = Vec::with_capacity(inputs.len());
    for input in inputs {
        let info = &input.key_info;
        let real_member = info.ring.get(info.real.ring_position).ok_or(
            TxBuildError::InvalidRing {
                position: info.real.ring_position,
                len: info.ring.len(),
            },
        )?;

        let (eph, key_image) = crypto.derive_input_keys(
            &input.account,
            &info.real.tx_public_key,
            info.real.index_in_tx as usize,
            &real_member.target_key,
        )?;

        key_inputs.push(KeyInput {
            amount: info.amount,
            key_offsets: info.ring.iter().map(|member| member.index).collect(),
            key_image,
        });
        ephemerals.push((eph, info.ring.iter().map(|m| m.target_key).collect::<Vec<_>>()));
    }

    let prefix = TransactionPrefix {
        version: TX_VERSION,
        unlock_time,
        inputs: key_inputs,
        outputs,
        extra,
        public_key: tx_keys.public,
    };
    let prefix_hash = prefix.hash();

    let mut signatures = Vec::with_capacity(ephemerals.len());
    for (eph, ring) in &ephemerals {
        signatures.push(crypto.sign_input(&prefix_hash, eph, ring)?);
    }

    Ok((
        Transaction {
            prefix,
            signatures,
        },
        tx_keys.secret,
    ))
}
