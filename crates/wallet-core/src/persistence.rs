// SPDX-License-Identifier: Apache-2.0
//! Encrypted wallet snapshots.
//!
//! The wallet hands a [`WalletSnapshot`] to a [`SnapshotCodec`]; the default
//! codec derives a key from the password with Argon2 and seals the bincode
//! bytes with ChaCha20-Poly1305. A failed open under a wrong password is
//! indistinguishable from corruption at the AEAD layer and reported as
//! `WRONG_PASSWORD`.

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tx_builder::{Hash, PublicKey, SecretKey, Transaction};

use crate::error::{Result, WalletError};
use crate::model::{Transfer, TxRecord};

const SNAPSHOT_MAGIC: &[u8; 4] = b"CNWS";
const SNAPSHOT_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Clone, Serialize, Deserialize)]
pub struct SpendRecordSnapshot {
    pub spend_public: PublicKey,
    pub spend_secret: Option<SecretKey>,
    pub creation_timestamp: u64,
    pub actual_balance: u64,
    pub pending_balance: u64,
}

/// Unlock jobs are persisted against the owning spend key; container handles
/// are re-issued on load.
#[derive(Clone, Serialize, Deserialize)]
pub struct UnlockJobSnapshot {
    pub unlock_height: u32,
    pub spend_public: PublicKey,
    pub transaction_hash: Hash,
}

#[derive(Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub view_public: PublicKey,
    pub view_secret: SecretKey,
    pub soft_lock: u32,
    pub records: Vec<SpendRecordSnapshot>,
    pub transactions: Vec<TxRecord>,
    pub transfers: Vec<(usize, Transfer)>,
    pub unlock_jobs: Vec<UnlockJobSnapshot>,
    pub pending: Vec<(usize, Transaction)>,
    pub block_hashes: Vec<Hash>,
    pub aggregate_actual: u64,
    pub aggregate_pending: u64,
}

pub trait SnapshotCodec: Send + Sync {
    fn seal(&self, snapshot: &WalletSnapshot, password: &str) -> Result<Vec<u8>>;
    fn open(&self, bytes: &[u8], password: &str) -> Result<WalletSnapshot>;
}

/// Argon2 + ChaCha20-Poly1305 snapshot codec.
#[derive(Clone, Copy, Default)]
pub struct AeadSnapshotCodec;

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    argon2::Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|_| WalletError::KeyGenerationError)?;
    Ok(key)
}

impl SnapshotCodec for AeadSnapshotCodec {
    fn seal(&self, snapshot: &WalletSnapshot, password: &str) -> Result<Vec<u8>> {
        let plaintext = bincode::serialize(snapshot)
            .map_err(|e| WalletError::InternalWalletError(format!("snapshot encode: {e}")))?;

        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let key = derive_key(password, &salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| WalletError::InternalWalletError("snapshot seal failed".into()))?;

        let mut out = Vec::with_capacity(5 + SALT_LEN + NONCE_LEN + ciphertext.len());
        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.push(SNAPSHOT_VERSION);
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, bytes: &[u8], password: &str) -> Result<WalletSnapshot> {
        let header_len = 5 + SALT_LEN + NONCE_LEN;
        if bytes.len() < header_len || &bytes[..4] != SNAPSHOT_MAGIC {
            return Err(WalletError::InternalWalletError(
                "not a wallet snapshot".into(),
            ));
        }
        if bytes[4] != SNAPSHOT_VERSION {
            return Err(WalletError::InternalWalletError(format!(
                "unsupported snapshot version {}",
                bytes[4]
            )));
        }

        let salt = &bytes[5..5 + SALT_LEN];
        let nonce = &bytes[5 + SALT_LEN..header_len];
        let key = derive_key(password, salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), &bytes[header_len..])
            .map_err(|_| WalletError::WrongPassword)?;

        bincode::deserialize(&plaintext)
            .map_err(|e| WalletError::InternalWalletError(format!("snapshot decode: {e}")))
    }
}
