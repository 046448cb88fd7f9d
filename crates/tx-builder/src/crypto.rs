// SPDX-License-Identifier: Apache-2.0
//! Key derivation and signing seam.
//!
//! The wallet core only ever talks to [`RingCrypto`]; [`DalekCrypto`] is the
//! in-tree provider doing the Ed25519 arithmetic. Hosts with their own signing
//! backend (hardware, FFI) implement the trait instead.

use std::{fmt, ops::Deref};

use curve25519_dalek::{
    constants::ED25519_BASEPOINT_TABLE,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    Scalar,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use sha3::{Digest, Keccak256};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::types::{AccountAddress, AccountKeys, Hash, KeyImage, KeyPair, PublicKey, SecretKey};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("key is not a valid curve element")]
    InvalidKey,
    #[error("spend secret key required but absent")]
    MissingSpendKey,
    #[error("derived one-time key does not match the output key")]
    DerivationMismatch,
}

/// One-time keys controlling a single real input.
#[derive(Clone, Debug)]
pub struct EphemeralKeys {
    pub public: PublicKey,
    pub secret: SecretKey,
}

/// Signature over one ring input.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSignature(#[serde(with = "BigArray")] pub [u8; 64]);

impl fmt::Debug for InputSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputSignature({}..)", hex::encode(&self.0[..8]))
    }
}

pub trait RingCrypto: Send + Sync {
    fn generate_keys(&self) -> KeyPair;

    fn secret_to_public(&self, secret: &SecretKey) -> Result<PublicKey, CryptoError>;

    /// One-time output key for `receiver` at output position `index` under
    /// the transaction key `tx_secret`.
    fn derive_output_key(
        &self,
        tx_secret: &SecretKey,
        receiver: &AccountAddress,
        index: usize,
    ) -> Result<PublicKey, CryptoError>;

    /// Ephemeral spend keys plus key image for a real output we own.
    fn derive_input_keys(
        &self,
        account: &AccountKeys,
        tx_public: &PublicKey,
        output_index: usize,
        output_key: &PublicKey,
    ) -> Result<(EphemeralKeys, KeyImage), CryptoError>;

    /// Sign the prefix hash with the input's one-time key, binding the ring.
    fn sign_input(
        &self,
        prefix_hash: &Hash,
        ephemeral: &EphemeralKeys,
        ring: &[PublicKey],
    ) -> Result<InputSignature, CryptoError>;
}

/// Default provider backed by curve25519-dalek.
#[derive(Clone, Copy, Default)]
pub struct DalekCrypto;

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn hash_to_scalar(data: &[u8]) -> Scalar {
    Scalar::from_bytes_mod_order(keccak256(data))
}

fn decompress(key: &PublicKey) -> Result<EdwardsPoint, CryptoError> {
    CompressedEdwardsY(key.0)
        .decompress()
        .ok_or(CryptoError::InvalidKey)
}

/// Shared-secret scalar for output position `index`: Hs(8 * ecdh || index).
fn derivation_to_scalar(ecdh: &EdwardsPoint, index: usize) -> Scalar {
    let mut data = Zeroizing::new(Vec::with_capacity(40));
    data.extend_from_slice(&ecdh.mul_by_cofactor().compress().to_bytes());
    data.extend_from_slice(&(index as u64).to_le_bytes());
    hash_to_scalar(&data)
}

impl RingCrypto for DalekCrypto {
    fn generate_keys(&self) -> KeyPair {
        let mut bytes = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(&mut *bytes);
        let secret = Zeroizing::new(Scalar::from_bytes_mod_order(*bytes));
        let public = (secret.deref() * ED25519_BASEPOINT_TABLE).compress();

        KeyPair {
            public: PublicKey(public.to_bytes()),
            secret: SecretKey(secret.to_bytes()),
        }
    }

    fn secret_to_public(&self, secret: &SecretKey) -> Result<PublicKey, CryptoError> {
        let scalar = Zeroizing::new(Scalar::from_bytes_mod_order(secret.0));
        if *scalar == Scalar::ZERO {
            return Err(CryptoError::InvalidKey);
        }
        let public = (scalar.deref() * ED25519_BASEPOINT_TABLE).compress();
        Ok(PublicKey(public.to_bytes()))
    }

    fn derive_output_key(
        &self,
        tx_secret: &SecretKey,
        receiver: &AccountAddress,
        index: usize,
    ) -> Result<PublicKey, CryptoError> {
        let tx_scalar = Zeroizing::new(Scalar::from_bytes_mod_order(tx_secret.0));
        let view_point = decompress(&receiver.view_public)?;
        let spend_point = decompress(&receiver.spend_public)?;

        let ecdh = Zeroizing::new(tx_scalar.deref() * view_point);
        let shared = Zeroizing::new(derivation_to_scalar(&ecdh, index));

        let out = spend_point + (shared.deref() * ED25519_BASEPOINT_TABLE);
        Ok(PublicKey(out.compress().to_bytes()))
    }

    fn derive_input_keys(
        &self,
        account: &AccountKeys,
        tx_public: &PublicKey,
        output_index: usize,
        output_key: &PublicKey,
    ) -> Result<(EphemeralKeys, KeyImage), CryptoError> {
        let spend_secret = account
            .spend_secret
            .as_ref()
            .ok_or(CryptoError::MissingSpendKey)?;

        let view_scalar = Zeroizing::new(Scalar::from_bytes_mod_order(account.view_secret.0));
        let spend_scalar = Zeroizing::new(Scalar::from_bytes_mod_order(spend_secret.0));
        let tx_point = decompress(tx_public)?;

        let ecdh = Zeroizing::new(view_scalar.deref() * tx_point);
        let shared = Zeroizing::new(derivation_to_scalar(&ecdh, output_index));

        let eph_secret = Zeroizing::new(shared.deref() + spend_scalar.deref());
        let eph_public = (eph_secret.deref() * ED25519_BASEPOINT_TABLE).compress();
        if eph_public.to_bytes() != output_key.0 {
            return Err(CryptoError::DerivationMismatch);
        }

        let image_scalar = Zeroizing::new(hash_to_scalar(&eph_public.to_bytes()));
        let image_factor = Zeroizing::new(eph_secret.deref() * image_scalar.deref());
        let image = (image_factor.deref() * ED25519_BASEPOINT_TABLE).compress();

        Ok((
            EphemeralKeys {
                public: PublicKey(eph_public.to_bytes()),
                secret: SecretKey(eph_secret.to_bytes()),
            },
            KeyImage(image.to_bytes()),
        ))
    }

    fn sign_input(
        &self,
        prefix_hash: &Hash,
        ephemeral: &EphemeralKeys,
        ring: &[PublicKey],
    ) -> Result<InputSignature, CryptoError> {
        let secret = Zeroizing::new(Scalar::from_bytes_mod_order(ephemeral.secret.0));

        // Deterministic nonce bound to the key and the message.
        let mut nonce_data = Zeroizing::new(Vec::with_capacity(64));
        nonce_data.extend_from_slice(&ephemeral.secret.0);
        nonce_data.extend_from_slice(&prefix_hash.0);
        let nonce = Zeroizing::new(hash_to_scalar(&nonce_data));
        let commitment = (nonce.deref() * ED25519_BASEPOINT_TABLE).compress();

        let mut challenge_data = Vec::with_capacity(64 + ring.len() * 32);
        challenge_data.extend_from_slice(&prefix_hash.0);
        challenge_data.extend_from_slice(&commitment.to_bytes());
        for member in ring {
            challenge_data.extend_from_slice(&member.0);
        }
        let challenge = hash_to_scalar(&challenge_data);

        let response = nonce.deref() + challenge * secret.deref();

        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&challenge.to_bytes());
        sig[32..].copy_from_slice(&response.to_bytes());
        Ok(InputSignature(sig))
    }
}
