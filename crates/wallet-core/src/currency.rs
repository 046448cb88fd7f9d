// SPDX-License-Identifier: Apache-2.0
//! Currency parameter oracle: consensus constants, address codec, fusion
//! policy and amount formatting.

use sha3::{Digest, Keccak256};
use tx_builder::{decompose::canonical_power_of_ten, decompose_amount, AccountAddress, Hash, PublicKey};

use crate::error::{Result, WalletError};

/// Fusion transactions must consolidate: at least this many inputs per output.
const FUSION_TX_MIN_IN_OUT_COUNT_RATIO: usize = 4;
/// Bytes a serialized input occupies beyond its ring members.
const INPUT_BASE_SIZE: usize = 8 + 32 + 64;
/// Bytes per ring member reference.
const RING_MEMBER_SIZE: usize = 4;
/// Serialized output size.
const OUTPUT_SIZE: usize = 8 + 32;
/// Version, unlock time, counters, transaction public key.
const TX_HEADER_SIZE: usize = 1 + 8 + 3 * 8 + 32;

#[derive(Clone, Debug)]
pub struct Currency {
    pub genesis_block_hash: Hash,
    /// Human prefix of the address string.
    pub address_prefix: String,
    pub decimal_places: u32,
    pub dust_threshold: u64,
    pub block_granted_full_reward_zone: usize,
    pub miner_tx_blob_reserved_size: usize,
    pub max_tx_extra_size: usize,
    pub fusion_tx_max_size: usize,
    pub fusion_tx_min_input_count: usize,
    /// Seconds a block timestamp may run ahead of the wall clock; also bounds
    /// how far back an imported address forces a rescan.
    pub block_future_time_limit: u64,
    /// Subscription timestamps are rewound by this much to absorb clock skew.
    pub account_create_time_accuracy: u64,
}

impl Default for Currency {
    fn default() -> Self {
        Currency {
            genesis_block_hash: Hash([0x13u8; 32]),
            address_prefix: "cn".into(),
            decimal_places: 8,
            dust_threshold: 100,
            block_granted_full_reward_zone: 100_000,
            miner_tx_blob_reserved_size: 600,
            max_tx_extra_size: 1_024,
            fusion_tx_max_size: 30_000,
            fusion_tx_min_input_count: 12,
            block_future_time_limit: 60 * 60 * 2,
            account_create_time_accuracy: 60 * 60 * 24,
        }
    }
}

impl Currency {
    pub fn genesis_block_hash(&self) -> Hash {
        self.genesis_block_hash
    }

    /// Dust threshold effective at `_height`. Constant for now; the height
    /// argument keeps call sites honest about where the value applies.
    pub fn dust_threshold_at(&self, _height: u32) -> u64 {
        self.dust_threshold
    }

    pub fn upper_transaction_size_limit(&self) -> usize {
        self.block_granted_full_reward_zone * 2 - self.miner_tx_blob_reserved_size
    }

    pub fn decompose_amount(&self, amount: u64, dust_threshold: u64) -> Vec<u64> {
        decompose_amount(amount, dust_threshold)
    }

    /// How many inputs of ring size `mixin + 1` fit a transaction of
    /// `max_size` with `output_count` outputs.
    pub fn approximate_maximum_input_count(
        &self,
        max_size: usize,
        output_count: usize,
        mixin: u16,
    ) -> usize {
        let input_size = INPUT_BASE_SIZE + (mixin as usize + 1) * RING_MEMBER_SIZE;
        max_size
            .saturating_sub(TX_HEADER_SIZE)
            .saturating_sub(output_count * OUTPUT_SIZE)
            / input_size
    }

    /// Whether `amount` may serve as a fusion input under `threshold`;
    /// returns its decimal order when it does.
    pub fn fusion_input_power_of_ten(
        &self,
        amount: u64,
        threshold: u64,
        _height: u32,
    ) -> Option<u8> {
        if amount >= threshold {
            return None;
        }
        canonical_power_of_ten(amount)
    }

    /// Classify already-extracted input/output amounts as a fusion
    /// transaction.
    pub fn is_fusion_transaction(
        &self,
        input_amounts: &[u64],
        output_amounts: &[u64],
        size: usize,
        _height: u32,
    ) -> bool {
        if size > self.fusion_tx_max_size {
            return false;
        }
        if input_amounts.len() < self.fusion_tx_min_input_count {
            return false;
        }
        if input_amounts.len() < output_amounts.len() * FUSION_TX_MIN_IN_OUT_COUNT_RATIO {
            return false;
        }

        let mut input_total = 0u64;
        for amount in input_amounts {
            if canonical_power_of_ten(*amount).is_none() {
                return false;
            }
            input_total = match input_total.checked_add(*amount) {
                Some(total) => total,
                None => return false,
            };
        }

        let mut expected = self.decompose_amount(input_total, 0);
        expected.sort_unstable();
        let mut actual = output_amounts.to_vec();
        actual.sort_unstable();
        expected == actual
    }

    pub fn account_address_as_string(&self, address: &AccountAddress) -> String {
        let mut body = Vec::with_capacity(68);
        body.extend_from_slice(&address.spend_public.0);
        body.extend_from_slice(&address.view_public.0);
        body.extend_from_slice(&address_checksum(address));
        format!("{}{}", self.address_prefix, hex::encode(body))
    }

    pub fn parse_account_address(&self, address: &str) -> Result<AccountAddress> {
        let body = address
            .strip_prefix(self.address_prefix.as_str())
            .ok_or_else(|| WalletError::BadAddress(address.into()))?;
        let bytes = hex::decode(body).map_err(|_| WalletError::BadAddress(address.into()))?;
        if bytes.len() != 68 {
            return Err(WalletError::BadAddress(address.into()));
        }

        let mut spend = [0u8; 32];
        let mut view = [0u8; 32];
        spend.copy_from_slice(&bytes[..32]);
        view.copy_from_slice(&bytes[32..64]);
        let parsed = AccountAddress {
            spend_public: PublicKey(spend),
            view_public: PublicKey(view),
        };

        if bytes[64..] != address_checksum(&parsed) {
            return Err(WalletError::BadAddress(address.into()));
        }
        Ok(parsed)
    }

    pub fn is_valid_address(&self, address: &str) -> bool {
        self.parse_account_address(address).is_ok()
    }

    pub fn format_amount(&self, amount: u64) -> String {
        let divisor = 10u64.pow(self.decimal_places);
        format!(
            "{}.{:0width$}",
            amount / divisor,
            amount % divisor,
            width = self.decimal_places as usize
        )
    }
}

fn address_checksum(address: &AccountAddress) -> [u8; 4] {
    let mut hasher = Keccak256::new();
    hasher.update(address.spend_public.0);
    hasher.update(address.view_public.0);
    let digest: [u8; 32] = hasher.finalize().into();
    [digest[0], digest[1], digest[2], digest[3]]
}
