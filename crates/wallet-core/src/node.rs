// SPDX-License-Identifier: Apache-2.0
//! Daemon seam consumed by the wallet.

use async_trait::async_trait;
use thiserror::Error;
use tx_builder::{PublicKey, Transaction};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node rpc failed: {0}")]
    Rpc(String),
}

#[derive(Clone, Copy, Debug)]
pub struct RandomOutputEntry {
    pub global_index: u32,
    pub output_key: PublicKey,
}

/// Random outputs the node sampled for one amount.
#[derive(Clone, Debug)]
pub struct RandomAmountOuts {
    pub amount: u64,
    pub outs: Vec<RandomOutputEntry>,
}

/// The subset of daemon RPC the wallet consumes. Implementations resolve the
/// futures on their own transport; errors surface as [`NodeError`] values.
#[async_trait]
pub trait Node: Send + Sync {
    fn last_known_block_height(&self) -> u32;

    fn minimal_fee(&self) -> u64;

    async fn random_outputs_for_amounts(
        &self,
        amounts: Vec<u64>,
        outs_count: u16,
    ) -> Result<Vec<RandomAmountOuts>, NodeError>;

    async fn relay_transaction(&self, transaction: &Transaction) -> Result<(), NodeError>;
}
