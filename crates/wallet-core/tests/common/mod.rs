// SPDX-License-Identifier: Apache-2.0
//! In-process node and synchronizer doubles driving the wallet under test.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tx_builder::{AccountAddress, DalekCrypto, Hash, PublicKey, RingCrypto, Transaction};
use wallet_core::container::{
    ContainerId, ContainerTransaction, MemoryContainer, SpendableOutput, TransfersContainer,
};
use wallet_core::currency::Currency;
use wallet_core::model::TransactionInfo;
use wallet_core::node::{Node, NodeError, RandomAmountOuts, RandomOutputEntry};
use wallet_core::sync::{AccountSubscription, SyncAdapter, TransfersSynchronizer};
use wallet_core::wallet::Wallet;

pub struct MockNode {
    pub height: AtomicU32,
    pub min_fee: AtomicU64,
    /// Random outputs returned per requested amount.
    pub mixin_supply: AtomicU32,
    pub fail_relay: AtomicBool,
    pub relayed: Mutex<Vec<Transaction>>,
}

impl MockNode {
    pub fn new() -> Arc<Self> {
        Arc::new(MockNode {
            height: AtomicU32::new(100),
            min_fee: AtomicU64::new(10),
            mixin_supply: AtomicU32::new(32),
            fail_relay: AtomicBool::new(false),
            relayed: Mutex::new(Vec::new()),
        })
    }

    pub fn relayed_count(&self) -> usize {
        self.relayed.lock().len()
    }
}

#[async_trait]
impl Node for MockNode {
    fn last_known_block_height(&self) -> u32 {
        self.height.load(Ordering::Relaxed)
    }

    fn minimal_fee(&self) -> u64 {
        self.min_fee.load(Ordering::Relaxed)
    }

    async fn random_outputs_for_amounts(
        &self,
        amounts: Vec<u64>,
        outs_count: u16,
    ) -> Result<Vec<RandomAmountOuts>, NodeError> {
        let supply = self.mixin_supply.load(Ordering::Relaxed) as usize;
        Ok(amounts
            .iter()
            .enumerate()
            .map(|(amount_index, amount)| RandomAmountOuts {
                amount: *amount,
                outs: (0..supply.min(outs_count as usize))
                    .map(|i| RandomOutputEntry {
                        global_index: 50_000 + (amount_index * 100 + i) as u32,
                        output_key: PublicKey([i as u8 + 1; 32]),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn relay_transaction(&self, transaction: &Transaction) -> Result<(), NodeError> {
        if self.fail_relay.load(Ordering::Relaxed) {
            return Err(NodeError::Rpc("relay refused".into()));
        }
        self.relayed.lock().push(transaction.clone());
        Ok(())
    }
}

#[derive(Default)]
struct SyncState {
    next_id: u32,
    containers: HashMap<ContainerId, Arc<MemoryContainer>>,
    subscriptions: Vec<(AccountAddress, ContainerId)>,
    known_blocks: Vec<Hash>,
    unconfirmed: Vec<Hash>,
    started: bool,
    fail_add_unconfirmed: bool,
}

#[derive(Default)]
pub struct MockSynchronizer {
    state: Mutex<SyncState>,
}

impl MockSynchronizer {
    pub fn new() -> Arc<Self> {
        Arc::new(MockSynchronizer::default())
    }

    pub fn container_id_for(&self, address: &AccountAddress) -> ContainerId {
        self.state
            .lock()
            .subscriptions
            .iter()
            .find(|(subscribed, _)| subscribed == address)
            .map(|(_, id)| *id)
            .expect("no subscription for address")
    }

    pub fn memory_container(&self, id: ContainerId) -> Arc<MemoryContainer> {
        self.state.lock().containers[&id].clone()
    }

    pub fn set_fail_add_unconfirmed(&self, fail: bool) {
        self.state.lock().fail_add_unconfirmed = fail;
    }

    pub fn unconfirmed_count(&self) -> usize {
        self.state.lock().unconfirmed.len()
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }
}

#[async_trait]
impl TransfersSynchronizer for MockSynchronizer {
    fn add_subscription(&self, subscription: AccountSubscription) -> ContainerId {
        let mut state = self.state.lock();
        let id = ContainerId(state.next_id);
        state.next_id += 1;
        state
            .containers
            .insert(id, Arc::new(MemoryContainer::new()));
        state
            .subscriptions
            .push((subscription.keys.address, id));
        id
    }

    fn remove_subscription(&self, address: &AccountAddress) {
        let mut state = self.state.lock();
        if let Some(position) = state
            .subscriptions
            .iter()
            .position(|(subscribed, _)| subscribed == address)
        {
            let (_, id) = state.subscriptions.remove(position);
            state.containers.remove(&id);
        }
    }

    fn subscriptions(&self) -> Vec<AccountAddress> {
        self.state
            .lock()
            .subscriptions
            .iter()
            .map(|(address, _)| *address)
            .collect()
    }

    fn container(&self, id: ContainerId) -> Option<Arc<dyn TransfersContainer>> {
        self.state
            .lock()
            .containers
            .get(&id)
            .map(|container| container.clone() as Arc<dyn TransfersContainer>)
    }

    fn view_key_known_blocks(&self, _view_public: &PublicKey) -> Vec<Hash> {
        self.state.lock().known_blocks.clone()
    }

    async fn add_unconfirmed_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<(), NodeError> {
        let mut state = self.state.lock();
        if state.fail_add_unconfirmed {
            return Err(NodeError::Rpc("synchronizer unavailable".into()));
        }
        state.unconfirmed.push(transaction.hash());
        Ok(())
    }

    async fn remove_unconfirmed_transaction(&self, hash: &Hash) {
        self.state.lock().unconfirmed.retain(|known| known != hash);
    }

    fn start(&self) {
        self.state.lock().started = true;
    }

    fn stop(&self) {
        self.state.lock().started = false;
    }
}

pub struct Harness {
    pub wallet: Wallet,
    pub adapter: SyncAdapter,
    pub node: Arc<MockNode>,
    pub sync: Arc<MockSynchronizer>,
    pub currency: Currency,
}

impl Harness {
    pub fn container_for(&self, address: &str) -> (ContainerId, Arc<MemoryContainer>) {
        let parsed = self.currency.parse_account_address(address).unwrap();
        let id = self.sync.container_id_for(&parsed);
        (id, self.sync.memory_container(id))
    }

    /// Credit `address` with one confirmed coinbase output and tell the
    /// container about the carrying transaction. The update callback is NOT
    /// fired; tests drive that explicitly through the adapter.
    pub fn credit_coinbase(
        &self,
        address: &str,
        amount: u64,
        block_height: u32,
        unlock_at: u32,
        global_index: u32,
    ) -> Hash {
        let crypto = DalekCrypto;
        let receiver = self.currency.parse_account_address(address).unwrap();
        let tx_keys = crypto.generate_keys();
        let output_key = crypto
            .derive_output_key(&tx_keys.secret, &receiver, 0)
            .unwrap();

        let tx_hash = Hash(tx_keys.public.0);

        let (_, container) = self.container_for(address);
        container.credit(
            SpendableOutput {
                amount,
                global_index,
                index_in_tx: 0,
                tx_public_key: tx_keys.public,
                output_key,
                tx_hash,
            },
            unlock_at,
        );
        container.put_transaction(ContainerTransaction {
            info: TransactionInfo {
                hash: tx_hash,
                block_height,
                timestamp: 1_700_000_000,
                unlock_time: 0,
                total_amount_in: 0,
                total_amount_out: amount,
                extra: Vec::new(),
            },
            inputs_amount: 0,
            outputs_amount: amount,
        });
        tx_hash
    }
}

/// Wallet with a small-denomination currency suited to the scenarios.
pub async fn harness(soft_lock: u32) -> Harness {
    harness_with_currency(
        Currency {
            dust_threshold: 10,
            ..Currency::default()
        },
        soft_lock,
    )
    .await
}

pub async fn harness_with_currency(currency: Currency, soft_lock: u32) -> Harness {
    let node = MockNode::new();
    let sync = MockSynchronizer::new();
    let (wallet, adapter) = Wallet::new(
        currency.clone(),
        node.clone(),
        sync.clone(),
        Arc::new(DalekCrypto),
        soft_lock,
    );
    Harness {
        wallet,
        adapter,
        node,
        sync,
        currency,
    }
}
