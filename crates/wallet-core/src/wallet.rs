// SPDX-License-Identifier: Apache-2.0
//! The wallet facade: serialized mutating operations, transfer lifecycle,
//! synchronizer plumbing and persistence.
//!
//! All mutators run under one async mutex, the wallet's cooperative writer
//! lock. The lock is deliberately held across node round-trips so that a
//! mutation observes the journal, balances, pending table and event queue as
//! one atomic unit; synchronizer work queues up behind it and is applied by a
//! single worker task in callback order.

use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use tx_builder::{
    compose_transaction, AccountAddress, Hash, KeyPair, PublicKey, ReceiverAmounts, RingCrypto,
    SecretKey, Transaction,
};

use crate::balance::BalanceTracker;
use crate::container::ContainerId;
use crate::currency::Currency;
use crate::error::{Result, WalletError};
use crate::events::{EventQueue, StopSignal, WalletEvent};
use crate::journal::{TransferJournal, TransferTotals};
use crate::keystore::{KeyStore, SpendRecord, TrackingMode, ViewIdentity};
use crate::model::{
    BlockTransactions, ContainerAmounts, DonationSettings, FusionEstimate, TransactionInfo,
    TransactionWithTransfers, Transfer, TransferKind, TransferParameters, TxRecord, TxState,
    UNCONFIRMED_HEIGHT,
};
use crate::node::{Node, RandomAmountOuts};
use crate::persistence::{
    AeadSnapshotCodec, SnapshotCodec, SpendRecordSnapshot, UnlockJobSnapshot, WalletSnapshot,
};
use crate::ring::{check_enough_mixins, prepare_inputs};
use crate::selector::{pick_fusion_inputs, select_transfers, OutputToSpend, SourceOutputs};
use crate::sync::{
    AccountSubscription, BlockHashChain, SyncAdapter, SyncNotification, TransfersSynchronizer,
};
use crate::unlock::{unlock_height, UnlockScheduler};

const MAX_FUSION_OUTPUT_COUNT: usize = 4;

#[derive(Clone, Copy, PartialEq, Eq)]
enum WalletStatus {
    NotInitialized,
    Initialized,
}

struct WalletState {
    status: WalletStatus,
    password: String,
    view: Option<ViewIdentity>,
    keystore: KeyStore,
    journal: TransferJournal,
    unlock: UnlockScheduler,
    balances: BalanceTracker,
    /// CREATED transactions awaiting relay, by journal index.
    pending: BTreeMap<usize, Transaction>,
    chain: BlockHashChain,
    soft_lock: u32,
    sync_started: bool,
}

struct WalletInner {
    currency: Currency,
    node: Arc<dyn Node>,
    synchronizer: Arc<dyn TransfersSynchronizer>,
    crypto: Arc<dyn RingCrypto>,
    codec: Arc<dyn SnapshotCodec>,
    state: Mutex<WalletState>,
    events: EventQueue,
    stop: StopSignal,
}

struct PreparedTransfer {
    transaction: Transaction,
    secret_key: SecretKey,
    destinations: Vec<Transfer>,
}

#[derive(Clone)]
pub struct Wallet {
    inner: Arc<WalletInner>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

impl Wallet {
    /// Build a wallet and the observer its synchronizer must call back into.
    /// Spawns the dispatcher worker, so a Tokio runtime must be running.
    pub fn new(
        currency: Currency,
        node: Arc<dyn Node>,
        synchronizer: Arc<dyn TransfersSynchronizer>,
        crypto: Arc<dyn RingCrypto>,
        transaction_soft_lock: u32,
    ) -> (Self, SyncAdapter) {
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
        let adapter = SyncAdapter::new(synchronizer.clone(), queue_tx);

        let wallet = Wallet {
            inner: Arc::new(WalletInner {
                currency,
                node,
                synchronizer,
                crypto,
                codec: Arc::new(AeadSnapshotCodec),
                state: Mutex::new(WalletState {
                    status: WalletStatus::NotInitialized,
                    password: String::new(),
                    view: None,
                    keystore: KeyStore::default(),
                    journal: TransferJournal::default(),
                    unlock: UnlockScheduler::default(),
                    balances: BalanceTracker::default(),
                    pending: BTreeMap::new(),
                    chain: BlockHashChain::default(),
                    soft_lock: transaction_soft_lock,
                    sync_started: false,
                }),
                events: EventQueue::new(),
                stop: StopSignal::new(),
            }),
        };

        let worker = wallet.clone();
        tokio::spawn(async move {
            while let Some(notification) = queue_rx.recv().await {
                worker.apply_sync_notification(notification).await;
            }
        });

        (wallet, adapter)
    }

    // --- gates -------------------------------------------------------------

    fn ensure_not_stopped(&self) -> Result<()> {
        if self.inner.stop.is_stopped() {
            return Err(WalletError::OperationCancelled);
        }
        Ok(())
    }

    fn ensure_initialized(state: &WalletState) -> Result<()> {
        if state.status != WalletStatus::Initialized {
            return Err(WalletError::NotInitialized);
        }
        Ok(())
    }

    fn ensure_not_tracking(state: &WalletState) -> Result<()> {
        if state.keystore.tracking_mode() == TrackingMode::Tracking {
            return Err(WalletError::TrackingMode);
        }
        Ok(())
    }

    // --- lifecycle ---------------------------------------------------------

    /// Initialize with a freshly generated view key pair.
    pub async fn initialize(&self, password: &str) -> Result<()> {
        let view_keys = self.inner.crypto.generate_keys();
        self.init_with_keys(view_keys, password).await
    }

    /// Initialize with an existing view secret key.
    pub async fn initialize_with_view_key(
        &self,
        view_secret: SecretKey,
        password: &str,
    ) -> Result<()> {
        let view_public = self
            .inner
            .crypto
            .secret_to_public(&view_secret)
            .map_err(|_| WalletError::KeyGenerationError)?;
        self.init_with_keys(
            KeyPair {
                public: view_public,
                secret: view_secret,
            },
            password,
        )
        .await
    }

    async fn init_with_keys(&self, view_keys: KeyPair, password: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.status != WalletStatus::NotInitialized {
            return Err(WalletError::AlreadyInitialized);
        }
        self.ensure_not_stopped()?;

        state.view = Some(ViewIdentity {
            public: view_keys.public,
            secret: view_keys.secret,
        });
        state.password = password.to_string();
        state
            .chain
            .reset_to(self.inner.currency.genesis_block_hash());
        state.status = WalletStatus::Initialized;
        info!("wallet initialized");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.do_shutdown(&mut state);
        Ok(())
    }

    fn do_shutdown(&self, state: &mut WalletState) {
        for address in self.inner.synchronizer.subscriptions() {
            self.inner.synchronizer.remove_subscription(&address);
        }
        self.stop_sync(state);

        state.keystore.clear();
        state.journal.clear();
        state.unlock.clear();
        state.pending.clear();
        state.balances.clear();
        state.chain.clear();
        self.inner.events.clear();

        state.view = None;
        state.status = WalletStatus::NotInitialized;
        info!("wallet shut down");
    }

    pub fn start(&self) {
        self.inner.stop.start();
    }

    /// Cancel in-flight waits; any subsequent call fails with
    /// `OperationCancelled` until `start` re-arms the wallet.
    pub fn stop(&self) {
        self.inner.stop.stop();
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;

        if state.password != old_password {
            return Err(WalletError::WrongPassword);
        }
        state.password = new_password.to_string();
        Ok(())
    }

    // --- addresses ---------------------------------------------------------

    /// Create a brand-new spending address.
    pub async fn create_address(&self) -> Result<String> {
        let spend_keys = self.inner.crypto.generate_keys();
        self.do_create_address(spend_keys.public, Some(spend_keys.secret), now_secs())
            .await
    }

    /// Import an address from its spend secret key. The unknown creation
    /// time forces a rescan from the beginning.
    pub async fn create_address_from_secret(&self, spend_secret: SecretKey) -> Result<String> {
        let spend_public = self
            .inner
            .crypto
            .secret_to_public(&spend_secret)
            .map_err(|_| WalletError::KeyGenerationError)?;
        self.do_create_address(spend_public, Some(spend_secret), 0)
            .await
    }

    /// Import a tracking (watch-only) address.
    pub async fn create_tracking_address(&self, spend_public: PublicKey) -> Result<String> {
        self.do_create_address(spend_public, None, 0).await
    }

    async fn do_create_address(
        &self,
        spend_public: PublicKey,
        spend_secret: Option<SecretKey>,
        creation_timestamp: u64,
    ) -> Result<String> {
        let mut state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;

        self.stop_sync(&mut state);

        let address =
            match self.add_wallet_record(&mut state, spend_public, spend_secret, creation_timestamp)
            {
                Ok(address) => address,
                Err(err) => {
                    self.start_sync(&mut state);
                    return Err(err);
                }
            };

        // An address created far in the past must be rescanned from its
        // creation time: snapshot, tear down, reload. Re-subscription on load
        // rewinds every sync start to the recorded creation timestamps.
        if creation_timestamp + self.inner.currency.block_future_time_limit < now_secs() {
            let password = state.password.clone();
            if let Err(err) = self.reload_in_place(&mut state, &password) {
                self.start_sync(&mut state);
                return Err(err);
            }
        }

        self.start_sync(&mut state);
        Ok(address)
    }

    fn add_wallet_record(
        &self,
        state: &mut WalletState,
        spend_public: PublicKey,
        spend_secret: Option<SecretKey>,
        creation_timestamp: u64,
    ) -> Result<String> {
        let view = state.view.clone().ok_or(WalletError::NotInitialized)?;

        match (state.keystore.tracking_mode(), spend_secret.is_some()) {
            (TrackingMode::Tracking, true) | (TrackingMode::Spending, false) => {
                return Err(WalletError::BadAddress(
                    "cannot mix tracking and spending addresses".into(),
                ))
            }
            _ => {}
        }
        if state.keystore.contains(&spend_public) {
            return Err(WalletError::AddressAlreadyExists);
        }

        let address = AccountAddress {
            spend_public,
            view_public: view.public,
        };
        let accuracy = self.inner.currency.account_create_time_accuracy;
        let container = self.inner.synchronizer.add_subscription(AccountSubscription {
            keys: state.keystore.account_keys(
                &SpendRecord {
                    spend_public,
                    spend_secret: spend_secret.clone(),
                    container: ContainerId(0),
                    actual_balance: 0,
                    pending_balance: 0,
                    creation_timestamp,
                },
                &view,
            ),
            sync_start_height: 0,
            sync_start_timestamp: creation_timestamp.max(accuracy) - accuracy,
            transaction_spendable_age: state.soft_lock,
        });

        state.keystore.insert(SpendRecord {
            spend_public,
            spend_secret,
            container,
            actual_balance: 0,
            pending_balance: 0,
            creation_timestamp,
        })?;

        if state.keystore.len() == 1 {
            let known = self.inner.synchronizer.view_key_known_blocks(&view.public);
            if !known.is_empty() {
                state.chain.clear();
                state.chain.extend(known);
            }
        }

        Ok(self.inner.currency.account_address_as_string(&address))
    }

    pub async fn delete_address(&self, address: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;

        let parsed = self.inner.currency.parse_account_address(address)?;
        if !state.keystore.contains(&parsed.spend_public) {
            return Err(WalletError::ObjectNotFound(address.to_string()));
        }

        self.stop_sync(&mut state);

        let record = state.keystore.by_spend_key(&parsed.spend_public)?.clone();
        state.balances.forget_record(&record);
        self.inner.synchronizer.remove_subscription(&parsed);
        state.unlock.remove_container(record.container);

        let remaining: HashSet<String> = state
            .keystore
            .iter()
            .filter(|r| r.spend_public != parsed.spend_public)
            .map(|r| self.record_address(&state, r))
            .collect();
        let mut deleted = Vec::new();
        let updated =
            state
                .journal
                .delete_transfers_for_address(address, &remaining, &mut deleted);
        for index in &deleted {
            state.pending.remove(index);
        }

        state.keystore.remove(&parsed.spend_public)?;

        if !state.keystore.is_empty() {
            self.start_sync(&mut state);
        } else {
            state
                .chain
                .reset_to(self.inner.currency.genesis_block_hash());
        }

        for index in updated {
            self.inner
                .events
                .push(WalletEvent::TransactionUpdated { index });
        }
        info!(address, "address removed");
        Ok(())
    }

    fn record_address(&self, state: &WalletState, record: &SpendRecord) -> String {
        let view_public = state
            .view
            .as_ref()
            .map(|view| view.public)
            .unwrap_or(PublicKey([0u8; 32]));
        self.inner.currency.account_address_as_string(&AccountAddress {
            spend_public: record.spend_public,
            view_public,
        })
    }

    pub async fn address(&self, index: usize) -> Result<String> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        let record = state.keystore.get(index).ok_or(WalletError::IndexOutOfRange)?;
        Ok(self.record_address(&state, record))
    }

    pub async fn address_count(&self) -> Result<usize> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        Ok(state.keystore.len())
    }

    pub async fn view_key_pair(&self) -> Result<KeyPair> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        let view = state.view.as_ref().ok_or(WalletError::NotInitialized)?;
        Ok(KeyPair {
            public: view.public,
            secret: view.secret.clone(),
        })
    }

    pub async fn spend_keys(&self, address: &str) -> Result<(PublicKey, Option<SecretKey>)> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        let parsed = self.inner.currency.parse_account_address(address)?;
        let record = state
            .keystore
            .by_spend_key(&parsed.spend_public)
            .map_err(|_| WalletError::ObjectNotFound(address.to_string()))?;
        Ok((record.spend_public, record.spend_secret.clone()))
    }

    // --- balances ----------------------------------------------------------

    pub async fn actual_balance(&self) -> Result<u64> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        Ok(state.balances.actual)
    }

    pub async fn pending_balance(&self) -> Result<u64> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        Ok(state.balances.pending)
    }

    pub async fn actual_balance_of(&self, address: &str) -> Result<u64> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        let parsed = self.inner.currency.parse_account_address(address)?;
        Ok(state.keystore.by_spend_key(&parsed.spend_public)?.actual_balance)
    }

    pub async fn pending_balance_of(&self, address: &str) -> Result<u64> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        let parsed = self.inner.currency.parse_account_address(address)?;
        Ok(state
            .keystore
            .by_spend_key(&parsed.spend_public)?
            .pending_balance)
    }

    // --- journal reads -----------------------------------------------------

    pub async fn transaction_count(&self) -> Result<usize> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        Ok(state.journal.len())
    }

    pub async fn transaction(&self, index: usize) -> Result<TxRecord> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        state
            .journal
            .get(index)
            .cloned()
            .ok_or(WalletError::IndexOutOfRange)
    }

    pub async fn transaction_by_hash(&self, hash: &Hash) -> Result<TransactionWithTransfers> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        let index = state
            .journal
            .index_of(hash)
            .ok_or_else(|| WalletError::ObjectNotFound(format!("transaction {hash}")))?;
        Ok(TransactionWithTransfers {
            transaction: state.journal.get(index).cloned().expect("index from map"),
            transfers: state.journal.transfers(index),
        })
    }

    pub async fn transaction_transfers(&self, index: usize) -> Result<Vec<Transfer>> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        if index >= state.journal.len() {
            return Err(WalletError::IndexOutOfRange);
        }
        Ok(state.journal.transfers(index))
    }

    pub async fn transaction_transfer(
        &self,
        index: usize,
        transfer_index: usize,
    ) -> Result<Transfer> {
        self.transaction_transfers(index)
            .await?
            .into_iter()
            .nth(transfer_index)
            .ok_or(WalletError::IndexOutOfRange)
    }

    pub async fn transaction_secret_key(&self, index: usize) -> Result<Option<SecretKey>> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        state
            .journal
            .get(index)
            .map(|record| record.secret_key.clone())
            .ok_or(WalletError::IndexOutOfRange)
    }

    /// SUCCEEDED transactions not yet seen in a block.
    pub async fn unconfirmed_transactions(&self) -> Result<Vec<TransactionWithTransfers>> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        Ok(state
            .journal
            .indexes_at_height(UNCONFIRMED_HEIGHT)
            .iter()
            .filter_map(|index| {
                let record = state.journal.get(*index)?;
                (record.state == TxState::Succeeded).then(|| TransactionWithTransfers {
                    transaction: record.clone(),
                    transfers: state.journal.transfers(*index),
                })
            })
            .collect())
    }

    pub async fn delayed_transaction_indexes(&self) -> Result<Vec<usize>> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        Self::ensure_not_tracking(&state)?;
        Ok(state.pending.keys().copied().collect())
    }

    pub async fn block_count(&self) -> Result<usize> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        Ok(state.chain.len())
    }

    pub async fn block_hashes(&self, start_height: u32, count: usize) -> Result<Vec<Hash>> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        Ok(state.chain.hashes(start_height, count))
    }

    /// Confirmed SUCCEEDED transactions grouped per seen block, starting at
    /// `start_height`.
    pub async fn transactions_in_blocks(
        &self,
        start_height: u32,
        count: usize,
    ) -> Result<Vec<BlockTransactions>> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        self.collect_block_transactions(&state, start_height, count)
    }

    pub async fn transactions_by_block_hash(
        &self,
        block_hash: &Hash,
        count: usize,
    ) -> Result<Vec<BlockTransactions>> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;
        match state.chain.height_of(block_hash) {
            Some(height) => self.collect_block_transactions(&state, height, count),
            None => Ok(Vec::new()),
        }
    }

    fn collect_block_transactions(
        &self,
        state: &WalletState,
        start_height: u32,
        count: usize,
    ) -> Result<Vec<BlockTransactions>> {
        if count == 0 {
            return Err(WalletError::WrongParameters(
                "blocks count must be greater than zero".into(),
            ));
        }

        let mut result = Vec::new();
        let chain_len = state.chain.len() as u32;
        if start_height >= chain_len {
            return Ok(result);
        }

        let stop = chain_len.min(start_height.saturating_add(count as u32));
        for height in start_height..stop {
            let block_hash = state.chain.get(height).expect("height bounded by len");
            let transactions = state
                .journal
                .indexes_at_height(height)
                .iter()
                .filter_map(|index| {
                    let record = state.journal.get(*index)?;
                    (record.state == TxState::Succeeded).then(|| TransactionWithTransfers {
                        transaction: record.clone(),
                        transfers: state.journal.transfers(*index),
                    })
                })
                .collect();
            result.push(BlockTransactions {
                block_hash,
                transactions,
            });
        }
        Ok(result)
    }

    // --- events ------------------------------------------------------------

    /// Wait for the next observable event; resolves with
    /// `OperationCancelled` once the wallet is stopped.
    pub async fn next_event(&self) -> Result<WalletEvent> {
        {
            let state = self.inner.state.lock().await;
            Self::ensure_initialized(&state)?;
        }
        self.inner.events.next(&self.inner.stop).await
    }

    // --- transfer lifecycle ------------------------------------------------

    /// Compose, persist and immediately relay a transaction.
    pub async fn transfer(&self, parameters: TransferParameters) -> Result<usize> {
        let result = {
            let mut state = self.inner.state.lock().await;
            Self::ensure_initialized(&state)?;
            Self::ensure_not_tracking(&state)?;
            self.ensure_not_stopped()?;
            self.do_transfer(&mut state, parameters, true).await
        };
        tokio::task::yield_now().await;
        result
    }

    /// Compose and persist a transaction without relaying; commit later.
    pub async fn make_transaction(&self, parameters: TransferParameters) -> Result<usize> {
        let result = {
            let mut state = self.inner.state.lock().await;
            Self::ensure_initialized(&state)?;
            Self::ensure_not_tracking(&state)?;
            self.ensure_not_stopped()?;
            self.do_transfer(&mut state, parameters, false).await
        };
        tokio::task::yield_now().await;
        result
    }

    /// Relay a previously made transaction. Only valid while CREATED with a
    /// pending blob; a failed relay leaves it CREATED for retry or rollback.
    pub async fn commit_transaction(&self, index: usize) -> Result<()> {
        let result = {
            let mut state = self.inner.state.lock().await;
            Self::ensure_initialized(&state)?;
            self.ensure_not_stopped()?;
            Self::ensure_not_tracking(&state)?;

            if index >= state.journal.len() {
                return Err(WalletError::IndexOutOfRange);
            }
            let is_created = state
                .journal
                .get(index)
                .map(|record| record.state == TxState::Created)
                .unwrap_or(false);
            let Some(transaction) = state.pending.get(&index).cloned() else {
                return Err(WalletError::TransferImpossible);
            };
            if !is_created {
                return Err(WalletError::TransferImpossible);
            }

            self.ensure_not_stopped()?;
            self.inner.node.relay_transaction(&transaction).await?;

            self.update_state_and_push(&mut state, index, TxState::Succeeded);
            state.pending.remove(&index);
            info!(index, "transaction committed");
            Ok(())
        };
        tokio::task::yield_now().await;
        result
    }

    /// Forget an uncommitted transaction. The journal entry remains; the
    /// synchronizer's deletion callback will mark it CANCELLED.
    pub async fn rollback_uncommitted_transaction(&self, index: usize) -> Result<()> {
        let result = {
            let mut state = self.inner.state.lock().await;
            Self::ensure_initialized(&state)?;
            self.ensure_not_stopped()?;
            Self::ensure_not_tracking(&state)?;

            if index >= state.journal.len() {
                return Err(WalletError::IndexOutOfRange);
            }
            let is_created = state
                .journal
                .get(index)
                .map(|record| record.state == TxState::Created)
                .unwrap_or(false);
            let Some(transaction) = state.pending.get(&index) else {
                return Err(WalletError::CancelImpossible);
            };
            if !is_created {
                return Err(WalletError::CancelImpossible);
            }

            let hash = transaction.hash();
            self.inner
                .synchronizer
                .remove_unconfirmed_transaction(&hash)
                .await;
            state.pending.remove(&index);
            info!(index, "transaction rolled back");
            Ok(())
        };
        tokio::task::yield_now().await;
        result
    }

    async fn do_transfer(
        &self,
        state: &mut WalletState,
        parameters: TransferParameters,
        send: bool,
    ) -> Result<usize> {
        self.validate_transfer_parameters(state, &parameters)?;
        let change_destination = self.change_destination(state, &parameters)?;

        let sources = if parameters.source_addresses.is_empty() {
            self.pick_wallets_with_money(state)?
        } else {
            self.pick_wallets(state, &parameters.source_addresses)?
        };

        let prepared = self
            .prepare_transfer(sources, &parameters, change_destination)
            .await?;
        self.validate_save_and_send(state, prepared, send).await
    }

    fn validate_transfer_parameters(
        &self,
        state: &WalletState,
        parameters: &TransferParameters,
    ) -> Result<()> {
        if parameters.destinations.is_empty() {
            return Err(WalletError::ZeroDestination);
        }

        let minimal_fee = self.inner.node.minimal_fee();
        if parameters.fee < minimal_fee {
            return Err(WalletError::FeeTooSmall {
                fee: parameters.fee,
                minimum: minimal_fee,
            });
        }

        if parameters.donation.address.is_empty() != (parameters.donation.threshold == 0) {
            return Err(WalletError::WrongParameters(
                "donation needs both address and threshold".into(),
            ));
        }

        for source in &parameters.source_addresses {
            let parsed = self.inner.currency.parse_account_address(source)?;
            if !self.is_my_address(state, &parsed) {
                return Err(WalletError::BadAddress(format!(
                    "source address does not belong to the wallet: {source}"
                )));
            }
        }

        for order in &parameters.destinations {
            self.inner.currency.parse_account_address(&order.address)?;
            if order.amount >= i64::MAX as u64 {
                return Err(WalletError::WrongAmount(format!(
                    "order amount must not exceed {}",
                    i64::MAX
                )));
            }
        }

        if parameters.change_destination.is_empty() {
            if parameters.source_addresses.len() > 1
                || (parameters.source_addresses.is_empty() && state.keystore.len() > 1)
            {
                return Err(WalletError::ChangeAddressRequired);
            }
        } else {
            let parsed = self
                .inner
                .currency
                .parse_account_address(&parameters.change_destination)
                .map_err(|_| WalletError::BadAddress("wrong change address".into()))?;
            if !self.is_my_address(state, &parsed) {
                return Err(WalletError::ChangeAddressNotFound);
            }
        }

        Ok(())
    }

    fn is_my_address(&self, state: &WalletState, address: &AccountAddress) -> bool {
        state
            .view
            .as_ref()
            .map(|view| view.public == address.view_public)
            .unwrap_or(false)
            && state.keystore.contains(&address.spend_public)
    }

    fn change_destination(
        &self,
        state: &WalletState,
        parameters: &TransferParameters,
    ) -> Result<AccountAddress> {
        if !parameters.change_destination.is_empty() {
            return self
                .inner
                .currency
                .parse_account_address(&parameters.change_destination);
        }

        if state.keystore.len() == 1 {
            let record = state.keystore.get(0).expect("non-empty keystore");
            let view = state.view.as_ref().ok_or(WalletError::NotInitialized)?;
            return Ok(AccountAddress {
                spend_public: record.spend_public,
                view_public: view.public,
            });
        }

        // Validation left exactly one owned source address.
        self.inner
            .currency
            .parse_account_address(&parameters.source_addresses[0])
    }

    fn pick_wallets_with_money(&self, state: &WalletState) -> Result<Vec<SourceOutputs>> {
        let view = state.view.as_ref().ok_or(WalletError::NotInitialized)?;
        Ok(state
            .keystore
            .iter()
            .filter(|record| record.actual_balance != 0)
            .filter_map(|record| {
                let container = self.inner.synchronizer.container(record.container)?;
                Some(SourceOutputs {
                    account: state.keystore.account_keys(record, view),
                    container: record.container,
                    outputs: container.spendable_outputs(),
                })
            })
            .collect())
    }

    fn pick_wallets(&self, state: &WalletState, addresses: &[String]) -> Result<Vec<SourceOutputs>> {
        let view = state.view.as_ref().ok_or(WalletError::NotInitialized)?;
        let mut sources = Vec::with_capacity(addresses.len());
        for address in addresses {
            let parsed = self.inner.currency.parse_account_address(address)?;
            let record = state.keystore.by_spend_key(&parsed.spend_public)?;
            let Some(container) = self.inner.synchronizer.container(record.container) else {
                continue;
            };
            let outputs = container.spendable_outputs();
            if !outputs.is_empty() {
                sources.push(SourceOutputs {
                    account: state.keystore.account_keys(record, view),
                    container: record.container,
                    outputs,
                });
            }
        }
        Ok(sources)
    }

    async fn prepare_transfer(
        &self,
        sources: Vec<SourceOutputs>,
        parameters: &TransferParameters,
        change_destination: AccountAddress,
    ) -> Result<PreparedTransfer> {
        let mut destinations = convert_orders_to_transfers(&parameters.destinations)?;
        let needed_money = count_needed_money(&destinations, parameters.fee)?;

        let height = self.inner.node.last_known_block_height();
        let dust_threshold = self.inner.currency.dust_threshold_at(height);

        let (selected, found_money) =
            select_transfers(needed_money, parameters.mixin == 0, dust_threshold, sources);
        if found_money < needed_money {
            return Err(WalletError::WrongAmount(format!(
                "not enough money: found {found_money}, need {needed_money}"
            )));
        }

        let mixin_result = if parameters.mixin != 0 {
            self.request_mixin_outs(&selected, parameters.mixin).await?
        } else {
            Vec::new()
        };
        let prepared_inputs = prepare_inputs(&selected, &mixin_result, parameters.mixin);

        let donation_amount = push_donation_transfer_if_possible(
            &parameters.donation,
            found_money - needed_money,
            dust_threshold,
            &mut destinations,
            &self.inner.currency,
        )?;
        let change_amount = found_money - needed_money - donation_amount;

        let mut decomposed = self.split_destinations(&destinations, dust_threshold)?;
        if change_amount != 0 {
            destinations.push(Transfer {
                kind: TransferKind::Change,
                address: self
                    .inner
                    .currency
                    .account_address_as_string(&change_destination),
                amount: change_amount as i64,
            });
            decomposed.push(ReceiverAmounts {
                receiver: change_destination,
                amounts: self
                    .inner
                    .currency
                    .decompose_amount(change_amount, dust_threshold),
            });
        }

        let (transaction, secret_key) = compose_transaction(
            self.inner.crypto.as_ref(),
            &decomposed,
            &prepared_inputs,
            parameters.extra.clone(),
            parameters.unlock_timestamp,
        )?;

        Ok(PreparedTransfer {
            transaction,
            secret_key,
            destinations,
        })
    }

    fn split_destinations(
        &self,
        destinations: &[Transfer],
        dust_threshold: u64,
    ) -> Result<Vec<ReceiverAmounts>> {
        let mut decomposed = Vec::with_capacity(destinations.len());
        for destination in destinations {
            let receiver = self
                .inner
                .currency
                .parse_account_address(&destination.address)?;
            decomposed.push(ReceiverAmounts {
                receiver,
                amounts: self
                    .inner
                    .currency
                    .decompose_amount(destination.amount as u64, dust_threshold),
            });
        }
        Ok(decomposed)
    }

    async fn request_mixin_outs(
        &self,
        selected: &[OutputToSpend],
        mixin: u16,
    ) -> Result<Vec<RandomAmountOuts>> {
        let amounts: Vec<u64> = selected.iter().map(|pick| pick.output.amount).collect();

        self.ensure_not_stopped()?;
        let mixin_result = self
            .inner
            .node
            .random_outputs_for_amounts(amounts, mixin)
            .await?;
        check_enough_mixins(&mixin_result, mixin, selected.len())?;
        Ok(mixin_result)
    }

    /// Size- and policy-check a composed transaction, persist it as CREATED,
    /// hand it to the synchronizer and either relay it or park it in the
    /// pending table. Every step after the journal insert unwinds on error.
    async fn validate_save_and_send(
        &self,
        state: &mut WalletState,
        prepared: PreparedTransfer,
        send: bool,
    ) -> Result<usize> {
        let transaction = prepared.transaction;
        let blob = transaction.to_bytes()?;

        if blob.len() > self.inner.currency.upper_transaction_size_limit() {
            return Err(WalletError::TransactionSizeTooBig);
        }
        if transaction.prefix.extra.len() > self.inner.currency.max_tx_extra_size {
            return Err(WalletError::ExtraTooLarge);
        }

        let fee = transaction
            .input_total()
            .saturating_sub(transaction.output_total());
        let hash = transaction.hash();
        debug!(%hash, fee, size = blob.len(), "composed transaction");

        let index = state.journal.insert_pending(
            hash,
            fee,
            transaction.prefix.extra.clone(),
            transaction.prefix.unlock_time,
            now_secs(),
            Some(prepared.secret_key),
        );
        self.inner
            .events
            .push(WalletEvent::TransactionCreated { index });
        state.journal.push_transfers(index, &prepared.destinations);

        if let Err(err) = self
            .inner
            .synchronizer
            .add_unconfirmed_transaction(&transaction)
            .await
        {
            warn!(%hash, "failed to register unconfirmed transaction");
            self.update_state_and_push(state, index, TxState::Failed);
            return Err(err.into());
        }

        if send {
            let relay_result = match self.ensure_not_stopped() {
                Ok(()) => self
                    .inner
                    .node
                    .relay_transaction(&transaction)
                    .await
                    .map_err(WalletError::from),
                Err(err) => Err(err),
            };
            if let Err(err) = relay_result {
                warn!(%hash, "relay failed, rolling back");
                // Best effort; a leftover unconfirmed entry is cleaned up by
                // the pool resynchronization after restart.
                self.inner
                    .synchronizer
                    .remove_unconfirmed_transaction(&hash)
                    .await;
                self.update_state_and_push(state, index, TxState::Failed);
                return Err(err);
            }
            self.update_state_and_push(state, index, TxState::Succeeded);
        } else {
            state.pending.insert(index, transaction);
        }

        Ok(index)
    }

    fn update_state_and_push(&self, state: &mut WalletState, index: usize, new_state: TxState) {
        if state.journal.update_state(index, new_state) {
            self.inner
                .events
                .push(WalletEvent::TransactionUpdated { index });
        }
    }

    // --- fusion ------------------------------------------------------------

    pub async fn estimate_fusion(&self, threshold: u64) -> Result<FusionEstimate> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;

        let height = self.inner.node.last_known_block_height();
        let mut estimate = FusionEstimate::default();
        let mut bucket_sizes = [0usize; crate::selector::FUSION_BUCKETS];

        for source in self.pick_wallets_with_money(&state)? {
            estimate.total_output_count += source.outputs.len();
            for output in &source.outputs {
                if let Some(power) = self.inner.currency.fusion_input_power_of_ten(
                    output.amount,
                    threshold,
                    height,
                ) {
                    bucket_sizes[power as usize] += 1;
                }
            }
        }

        for bucket_size in bucket_sizes {
            if bucket_size >= self.inner.currency.fusion_tx_min_input_count {
                estimate.fusion_ready_count += bucket_size;
            }
        }
        Ok(estimate)
    }

    /// Consolidate many small same-decade inputs into few outputs, paid to
    /// the wallet's first address, zero fee. Returns `None` when there is
    /// nothing to optimize.
    pub async fn create_fusion_transaction(
        &self,
        threshold: u64,
        mixin: u16,
    ) -> Result<Option<usize>> {
        let result = {
            let mut state = self.inner.state.lock().await;
            Self::ensure_initialized(&state)?;
            Self::ensure_not_tracking(&state)?;
            self.ensure_not_stopped()?;
            self.do_create_fusion(&mut state, threshold, mixin).await
        };
        tokio::task::yield_now().await;
        result
    }

    async fn do_create_fusion(
        &self,
        state: &mut WalletState,
        threshold: u64,
        mixin: u16,
    ) -> Result<Option<usize>> {
        let height = self.inner.node.last_known_block_height();
        let dust_threshold = self.inner.currency.dust_threshold_at(height);

        if threshold <= dust_threshold {
            return Err(WalletError::WrongParameters(format!(
                "threshold must be greater than {dust_threshold}"
            )));
        }
        if state.keystore.is_empty() {
            return Err(WalletError::WrongParameters(
                "at least one address required".into(),
            ));
        }

        let min_input_count = self.inner.currency.fusion_tx_min_input_count;
        let max_input_count = self.inner.currency.approximate_maximum_input_count(
            self.inner.currency.fusion_tx_max_size,
            MAX_FUSION_OUTPUT_COUNT,
            mixin,
        );
        if max_input_count < min_input_count {
            return Err(WalletError::MixinCountTooBig);
        }

        let sources = self.pick_wallets_with_money(state)?;
        let mut fusion_inputs = pick_fusion_inputs(
            &sources,
            threshold,
            min_input_count,
            max_input_count,
            &self.inner.currency,
            height,
        );
        if fusion_inputs.len() < min_input_count {
            // nothing to optimize
            return Ok(None);
        }

        let mixin_result = if mixin != 0 {
            self.request_mixin_outs(&fusion_inputs, mixin).await?
        } else {
            Vec::new()
        };
        let mut prepared_inputs = prepare_inputs(&fusion_inputs, &mixin_result, mixin);

        let mut round = 0usize;
        let (transaction, secret_key) = loop {
            if round != 0 {
                fusion_inputs.pop();
                prepared_inputs.pop();
            }
            round += 1;

            let inputs_amount: u64 = fusion_inputs
                .iter()
                .fold(0u64, |acc, pick| acc.saturating_add(pick.output.amount));
            let decomposed = self.decompose_fusion_outputs(state, inputs_amount)?;

            let (transaction, secret_key) = compose_transaction(
                self.inner.crypto.as_ref(),
                &[decomposed],
                &prepared_inputs,
                Vec::new(),
                0,
            )?;

            let size = transaction.to_bytes()?.len();
            if !(size > self.inner.currency.fusion_tx_max_size
                && fusion_inputs.len() >= min_input_count)
            {
                break (transaction, secret_key);
            }
        };

        if fusion_inputs.len() < min_input_count {
            return Err(WalletError::InternalWalletError(
                "unable to create fusion transaction".into(),
            ));
        }

        let index = self
            .validate_save_and_send(
                state,
                PreparedTransfer {
                    transaction,
                    secret_key,
                    destinations: Vec::new(),
                },
                true,
            )
            .await?;
        Ok(Some(index))
    }

    fn decompose_fusion_outputs(
        &self,
        state: &WalletState,
        inputs_amount: u64,
    ) -> Result<ReceiverAmounts> {
        let record = state.keystore.get(0).ok_or(WalletError::WalletNotFound)?;
        let view = state.view.as_ref().ok_or(WalletError::NotInitialized)?;

        let mut amounts = self.inner.currency.decompose_amount(inputs_amount, 0);
        amounts.sort_unstable();
        debug_assert!(amounts.len() <= MAX_FUSION_OUTPUT_COUNT);
        Ok(ReceiverAmounts {
            receiver: AccountAddress {
                spend_public: record.spend_public,
                view_public: view.public,
            },
            amounts,
        })
    }

    /// Fusion classification is a pure function of the journal entry and the
    /// container data, computed on demand.
    pub async fn is_fusion_transaction(&self, index: usize) -> Result<bool> {
        let state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;

        let record = state
            .journal
            .get(index)
            .cloned()
            .ok_or(WalletError::IndexOutOfRange)?;
        Ok(self.classify_fusion(&state, &record))
    }

    fn classify_fusion(&self, state: &WalletState, record: &TxRecord) -> bool {
        if record.fee != 0 {
            return false;
        }

        let mut inputs_sum = 0u64;
        let mut outputs_sum = 0u64;
        let mut input_amounts = Vec::new();
        let mut output_amounts: Vec<u64> = Vec::new();
        let mut found_info = None;

        for spend_record in state.keystore.iter() {
            let Some(container) = self.inner.synchronizer.container(spend_record.container)
            else {
                continue;
            };

            for output in container.transaction_outputs(&record.hash) {
                let slot = output.index_in_tx as usize;
                if output_amounts.len() <= slot {
                    output_amounts.resize(slot + 1, 0);
                }
                output_amounts[slot] = output.amount;
                outputs_sum += output.amount;
            }
            for input in container.transaction_inputs(&record.hash) {
                inputs_sum += input.amount;
                input_amounts.push(input.amount);
            }
            if found_info.is_none() {
                found_info = container.transaction_information(&record.hash);
            }
        }

        let Some(container_tx) = found_info else {
            return false;
        };
        if outputs_sum != inputs_sum
            || outputs_sum != container_tx.outputs_amount
            || inputs_sum != container_tx.inputs_amount
        {
            return false;
        }

        // Size 0: the wallet cannot reconstruct the exact serialized size.
        let height = self.inner.node.last_known_block_height();
        self.inner
            .currency
            .is_fusion_transaction(&input_amounts, &output_amounts, 0, height)
    }

    // --- synchronizer dispatch ---------------------------------------------

    /// Apply one queued synchronizer notification. Normally driven by the
    /// wallet's worker task; exposed for hosts dispatching on their own.
    pub async fn apply_sync_notification(&self, notification: SyncNotification) {
        let mut state = self.inner.state.lock().await;
        if state.status != WalletStatus::Initialized {
            return;
        }

        match notification {
            SyncNotification::BlocksAdded(hashes) => {
                state.chain.extend(hashes);
            }
            SyncNotification::ChainDetached { height } => {
                state.chain.detach(height);
            }
            SyncNotification::ProgressUpdated { processed, total } => {
                self.inner
                    .events
                    .push(WalletEvent::SyncProgressUpdated { processed, total });
                self.unlock_through(&mut state, processed.saturating_sub(1));
            }
            SyncNotification::Completed => {
                self.inner.events.push(WalletEvent::SyncCompleted);
            }
            SyncNotification::TransactionUpdated { info, amounts } => {
                self.on_transaction_updated(&mut state, info, amounts);
            }
            SyncNotification::TransactionDeleted { container, hash } => {
                self.on_transaction_deleted(&mut state, container, hash);
            }
        }
    }

    fn on_transaction_updated(
        &self,
        state: &mut WalletState,
        info: TransactionInfo,
        amounts: Vec<ContainerAmounts>,
    ) {
        let total_amount: i64 = amounts
            .iter()
            .map(|container| container.input + container.output)
            .sum();

        let (index, is_new, mut updated) = match state.journal.index_of(&info.hash) {
            Some(index) => (
                index,
                false,
                state.journal.replace_meta(index, &info, total_amount),
            ),
            None => (
                state.journal.insert_confirmed(&info, total_amount),
                true,
                false,
            ),
        };

        if info.block_height != UNCONFIRMED_HEIGHT {
            // A transaction can land in a block without a commit having run.
            state.pending.remove(&index);
        }

        for container_amounts in &amounts {
            self.refresh_balance(state, container_amounts.container);
            if info.block_height != UNCONFIRMED_HEIGHT {
                let height = unlock_height(info.block_height, state.soft_lock, info.unlock_time);
                state
                    .unlock
                    .insert(height, container_amounts.container, info.hash);
            }
        }

        let container_totals: Vec<(String, TransferTotals)> = {
            let state_ref: &WalletState = &*state;
            amounts
                .iter()
                .filter_map(|container_amounts| {
                    state_ref
                        .keystore
                        .by_container(container_amounts.container)
                        .map(|record| {
                            (
                                self.record_address(state_ref, record),
                                TransferTotals {
                                    input: container_amounts.input,
                                    output: container_amounts.output,
                                },
                            )
                        })
                })
                .collect()
        };

        updated |= state.journal.update_transaction_transfers(
            index,
            &container_totals,
            -(info.total_amount_in as i64),
            info.total_amount_out as i64,
        );

        if is_new {
            self.inner
                .events
                .push(WalletEvent::TransactionCreated { index });
        } else if updated {
            self.inner
                .events
                .push(WalletEvent::TransactionUpdated { index });
        }
    }

    fn on_transaction_deleted(&self, state: &mut WalletState, container: ContainerId, hash: Hash) {
        let Some(index) = state.journal.index_of(&hash) else {
            return;
        };

        self.refresh_balance(state, container);
        state.unlock.remove_transaction(&hash);

        if state.journal.mark_cancelled(index) {
            self.inner
                .events
                .push(WalletEvent::TransactionUpdated { index });
        }
    }

    fn unlock_through(&self, state: &mut WalletState, height: u32) {
        let drained = state.unlock.drain_through(height);
        if drained.is_empty() {
            return;
        }
        for job in &drained {
            self.refresh_balance(state, job.container);
        }
        self.inner.events.push(WalletEvent::BalanceUnlocked);
    }

    fn refresh_balance(&self, state: &mut WalletState, container_id: ContainerId) {
        let Some(container) = self.inner.synchronizer.container(container_id) else {
            return;
        };
        let WalletState {
            keystore, balances, ..
        } = state;
        if let Some(record) = keystore.by_container_mut(container_id) {
            balances.refresh_record(record, container.as_ref());
        }
    }

    fn start_sync(&self, state: &mut WalletState) {
        if !state.keystore.is_empty() && !state.sync_started {
            self.inner.synchronizer.start();
            state.sync_started = true;
        }
    }

    fn stop_sync(&self, state: &mut WalletState) {
        if state.sync_started {
            self.inner.synchronizer.stop();
            state.sync_started = false;
        }
    }

    // --- persistence -------------------------------------------------------

    /// Seal a consistent snapshot into `destination`. The synchronizer is
    /// stopped for the duration and restarted afterwards on every exit path.
    pub async fn save(
        &self,
        destination: &mut dyn Write,
        include_details: bool,
        include_cache: bool,
    ) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        Self::ensure_initialized(&state)?;
        self.ensure_not_stopped()?;

        self.stop_sync(&mut state);
        let result = self
            .build_snapshot(&state, include_details, include_cache)
            .and_then(|snapshot| self.inner.codec.seal(&snapshot, &state.password))
            .and_then(|bytes| {
                destination
                    .write_all(&bytes)
                    .map_err(|e| WalletError::InternalWalletError(format!("write snapshot: {e}")))
            });
        self.start_sync(&mut state);
        result
    }

    pub async fn load(&self, source: &mut dyn Read, password: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.status != WalletStatus::NotInitialized {
            return Err(WalletError::WrongState);
        }
        self.ensure_not_stopped()?;

        let mut bytes = Vec::new();
        source
            .read_to_end(&mut bytes)
            .map_err(|e| WalletError::InternalWalletError(format!("read snapshot: {e}")))?;
        let snapshot = self.inner.codec.open(&bytes, password)?;

        self.restore_from_snapshot(&mut state, snapshot, password)?;
        self.start_sync(&mut state);
        info!("wallet loaded");
        Ok(())
    }

    fn build_snapshot(
        &self,
        state: &WalletState,
        include_details: bool,
        include_cache: bool,
    ) -> Result<WalletSnapshot> {
        let (transactions, transfers) = if include_details && !include_cache {
            state.journal.filter_for_snapshot(|record| {
                record.state == TxState::Created || record.state == TxState::Deleted
            })
        } else if include_details {
            state
                .journal
                .filter_for_snapshot(|record| record.state == TxState::Deleted)
        } else {
            (Vec::new(), Vec::new())
        };

        let records = state
            .keystore
            .iter()
            .map(|record| SpendRecordSnapshot {
                spend_public: record.spend_public,
                spend_secret: record.spend_secret.clone(),
                creation_timestamp: record.creation_timestamp,
                actual_balance: if include_cache { record.actual_balance } else { 0 },
                pending_balance: if include_cache { record.pending_balance } else { 0 },
            })
            .collect();

        let unlock_jobs = if include_cache {
            state
                .unlock
                .iter()
                .filter_map(|(height, job)| {
                    state
                        .keystore
                        .by_container(job.container)
                        .map(|record| UnlockJobSnapshot {
                            unlock_height: height,
                            spend_public: record.spend_public,
                            transaction_hash: job.transaction_hash,
                        })
                })
                .collect()
        } else {
            Vec::new()
        };

        let pending = if include_details && include_cache {
            state
                .pending
                .iter()
                .map(|(index, transaction)| (*index, transaction.clone()))
                .collect()
        } else {
            Vec::new()
        };

        let view = state.view.as_ref().ok_or(WalletError::NotInitialized)?;
        Ok(WalletSnapshot {
            view_public: view.public,
            view_secret: view.secret.clone(),
            soft_lock: state.soft_lock,
            records,
            transactions,
            transfers,
            unlock_jobs,
            pending,
            block_hashes: if include_cache {
                state.chain.snapshot()
            } else {
                Vec::new()
            },
            aggregate_actual: if include_cache { state.balances.actual } else { 0 },
            aggregate_pending: if include_cache { state.balances.pending } else { 0 },
        })
    }

    fn restore_from_snapshot(
        &self,
        state: &mut WalletState,
        snapshot: WalletSnapshot,
        password: &str,
    ) -> Result<()> {
        let view = ViewIdentity {
            public: snapshot.view_public,
            secret: snapshot.view_secret,
        };
        let accuracy = self.inner.currency.account_create_time_accuracy;

        state.password = password.to_string();
        state.soft_lock = snapshot.soft_lock;
        state.balances = BalanceTracker {
            actual: snapshot.aggregate_actual,
            pending: snapshot.aggregate_pending,
        };

        state.keystore.clear();
        for record in snapshot.records {
            let container = self.inner.synchronizer.add_subscription(AccountSubscription {
                keys: state.keystore.account_keys(
                    &SpendRecord {
                        spend_public: record.spend_public,
                        spend_secret: record.spend_secret.clone(),
                        container: ContainerId(0),
                        actual_balance: 0,
                        pending_balance: 0,
                        creation_timestamp: record.creation_timestamp,
                    },
                    &view,
                ),
                sync_start_height: 0,
                sync_start_timestamp: record.creation_timestamp.max(accuracy) - accuracy,
                transaction_spendable_age: state.soft_lock,
            });
            state.keystore.insert(SpendRecord {
                spend_public: record.spend_public,
                spend_secret: record.spend_secret,
                container,
                actual_balance: record.actual_balance,
                pending_balance: record.pending_balance,
                creation_timestamp: record.creation_timestamp,
            })?;
        }

        state.journal = TransferJournal::from_parts(snapshot.transactions, snapshot.transfers);

        state.unlock.clear();
        for job in snapshot.unlock_jobs {
            if let Ok(record) = state.keystore.by_spend_key(&job.spend_public) {
                state
                    .unlock
                    .insert(job.unlock_height, record.container, job.transaction_hash);
            }
        }

        state.pending = snapshot.pending.into_iter().collect();

        if !snapshot.block_hashes.is_empty() {
            state.chain.clear();
            state.chain.extend(snapshot.block_hashes);
        } else if !state.keystore.is_empty() {
            let known = self.inner.synchronizer.view_key_known_blocks(&view.public);
            if known.is_empty() {
                state
                    .chain
                    .reset_to(self.inner.currency.genesis_block_hash());
            } else {
                state.chain.clear();
                state.chain.extend(known);
            }
        } else {
            state
                .chain
                .reset_to(self.inner.currency.genesis_block_hash());
        }

        state.view = Some(view);
        state.status = WalletStatus::Initialized;
        Ok(())
    }

    /// The snapshot → shutdown → load cycle that rewinds synchronization
    /// after importing an old address.
    fn reload_in_place(&self, state: &mut WalletState, password: &str) -> Result<()> {
        let snapshot = self.build_snapshot(state, true, false)?;
        self.do_shutdown(state);
        self.restore_from_snapshot(state, snapshot, password)
    }
}

fn convert_orders_to_transfers(
    orders: &[crate::model::TransferOrder],
) -> Result<Vec<Transfer>> {
    let mut transfers = Vec::with_capacity(orders.len());
    for order in orders {
        if order.amount > i64::MAX as u64 {
            return Err(WalletError::WrongAmount(format!(
                "order amount must not exceed {}",
                i64::MAX
            )));
        }
        transfers.push(Transfer {
            kind: TransferKind::Usual,
            address: order.address.clone(),
            amount: order.amount as i64,
        });
    }
    Ok(transfers)
}

fn count_needed_money(destinations: &[Transfer], fee: u64) -> Result<u64> {
    let mut needed_money = 0u64;
    for destination in destinations {
        if destination.amount == 0 {
            return Err(WalletError::ZeroDestination);
        }
        if destination.amount < 0 {
            return Err(WalletError::WrongParameters(
                "destination amount must be positive".into(),
            ));
        }
        needed_money = needed_money
            .checked_add(destination.amount as u64)
            .ok_or(WalletError::SumOverflow)?;
    }
    needed_money.checked_add(fee).ok_or(WalletError::SumOverflow)
}

fn calculate_donation_amount(
    free_amount: u64,
    donation_threshold: u64,
    dust_threshold: u64,
    currency: &Currency,
) -> u64 {
    let mut decomposed = currency.decompose_amount(free_amount, dust_threshold);
    decomposed.sort_unstable_by(|a, b| b.cmp(a));

    let mut donation_amount = 0u64;
    for amount in decomposed {
        if amount <= donation_threshold - donation_amount {
            donation_amount += amount;
        }
    }
    donation_amount
}

fn push_donation_transfer_if_possible(
    donation: &DonationSettings,
    free_amount: u64,
    dust_threshold: u64,
    destinations: &mut Vec<Transfer>,
    currency: &Currency,
) -> Result<u64> {
    if donation.address.is_empty() || donation.threshold == 0 {
        return Ok(0);
    }
    if donation.threshold > i64::MAX as u64 {
        return Err(WalletError::WrongAmount(format!(
            "donation threshold must not exceed {}",
            i64::MAX
        )));
    }

    let donation_amount =
        calculate_donation_amount(free_amount, donation.threshold, dust_threshold, currency);
    if donation_amount != 0 {
        destinations.push(Transfer {
            kind: TransferKind::Donation,
            address: donation.address.clone(),
            amount: donation_amount as i64,
        });
    }
    Ok(donation_amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needed_money_checks_overflow_and_zero() {
        let usual = |amount: i64| Transfer {
            kind: TransferKind::Usual,
            address: "x".into(),
            amount,
        };

        assert_eq!(count_needed_money(&[usual(300), usual(700)], 100).unwrap(), 1_100);
        assert!(matches!(
            count_needed_money(&[usual(0)], 0),
            Err(WalletError::ZeroDestination)
        ));
        assert!(matches!(
            count_needed_money(&[usual(i64::MAX), usual(i64::MAX)], 0),
            Err(WalletError::SumOverflow)
        ));
        assert!(matches!(
            count_needed_money(&[usual(1)], u64::MAX),
            Err(WalletError::SumOverflow)
        ));
    }

    #[test]
    fn donation_accumulates_largest_denominations_under_threshold() {
        let currency = Currency::default();
        // free = 12_345, threshold 10_400: 10_000 fits, 2_000 does not
        // (10_000 + 2_000 > 10_400), 300 fits, 40 fits, 5 fits.
        let amount = calculate_donation_amount(12_345, 10_400, 0, &currency);
        assert_eq!(amount, 10_345);
    }

    #[test]
    fn donation_requires_both_settings() {
        let currency = Currency::default();
        let mut destinations = Vec::new();
        let none = DonationSettings::default();
        assert_eq!(
            push_donation_transfer_if_possible(&none, 1_000, 0, &mut destinations, &currency)
                .unwrap(),
            0
        );
        assert!(destinations.is_empty());
    }
}
