// SPDX-License-Identifier: Apache-2.0
//! End-to-end wallet scenarios against the in-process node and synchronizer
//! doubles.

mod common;

use std::io::Cursor;
use std::sync::atomic::Ordering;

use common::{harness, harness_with_currency, Harness};
use tx_builder::{AccountAddress, DalekCrypto, Hash, RingCrypto};
use wallet_core::container::ContainerTransaction;
use wallet_core::model::TransactionInfo;
use wallet_core::{
    Currency, SpendableOutput, TransferKind, TransferOrder, TransferParameters, TxState,
    WalletError, WalletEvent,
};

fn params(to: &str, amount: u64, fee: u64) -> TransferParameters {
    TransferParameters {
        destinations: vec![TransferOrder {
            address: to.to_string(),
            amount,
        }],
        fee,
        ..Default::default()
    }
}

fn external_address(currency: &Currency) -> String {
    let crypto = DalekCrypto;
    let spend = crypto.generate_keys();
    let view = crypto.generate_keys();
    currency.account_address_as_string(&AccountAddress {
        spend_public: spend.public,
        view_public: view.public,
    })
}

async fn expect_event(harness: &Harness, expected: WalletEvent) {
    let event = harness.wallet.next_event().await.expect("event");
    assert_eq!(event, expected);
}

/// Two funded spending addresses, 500 apiece, confirmed and unlocked.
async fn two_funded_addresses(harness: &Harness) -> (String, String) {
    harness.wallet.initialize("pw").await.unwrap();
    let a = harness.wallet.create_address().await.unwrap();
    let b = harness.wallet.create_address().await.unwrap();

    for (index, address) in [&a, &b].into_iter().enumerate() {
        let (id, container) = harness.container_for(address);
        container.set_height(100);
        let hash = harness.credit_coinbase(address, 500, 90, 100, index as u32 + 1);
        harness.adapter.transaction_updated(&hash, &[id]);
        expect_event(harness, WalletEvent::TransactionCreated { index }).await;
    }

    assert_eq!(harness.wallet.actual_balance().await.unwrap(), 1_000);
    (a, b)
}

#[tokio::test]
async fn coinbase_output_unlocks_after_soft_lock() {
    let h = harness(10).await;
    h.wallet.initialize("pw").await.unwrap();
    let address = h.wallet.create_address().await.unwrap();

    let (id, container) = h.container_for(&address);
    container.set_height(100);
    let hash = h.credit_coinbase(&address, 1_000_000, 100, 110, 1);
    h.adapter.transaction_updated(&hash, &[id]);
    expect_event(&h, WalletEvent::TransactionCreated { index: 0 }).await;

    assert_eq!(h.wallet.actual_balance().await.unwrap(), 0);
    assert_eq!(h.wallet.pending_balance().await.unwrap(), 1_000_000);

    // Ten blocks later the soft lock expires.
    container.set_height(110);
    h.adapter.synchronization_progress_updated(111, 200);
    expect_event(
        &h,
        WalletEvent::SyncProgressUpdated {
            processed: 111,
            total: 200,
        },
    )
    .await;
    expect_event(&h, WalletEvent::BalanceUnlocked).await;

    assert_eq!(h.wallet.actual_balance().await.unwrap(), 1_000_000);
    assert_eq!(h.wallet.pending_balance().await.unwrap(), 0);
    assert_eq!(
        h.wallet.actual_balance_of(&address).await.unwrap(),
        1_000_000
    );
}

#[tokio::test]
async fn multi_address_spend_requires_change_destination() {
    let h = harness(10).await;
    let _ = two_funded_addresses(&h).await;

    let destination = external_address(&h.currency);
    let err = h.wallet.transfer(params(&destination, 800, 100)).await;
    assert!(matches!(err, Err(WalletError::ChangeAddressRequired)));
    assert_eq!(h.wallet.actual_balance().await.unwrap(), 1_000);
    assert_eq!(h.wallet.transaction_count().await.unwrap(), 0);
}

#[tokio::test]
async fn transfer_with_change_runs_created_to_succeeded() {
    let h = harness(10).await;
    let (a, b) = two_funded_addresses(&h).await;

    let destination = external_address(&h.currency);
    let mut parameters = params(&destination, 800, 100);
    parameters.change_destination = a.clone();

    let index = h.wallet.transfer(parameters).await.unwrap();
    assert_eq!(index, 2);
    assert_eq!(h.wallet.transaction_count().await.unwrap(), 3);
    expect_event(&h, WalletEvent::TransactionCreated { index }).await;
    expect_event(&h, WalletEvent::TransactionUpdated { index }).await;

    let record = h.wallet.transaction(index).await.unwrap();
    assert_eq!(record.state, TxState::Succeeded);
    assert_eq!(record.fee, 100);

    let transfers = h.wallet.transaction_transfers(index).await.unwrap();
    assert_eq!(transfers.len(), 2);
    assert_eq!(transfers[0].kind, TransferKind::Usual);
    assert_eq!(transfers[0].address, destination);
    assert_eq!(transfers[0].amount, 800);
    assert_eq!(transfers[1].kind, TransferKind::Change);
    assert_eq!(transfers[1].address, a);
    assert_eq!(transfers[1].amount, 100);

    // The synchronizer later observes the spend: both 500s consumed, 100
    // change back to A, still locked.
    let spend_hash = record.hash;
    let (id_a, container_a) = h.container_for(&a);
    let (id_b, container_b) = h.container_for(&b);
    container_a.mark_spent(1, spend_hash);
    container_b.mark_spent(2, spend_hash);
    container_a.credit(
        SpendableOutput {
            amount: 100,
            global_index: 40,
            index_in_tx: 0,
            tx_public_key: tx_builder::PublicKey([9u8; 32]),
            output_key: tx_builder::PublicKey([8u8; 32]),
            tx_hash: spend_hash,
        },
        200,
    );
    let spend_info = TransactionInfo {
        hash: spend_hash,
        block_height: 105,
        timestamp: 1_700_000_100,
        unlock_time: 0,
        total_amount_in: 1_000,
        total_amount_out: 900,
        extra: Vec::new(),
    };
    container_a.put_transaction(ContainerTransaction {
        info: spend_info.clone(),
        inputs_amount: 500,
        outputs_amount: 100,
    });
    container_b.put_transaction(ContainerTransaction {
        info: spend_info,
        inputs_amount: 500,
        outputs_amount: 0,
    });
    h.adapter.transaction_updated(&spend_hash, &[id_a, id_b]);
    expect_event(&h, WalletEvent::TransactionUpdated { index }).await;

    assert_eq!(h.wallet.actual_balance().await.unwrap(), 0);
    assert_eq!(h.wallet.pending_balance().await.unwrap(), 100);
    assert_eq!(h.wallet.pending_balance_of(&a).await.unwrap(), 100);

    // The outgoing payment row survives the rewrite.
    let transfers = h.wallet.transaction_transfers(index).await.unwrap();
    assert!(transfers
        .iter()
        .any(|t| t.address == destination && t.amount == 800));
    assert!(transfers.iter().any(|t| t.address == a && t.amount == -500));
    assert!(transfers.iter().any(|t| t.address == b && t.amount == -500));
}

#[tokio::test]
async fn too_small_fee_fails_before_any_state_change() {
    let h = harness(10).await;
    let (a, _) = two_funded_addresses(&h).await;

    let destination = external_address(&h.currency);
    let mut parameters = params(&destination, 800, 5);
    parameters.change_destination = a;

    let err = h.wallet.transfer(parameters).await;
    assert!(matches!(err, Err(WalletError::FeeTooSmall { minimum: 10, .. })));

    assert_eq!(h.wallet.actual_balance().await.unwrap(), 1_000);
    assert_eq!(h.wallet.transaction_count().await.unwrap(), 0);

    // Nothing was queued before this marker event.
    h.adapter.synchronization_completed();
    expect_event(&h, WalletEvent::SyncCompleted).await;
}

#[tokio::test]
async fn short_mixin_sampling_aborts_the_transfer() {
    let h = harness(10).await;
    let (a, _) = two_funded_addresses(&h).await;
    h.node.mixin_supply.store(4, Ordering::Relaxed);

    let destination = external_address(&h.currency);
    let mut parameters = params(&destination, 800, 100);
    parameters.change_destination = a;
    parameters.mixin = 5;

    let err = h.wallet.transfer(parameters).await;
    assert!(matches!(err, Err(WalletError::MixinCountTooBig)));

    assert_eq!(h.wallet.transaction_count().await.unwrap(), 0);
    assert!(h
        .wallet
        .delayed_transaction_indexes()
        .await
        .unwrap()
        .is_empty());
    assert_eq!(h.sync.unconfirmed_count(), 0);
}

#[tokio::test]
async fn removing_an_address_keeps_shared_transactions() {
    let h = harness(10).await;
    h.wallet.initialize("pw").await.unwrap();
    let a = h.wallet.create_address().await.unwrap();
    let b = h.wallet.create_address().await.unwrap();

    // One transaction paying 500 to each address.
    let crypto = DalekCrypto;
    let tx_keys = crypto.generate_keys();
    let tx_hash = Hash(tx_keys.public.0);
    let mut container_ids = Vec::new();
    for (slot, address) in [&a, &b].into_iter().enumerate() {
        let receiver = h.currency.parse_account_address(address).unwrap();
        let output_key = crypto
            .derive_output_key(&tx_keys.secret, &receiver, slot)
            .unwrap();
        let (id, container) = h.container_for(address);
        container.set_height(100);
        container.credit(
            SpendableOutput {
                amount: 500,
                global_index: slot as u32 + 10,
                index_in_tx: slot as u32,
                tx_public_key: tx_keys.public,
                output_key,
                tx_hash,
            },
            100,
        );
        container.put_transaction(ContainerTransaction {
            info: TransactionInfo {
                hash: tx_hash,
                block_height: 95,
                timestamp: 1_700_000_000,
                unlock_time: 0,
                total_amount_in: 0,
                total_amount_out: 1_000,
                extra: Vec::new(),
            },
            inputs_amount: 0,
            outputs_amount: 500,
        });
        container_ids.push(id);
    }

    h.adapter.transaction_updated(&tx_hash, &container_ids);
    expect_event(&h, WalletEvent::TransactionCreated { index: 0 }).await;
    assert_eq!(h.wallet.actual_balance().await.unwrap(), 1_000);

    h.wallet.delete_address(&a).await.unwrap();
    expect_event(&h, WalletEvent::TransactionUpdated { index: 0 }).await;

    assert_eq!(h.wallet.actual_balance().await.unwrap(), 500);
    assert_eq!(h.wallet.address_count().await.unwrap(), 1);
    let record = h.wallet.transaction(0).await.unwrap();
    assert_eq!(record.state, TxState::Succeeded);
    assert_eq!(record.total_amount, 500);
}

#[tokio::test]
async fn commit_and_rollback_are_single_shot() {
    let h = harness(10).await;
    h.wallet.initialize("pw").await.unwrap();
    let address = h.wallet.create_address().await.unwrap();
    let (id, container) = h.container_for(&address);
    container.set_height(100);
    let hash = h.credit_coinbase(&address, 1_000, 90, 100, 1);
    h.adapter.transaction_updated(&hash, &[id]);
    expect_event(&h, WalletEvent::TransactionCreated { index: 0 }).await;

    let destination = external_address(&h.currency);
    let index = h
        .wallet
        .make_transaction(params(&destination, 500, 100))
        .await
        .unwrap();
    expect_event(&h, WalletEvent::TransactionCreated { index }).await;

    assert_eq!(
        h.wallet.transaction(index).await.unwrap().state,
        TxState::Created
    );
    assert_eq!(h.wallet.delayed_transaction_indexes().await.unwrap(), vec![index]);
    assert_eq!(h.sync.unconfirmed_count(), 1);
    assert_eq!(h.node.relayed_count(), 0);

    h.wallet.commit_transaction(index).await.unwrap();
    expect_event(&h, WalletEvent::TransactionUpdated { index }).await;
    assert_eq!(h.node.relayed_count(), 1);
    assert_eq!(
        h.wallet.transaction(index).await.unwrap().state,
        TxState::Succeeded
    );

    assert!(matches!(
        h.wallet.commit_transaction(index).await,
        Err(WalletError::TransferImpossible)
    ));
    assert!(matches!(
        h.wallet.rollback_uncommitted_transaction(index).await,
        Err(WalletError::CancelImpossible)
    ));
}

#[tokio::test]
async fn rollback_forgets_the_unconfirmed_transaction() {
    let h = harness(10).await;
    h.wallet.initialize("pw").await.unwrap();
    let address = h.wallet.create_address().await.unwrap();
    let (id, container) = h.container_for(&address);
    container.set_height(100);
    let hash = h.credit_coinbase(&address, 1_000, 90, 100, 1);
    h.adapter.transaction_updated(&hash, &[id]);
    expect_event(&h, WalletEvent::TransactionCreated { index: 0 }).await;

    let destination = external_address(&h.currency);
    let index = h
        .wallet
        .make_transaction(params(&destination, 500, 100))
        .await
        .unwrap();
    expect_event(&h, WalletEvent::TransactionCreated { index }).await;
    assert_eq!(h.sync.unconfirmed_count(), 1);

    h.wallet
        .rollback_uncommitted_transaction(index)
        .await
        .unwrap();
    assert_eq!(h.sync.unconfirmed_count(), 0);
    assert!(h
        .wallet
        .delayed_transaction_indexes()
        .await
        .unwrap()
        .is_empty());
    // The journal entry survives; only the pending blob is gone.
    assert_eq!(
        h.wallet.transaction(index).await.unwrap().state,
        TxState::Created
    );
    assert_eq!(h.node.relayed_count(), 0);
}

#[tokio::test]
async fn callback_order_is_event_order() {
    let h = harness(10).await;
    h.wallet.initialize("pw").await.unwrap();
    let _ = h.wallet.create_address().await.unwrap();

    h.adapter.synchronization_progress_updated(5, 10);
    h.adapter.synchronization_completed();

    expect_event(
        &h,
        WalletEvent::SyncProgressUpdated {
            processed: 5,
            total: 10,
        },
    )
    .await;
    expect_event(&h, WalletEvent::SyncCompleted).await;
}

#[tokio::test]
async fn ring_members_are_sorted_around_the_real_input() {
    let h = harness(10).await;
    h.wallet.initialize("pw").await.unwrap();
    let address = h.wallet.create_address().await.unwrap();
    let (id, container) = h.container_for(&address);
    container.set_height(100);
    for (i, amount) in [400u64, 400, 400].into_iter().enumerate() {
        let hash = h.credit_coinbase(&address, amount, 90, 100, i as u32 + 1);
        h.adapter.transaction_updated(&hash, &[id]);
        expect_event(&h, WalletEvent::TransactionCreated { index: i }).await;
    }

    let destination = external_address(&h.currency);
    let mut parameters = params(&destination, 1_000, 10);
    parameters.mixin = 3;
    let index = h.wallet.transfer(parameters).await.unwrap();
    expect_event(&h, WalletEvent::TransactionCreated { index }).await;
    expect_event(&h, WalletEvent::TransactionUpdated { index }).await;

    let relayed = h.node.relayed.lock();
    let transaction = relayed.last().unwrap();
    assert_eq!(transaction.prefix.inputs.len(), 3);
    for input in &transaction.prefix.inputs {
        // Three fakes plus the real member, sorted by global index.
        assert_eq!(input.key_offsets.len(), 4);
        let mut sorted = input.key_offsets.clone();
        sorted.sort_unstable();
        assert_eq!(input.key_offsets, sorted);
        assert!(input
            .key_offsets
            .iter()
            .any(|offset| *offset < 50_000), "real member missing from ring");
    }
}

#[tokio::test]
async fn snapshot_roundtrip_restores_the_wallet() {
    let h = harness(10).await;
    h.wallet.initialize("pw").await.unwrap();
    let address = h.wallet.create_address().await.unwrap();
    let (id, container) = h.container_for(&address);
    container.set_height(100);
    let hash = h.credit_coinbase(&address, 700, 90, 100, 1);
    h.adapter.transaction_updated(&hash, &[id]);
    expect_event(&h, WalletEvent::TransactionCreated { index: 0 }).await;

    let mut buffer = Vec::new();
    h.wallet.save(&mut buffer, true, true).await.unwrap();
    assert!(h.sync.is_started(), "synchronizer restarted after save");

    let h2 = harness(10).await;
    let mut cursor = Cursor::new(buffer.clone());
    h2.wallet.load(&mut cursor, "pw").await.unwrap();

    assert_eq!(h2.wallet.address_count().await.unwrap(), 1);
    assert_eq!(h2.wallet.address(0).await.unwrap(), address);
    assert_eq!(h2.wallet.actual_balance().await.unwrap(), 700);
    assert_eq!(h2.wallet.transaction_count().await.unwrap(), 1);
    let restored = h2.wallet.transaction_by_hash(&hash).await.unwrap();
    assert_eq!(restored.transaction.state, TxState::Succeeded);
    assert!(restored
        .transfers
        .iter()
        .any(|t| t.address == address && t.amount == 700));

    // Loading into an initialized wallet is a state error.
    let mut cursor = Cursor::new(buffer.clone());
    assert!(matches!(
        h.wallet.load(&mut cursor, "pw").await,
        Err(WalletError::WrongState)
    ));

    let h3 = harness(10).await;
    let mut cursor = Cursor::new(buffer);
    assert!(matches!(
        h3.wallet.load(&mut cursor, "nope").await,
        Err(WalletError::WrongPassword)
    ));
}

#[tokio::test]
async fn snapshot_without_cache_drops_created_transactions() {
    let h = harness(10).await;
    h.wallet.initialize("pw").await.unwrap();
    let address = h.wallet.create_address().await.unwrap();
    let (id, container) = h.container_for(&address);
    container.set_height(100);
    let hash = h.credit_coinbase(&address, 1_000, 90, 100, 1);
    h.adapter.transaction_updated(&hash, &[id]);
    expect_event(&h, WalletEvent::TransactionCreated { index: 0 }).await;

    let destination = external_address(&h.currency);
    let index = h
        .wallet
        .make_transaction(params(&destination, 500, 100))
        .await
        .unwrap();
    expect_event(&h, WalletEvent::TransactionCreated { index }).await;

    let mut buffer = Vec::new();
    h.wallet.save(&mut buffer, true, false).await.unwrap();

    let h2 = harness(10).await;
    let mut cursor = Cursor::new(buffer);
    h2.wallet.load(&mut cursor, "pw").await.unwrap();

    // Only the confirmed credit survives; the CREATED one was filtered.
    assert_eq!(h2.wallet.transaction_count().await.unwrap(), 1);
    assert!(h2
        .wallet
        .delayed_transaction_indexes()
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn fusion_consolidates_one_decade_of_small_outputs() {
    let currency = Currency {
        dust_threshold: 10,
        fusion_tx_min_input_count: 3,
        ..Currency::default()
    };
    let h = harness_with_currency(currency, 10).await;
    h.wallet.initialize("pw").await.unwrap();
    let address = h.wallet.create_address().await.unwrap();
    let (id, container) = h.container_for(&address);
    container.set_height(100);

    for i in 0..5u32 {
        let hash = h.credit_coinbase(&address, 200, 90, 100, i + 1);
        h.adapter.transaction_updated(&hash, &[id]);
        expect_event(&h, WalletEvent::TransactionCreated { index: i as usize }).await;
    }

    let estimate = h.wallet.estimate_fusion(1_000_000).await.unwrap();
    assert_eq!(estimate.fusion_ready_count, 5);
    assert_eq!(estimate.total_output_count, 5);

    let index = h
        .wallet
        .create_fusion_transaction(1_000_000, 0)
        .await
        .unwrap()
        .expect("fusion created");
    expect_event(&h, WalletEvent::TransactionCreated { index }).await;
    expect_event(&h, WalletEvent::TransactionUpdated { index }).await;

    let record = h.wallet.transaction(index).await.unwrap();
    assert_eq!(record.state, TxState::Succeeded);
    assert_eq!(record.fee, 0);

    let relayed = h.node.relayed.lock();
    let transaction = relayed.last().unwrap().clone();
    drop(relayed);
    assert_eq!(transaction.input_total(), 1_000);
    assert_eq!(transaction.output_total(), 1_000);
    let amounts: Vec<u64> = transaction.prefix.outputs.iter().map(|o| o.amount).collect();
    let mut sorted = amounts.clone();
    sorted.sort_unstable();
    assert_eq!(amounts, sorted);

    // Once the chain confirms it, the classifier recognizes the fusion.
    let fusion_hash = record.hash;
    for i in 0..5u32 {
        container.mark_spent(i + 1, fusion_hash);
    }
    container.credit(
        SpendableOutput {
            amount: 1_000,
            global_index: 77,
            index_in_tx: 0,
            tx_public_key: tx_builder::PublicKey([7u8; 32]),
            output_key: tx_builder::PublicKey([6u8; 32]),
            tx_hash: fusion_hash,
        },
        130,
    );
    container.put_transaction(ContainerTransaction {
        info: TransactionInfo {
            hash: fusion_hash,
            block_height: 105,
            timestamp: 1_700_000_200,
            unlock_time: 0,
            total_amount_in: 1_000,
            total_amount_out: 1_000,
            extra: Vec::new(),
        },
        inputs_amount: 1_000,
        outputs_amount: 1_000,
    });
    h.adapter.transaction_updated(&fusion_hash, &[id]);
    expect_event(&h, WalletEvent::TransactionUpdated { index }).await;

    assert!(h.wallet.is_fusion_transaction(index).await.unwrap());
}

#[tokio::test]
async fn nothing_to_optimize_returns_none() {
    let currency = Currency {
        dust_threshold: 10,
        fusion_tx_min_input_count: 3,
        ..Currency::default()
    };
    let h = harness_with_currency(currency, 10).await;
    h.wallet.initialize("pw").await.unwrap();
    let address = h.wallet.create_address().await.unwrap();
    let (id, container) = h.container_for(&address);
    container.set_height(100);
    let hash = h.credit_coinbase(&address, 200, 90, 100, 1);
    h.adapter.transaction_updated(&hash, &[id]);
    expect_event(&h, WalletEvent::TransactionCreated { index: 0 }).await;

    let result = h.wallet.create_fusion_transaction(1_000_000, 0).await.unwrap();
    assert!(result.is_none());
    assert_eq!(h.wallet.transaction_count().await.unwrap(), 1);
}

#[tokio::test]
async fn reorged_transaction_is_cancelled_and_detached() {
    let h = harness(10).await;
    h.wallet.initialize("pw").await.unwrap();
    let address = h.wallet.create_address().await.unwrap();
    let (id, container) = h.container_for(&address);
    container.set_height(100);
    let hash = h.credit_coinbase(&address, 900, 90, 100, 1);
    h.adapter.transaction_updated(&hash, &[id]);
    expect_event(&h, WalletEvent::TransactionCreated { index: 0 }).await;
    assert_eq!(h.wallet.actual_balance().await.unwrap(), 900);

    container.forget_transaction(&hash);
    h.adapter.transaction_deleted(id, &hash);
    expect_event(&h, WalletEvent::TransactionUpdated { index: 0 }).await;

    let record = h.wallet.transaction(0).await.unwrap();
    assert_eq!(record.state, TxState::Cancelled);
    assert_eq!(record.block_height, wallet_core::UNCONFIRMED_HEIGHT);
    assert_eq!(h.wallet.actual_balance().await.unwrap(), 0);
}

#[tokio::test]
async fn stopped_wallet_cancels_everything_until_restarted() {
    let h = harness(10).await;
    h.wallet.initialize("pw").await.unwrap();
    let _ = h.wallet.create_address().await.unwrap();

    h.wallet.stop();
    assert!(matches!(
        h.wallet.actual_balance().await,
        Err(WalletError::OperationCancelled)
    ));
    assert!(matches!(
        h.wallet.next_event().await,
        Err(WalletError::OperationCancelled)
    ));

    h.wallet.start();
    assert_eq!(h.wallet.actual_balance().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_unconfirmed_registration_unwinds_to_failed() {
    let h = harness(10).await;
    h.wallet.initialize("pw").await.unwrap();
    let address = h.wallet.create_address().await.unwrap();
    let (id, container) = h.container_for(&address);
    container.set_height(100);
    let hash = h.credit_coinbase(&address, 1_000, 90, 100, 1);
    h.adapter.transaction_updated(&hash, &[id]);
    expect_event(&h, WalletEvent::TransactionCreated { index: 0 }).await;

    h.sync.set_fail_add_unconfirmed(true);
    let destination = external_address(&h.currency);
    let err = h
        .wallet
        .make_transaction(params(&destination, 500, 100))
        .await;
    assert!(matches!(err, Err(WalletError::Node(_))));

    expect_event(&h, WalletEvent::TransactionCreated { index: 1 }).await;
    expect_event(&h, WalletEvent::TransactionUpdated { index: 1 }).await;
    assert_eq!(h.wallet.transaction(1).await.unwrap().state, TxState::Failed);
    assert!(h
        .wallet
        .delayed_transaction_indexes()
        .await
        .unwrap()
        .is_empty());
    assert_eq!(h.node.relayed_count(), 0);
}

#[tokio::test]
async fn failed_relay_leaves_a_failed_record_and_no_pending_entry() {
    let h = harness(10).await;
    h.wallet.initialize("pw").await.unwrap();
    let address = h.wallet.create_address().await.unwrap();
    let (id, container) = h.container_for(&address);
    container.set_height(100);
    let hash = h.credit_coinbase(&address, 1_000, 90, 100, 1);
    h.adapter.transaction_updated(&hash, &[id]);
    expect_event(&h, WalletEvent::TransactionCreated { index: 0 }).await;

    h.node.fail_relay.store(true, Ordering::Relaxed);
    let destination = external_address(&h.currency);
    let err = h.wallet.transfer(params(&destination, 500, 100)).await;
    assert!(matches!(err, Err(WalletError::Node(_))));

    // The record was inserted, then marked FAILED by the unwind.
    let index = 1;
    expect_event(&h, WalletEvent::TransactionCreated { index }).await;
    expect_event(&h, WalletEvent::TransactionUpdated { index }).await;
    assert_eq!(
        h.wallet.transaction(index).await.unwrap().state,
        TxState::Failed
    );
    assert!(h
        .wallet
        .delayed_transaction_indexes()
        .await
        .unwrap()
        .is_empty());
    assert_eq!(h.sync.unconfirmed_count(), 0);
}
