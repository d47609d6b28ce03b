//! Pull path over HTTP: payment creation, manual sync, account fallback.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::client_id;
use super::TestHarness;
use pix_reconcile::payment::PaymentStore;
use pix_reconcile::{AccountIndex, CanonicalStatus};
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test]
async fn test_fallback_moves_affinity_to_answering_account() {
    let harness = TestHarness::setup(2).await.expect("setup");
    let owner = harness.new_owner(Decimal::ZERO);
    let record = harness
        .insert_payment(owner, Decimal::new(10_000, 2), "R-FB")
        .await
        .unwrap();
    harness.gateway.set_down(&client_id(1), true);
    harness.gateway.put_payment(&client_id(2), "R-FB", "completed");

    let (status, report) = harness.sync_owner(owner).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(report["updated"], 1);
    assert_eq!(report["outcomes"][0]["result"], "updated");
    assert_eq!(report["outcomes"][0]["to"], "paid");
    assert_eq!(report["outcomes"][0]["credited"], true);

    let stored = harness.store.get(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, CanonicalStatus::Paid);
    assert_eq!(stored.account_affinity, Some(AccountIndex(2)));
    assert_eq!(
        harness.gateway.status_callers(),
        vec![client_id(1), client_id(2)]
    );

    // a manual re-check goes straight to the affinity account
    harness.gateway.clear_calls();
    let response = reqwest::Client::new()
        .post(harness.url(&format!("/payments/{}/sync", record.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(harness.gateway.status_callers(), vec![client_id(2)]);
    assert_eq!(harness.store.ledger_entries(owner).await.unwrap().len(), 1);

    harness.teardown().await.unwrap();
}

/// A 404 on account 1 is not proof of absence while account 2 remains.
#[tokio::test]
async fn test_not_found_on_first_account_is_not_expiry() {
    let harness = TestHarness::setup(2).await.expect("setup");
    let owner = harness.new_owner(Decimal::ZERO);
    let record = harness
        .insert_payment(owner, Decimal::new(10_000, 2), "ONLY-ON-2")
        .await
        .unwrap();
    harness
        .gateway
        .put_payment(&client_id(2), "ONLY-ON-2", "awaiting_payment");

    let (_, report) = harness.sync_owner(owner).await.unwrap();
    assert_eq!(report["outcomes"][0]["to"], "awaiting_payment");

    let stored = harness.store.get(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, CanonicalStatus::AwaitingPayment);
    assert_eq!(stored.account_affinity, Some(AccountIndex(2)));

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_sync_reports_each_payment() {
    let harness = TestHarness::setup(2).await.expect("setup");
    let owner = harness.new_owner(Decimal::ZERO);
    for reference in ["A", "B", "C"] {
        harness
            .insert_payment(owner, Decimal::new(10_000, 2), reference)
            .await
            .unwrap();
    }
    harness.gateway.put_payment(&client_id(1), "A", "paid");
    harness.gateway.put_payment(&client_id(1), "B", "pending");
    // "C" unknown everywhere: expired

    let (status, report) = harness.sync_owner(owner).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(report["updated"], 2);
    assert_eq!(report["unchanged"], 1);
    assert_eq!(report["errored"], 0);
    assert_eq!(report["outcomes"].as_array().unwrap().len(), 3);

    let c = harness.store.find_by_reference("C").await.unwrap().unwrap();
    assert_eq!(c.status, CanonicalStatus::Expired);

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_gateway_reports_errors() {
    let harness = TestHarness::setup(2).await.expect("setup");
    let owner = harness.new_owner(Decimal::ZERO);
    let record = harness
        .insert_payment(owner, Decimal::new(10_000, 2), "DOWN")
        .await
        .unwrap();
    harness.gateway.set_down(&client_id(1), true);
    harness.gateway.set_down(&client_id(2), true);

    let (status, report) = harness.sync_owner(owner).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(report["errored"], 1);
    let message = report["outcomes"][0]["message"].as_str().unwrap();
    assert!(message.contains("#1"), "first account's error surfaced: {message}");

    let stored = harness.store.get(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, CanonicalStatus::Pending);

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_create_payment_then_sync() {
    let harness = TestHarness::setup(2).await.expect("setup");
    let owner = harness.new_owner(Decimal::ZERO);
    harness.gateway.set_down(&client_id(1), true);

    let (status, created) = harness.create_payment(owner, "100.00").await.unwrap();
    assert_eq!(status, 201);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["account_affinity"], 2);
    let reference = created["reference_code"].as_str().unwrap().to_string();
    let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();

    let (status, fetched) = harness.get_payment(id).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(fetched["reference_code"], reference.as_str());

    harness.gateway.set_down(&client_id(1), false);
    harness.gateway.put_payment(&client_id(2), &reference, "completed");
    harness.gateway.clear_calls();

    let (_, report) = harness.sync_owner(owner).await.unwrap();
    assert_eq!(report["outcomes"][0]["credited"], true);
    // affinity from issuance: account 1 was never asked
    assert_eq!(harness.gateway.status_callers(), vec![client_id(2)]);
    assert_eq!(
        harness.store.wallet_balance(owner).await.unwrap(),
        Some(Decimal::new(8_000, 2))
    );

    let (status, _) = harness.create_payment(owner, "-1").await.unwrap();
    assert_eq!(status, 400);
    let (status, _) = harness.get_payment(Uuid::new_v4()).await.unwrap();
    assert_eq!(status, 404);

    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn test_tokens_are_cached_per_account() {
    let harness = TestHarness::setup(1).await.expect("setup");
    let owner = harness.new_owner(Decimal::ZERO);
    for i in 0..5 {
        let reference = format!("T-{i}");
        harness
            .insert_payment(owner, Decimal::new(10_000, 2), &reference)
            .await
            .unwrap();
        harness.gateway.put_payment(&client_id(1), &reference, "pending");
    }
    harness
        .gateway
        .with_account(&client_id(1), |a| a.flat_shape = true);

    let (_, report) = harness.sync_owner(owner).await.unwrap();
    assert_eq!(report["unchanged"], 5);
    assert_eq!(harness.gateway.token_grants(&client_id(1)), 1);

    harness.teardown().await.unwrap();
}
