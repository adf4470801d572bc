mod common;

use common::{add_farmer, dec, fund, payout_callback, Harness};
use kilo_ledger::domain::{TransactionDetails, TransactionKind, TransactionStatus};
use kilo_ledger::gateway::{GatewayAck, GatewayError};
use kilo_ledger::services::{CallbackOutcome, SettlementError, SettlementRequest};
use serde_json::json;

fn loan(amount: &str) -> SettlementRequest {
    SettlementRequest {
        kind: TransactionKind::Loan,
        amount: dec(amount),
        recipient_phone: None,
    }
}

#[tokio::test]
async fn test_loan_end_to_end_with_replayed_callback() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-100");
    fund(&h.store, farmer.id, "500", "500");

    let receipt = h.settlement.request(farmer.id, loan("200")).await.unwrap();
    assert_eq!(receipt.charge, dec("20"));
    assert_eq!(receipt.total_amount, dec("220"));
    assert_eq!(receipt.status, TransactionStatus::Pending);
    assert_eq!(receipt.message, "Loan request successful!");

    let wallet = h.store.wallet(farmer.id).unwrap();
    assert_eq!(wallet.loan_limit, dec("280"));
    assert_eq!(wallet.payable_amount, dec("280"));
    assert_eq!(wallet.borrowed_amount, dec("200"));

    let transactions = h.store.transactions();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].kind, TransactionKind::Loan);
    assert_eq!(transactions[0].status, TransactionStatus::Pending);
    let entries = h.store.entries();
    assert_eq!(entries[0].status, TransactionStatus::Pending);
    assert_eq!(entries[0].reference.as_deref(), Some(receipt.reference.as_str()));

    let disbursed = h.gateway.disbursements.lock().unwrap().clone();
    assert_eq!(disbursed[0].phone, "254712345678");
    assert_eq!(disbursed[0].callback_url, "https://kilo.example/callbacks/b2c/loan");

    let payload = payout_callback(&receipt.reference, 0, "254712345678 - Farmer F-100");
    let first = h
        .settlement
        .handle_payout_callback(TransactionKind::Loan, &payload)
        .await
        .unwrap();
    assert_eq!(first, CallbackOutcome::Applied(TransactionStatus::Completed));

    let completed = h.store.transactions().remove(0);
    assert_eq!(completed.status, TransactionStatus::Completed);
    assert_eq!(completed.gateway_transaction_id.as_deref(), Some("NLJ41HAY6Q"));
    let entry = h.store.entries().remove(0);
    assert!(entry.is_complete);
    assert!(entry.is_notified);

    let replay = h
        .settlement
        .handle_payout_callback(TransactionKind::Loan, &payload)
        .await
        .unwrap();
    assert_eq!(replay, CallbackOutcome::Duplicate);
    assert_eq!(h.store.transactions().remove(0), completed);
    assert_eq!(h.store.wallet(farmer.id).unwrap(), wallet);
}

#[tokio::test]
async fn test_gateway_rejection_reverses_debit() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-101");
    fund(&h.store, farmer.id, "500", "500");
    let before = h.store.wallet(farmer.id).unwrap();
    h.gateway.push(Ok(GatewayAck::rejected("Bad Request - Invalid PartyB")));

    let err = h.settlement.request(farmer.id, loan("200")).await.unwrap_err();
    assert!(matches!(err, SettlementError::GatewayRejected(ref reason) if reason.contains("Invalid PartyB")));

    let after = h.store.wallet(farmer.id).unwrap();
    assert_eq!(after.loan_limit, before.loan_limit);
    assert_eq!(after.payable_amount, before.payable_amount);
    assert_eq!(after.borrowed_amount, before.borrowed_amount);

    assert_eq!(h.store.entries()[0].status, TransactionStatus::Failed);
    assert_eq!(h.store.transactions()[0].status, TransactionStatus::Failed);
}

#[tokio::test]
async fn test_gateway_error_reverses_debit_and_asks_to_retry() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-102");
    fund(&h.store, farmer.id, "500", "500");
    h.gateway
        .push(Err(GatewayError::CircuitBreakerOpen("too many failures".into())));

    let err = h.settlement.request(farmer.id, loan("100")).await.unwrap_err();
    assert_eq!(err.reason_code(), "try_later");
    assert_eq!(h.store.wallet(farmer.id).unwrap().loan_limit, dec("500"));
}

#[tokio::test]
async fn test_storage_failure_before_submission_reverses_debit() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-103");
    fund(&h.store, farmer.id, "500", "500");
    h.faults.fail_next_opens(1);

    let err = h.settlement.request(farmer.id, loan("100")).await.unwrap_err();
    assert_eq!(err.reason_code(), "try_later");
    assert_eq!(h.gateway.disbursement_count(), 0);
    assert_eq!(h.store.wallet(farmer.id).unwrap().payable_amount, dec("500"));
}

#[tokio::test]
async fn test_failed_callback_restores_wallet_with_the_terminal_write() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-110");
    fund(&h.store, farmer.id, "500", "500");
    let receipt = h.settlement.request(farmer.id, loan("200")).await.unwrap();
    let payload = payout_callback(&receipt.reference, 2001, "");

    let outcome = h
        .settlement
        .handle_payout_callback(TransactionKind::Loan, &payload)
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Applied(TransactionStatus::Failed));

    let restored = h.store.wallet(farmer.id).unwrap();
    assert_eq!(restored.loan_limit, dec("500"));
    assert_eq!(restored.payable_amount, dec("500"));
    assert_eq!(restored.borrowed_amount, dec("0"));
    assert_eq!(h.store.transactions()[0].status, TransactionStatus::Failed);

    let replay = h
        .settlement
        .handle_payout_callback(TransactionKind::Loan, &payload)
        .await
        .unwrap();
    assert_eq!(replay, CallbackOutcome::Duplicate);
    assert_eq!(h.store.wallet(farmer.id).unwrap(), restored);
}

#[tokio::test]
async fn test_aborted_failure_resolution_is_retried_by_redelivery() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-111");
    fund(&h.store, farmer.id, "500", "500");
    let receipt = h.settlement.request(farmer.id, loan("200")).await.unwrap();
    let payload = payout_callback(&receipt.reference, 2001, "");
    h.faults.fail_next_resolves(3);

    let err = h
        .settlement
        .handle_payout_callback(TransactionKind::Loan, &payload)
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), "try_later");

    // Nothing committed: still pending and still debited.
    assert!(!h.store.entries()[0].is_complete);
    assert_eq!(h.store.transactions()[0].status, TransactionStatus::Pending);
    assert_eq!(h.store.wallet(farmer.id).unwrap().borrowed_amount, dec("200"));

    let redelivered = h
        .settlement
        .handle_payout_callback(TransactionKind::Loan, &payload)
        .await
        .unwrap();
    assert_eq!(redelivered, CallbackOutcome::Applied(TransactionStatus::Failed));
    let wallet = h.store.wallet(farmer.id).unwrap();
    assert_eq!(wallet.loan_limit, dec("500"));
    assert_eq!(wallet.payable_amount, dec("500"));
    assert_eq!(wallet.borrowed_amount, dec("0"));
}

#[tokio::test]
async fn test_fractional_amount_rejected_before_debit() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-112");
    fund(&h.store, farmer.id, "500", "500");

    let err = h.settlement.request(farmer.id, loan("50.50")).await.unwrap_err();
    assert_eq!(err.reason_code(), "validation");
    assert_eq!(h.gateway.disbursement_count(), 0);
    assert!(h.store.transactions().is_empty());
    assert_eq!(h.store.wallet(farmer.id).unwrap().loan_limit, dec("500"));
}

#[tokio::test]
async fn test_validation_rejects_before_any_mutation() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-104");
    fund(&h.store, farmer.id, "100", "100");

    let below = h.settlement.request(farmer.id, loan("40")).await.unwrap_err();
    assert_eq!(below.reason_code(), "below_minimum");

    let short = h.settlement.request(farmer.id, loan("100")).await.unwrap_err();
    assert_eq!(short.reason_code(), "insufficient_funds");

    h.store.set_can_borrow(farmer.id, false);
    let blocked = h.settlement.request(farmer.id, loan("50")).await.unwrap_err();
    assert_eq!(blocked.reason_code(), "borrowing_blocked");

    assert_eq!(h.gateway.disbursement_count(), 0);
    assert!(h.store.transactions().is_empty());
    assert_eq!(h.store.wallet(farmer.id).unwrap().loan_limit, dec("100"));
}

#[tokio::test]
async fn test_unknown_farmer_and_missing_wallet() {
    let h = Harness::new();
    let err = h
        .settlement
        .request(uuid::Uuid::new_v4(), loan("100"))
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), "farmer_not_found");

    let farmer = add_farmer(&h.store, "F-105");
    let err = h.settlement.request(farmer.id, loan("100")).await.unwrap_err();
    assert_eq!(err.reason_code(), "wallet_not_found");
}

#[tokio::test]
async fn test_airtime_charge_is_four_percent() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-106");
    fund(&h.store, farmer.id, "2000", "2000");

    let receipt = h
        .settlement
        .request(
            farmer.id,
            SettlementRequest {
                kind: TransactionKind::AirtimePurchase,
                amount: dec("1000"),
                recipient_phone: Some("254722000111".into()),
            },
        )
        .await
        .unwrap();

    assert_eq!(receipt.charge, dec("40"));
    assert_eq!(receipt.total_amount, dec("1040"));
    assert_eq!(h.store.wallet(farmer.id).unwrap().loan_limit, dec("960"));
    assert!(matches!(
        h.store.transactions()[0].details,
        Some(TransactionDetails::Airtime { ref recipient_phone, .. }) if recipient_phone == "254722000111"
    ));
}

#[tokio::test]
async fn test_transfer_callback_records_recipient_and_remits_charge() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-107");
    fund(&h.store, farmer.id, "1000", "1000");

    let receipt = h
        .settlement
        .request(
            farmer.id,
            SettlementRequest {
                kind: TransactionKind::MoneyTransfer,
                amount: dec("100"),
                recipient_phone: Some("254722000111".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(receipt.charge, dec("10"));

    let payload = payout_callback(&receipt.reference, 0, "254722000111 - Jane Wanjiku");
    let outcome = h
        .settlement
        .handle_payout_callback(TransactionKind::MoneyTransfer, &payload)
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Applied(TransactionStatus::Completed));

    match &h.store.transactions()[0].details {
        Some(TransactionDetails::Transfer {
            recipient_phone,
            recipient_name,
        }) => {
            assert_eq!(recipient_phone, "254722000111");
            assert_eq!(recipient_name.as_deref(), Some("Jane Wanjiku"));
        }
        other => panic!("unexpected details: {:?}", other),
    }

    let remittances = h.gateway.remittances.lock().unwrap().clone();
    assert_eq!(remittances.len(), 1);
    assert_eq!(remittances[0].amount, dec("10"));
    assert_eq!(remittances[0].callback_url, "https://kilo.example/callbacks/b2b");
}

#[tokio::test]
async fn test_failed_callback_reverses_once() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-108");
    fund(&h.store, farmer.id, "500", "500");

    let receipt = h.settlement.request(farmer.id, loan("200")).await.unwrap();
    let payload = payout_callback(&receipt.reference, 2001, "");

    let outcome = h
        .settlement
        .handle_payout_callback(TransactionKind::Loan, &payload)
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Applied(TransactionStatus::Failed));

    let replay = h
        .settlement
        .handle_payout_callback(TransactionKind::Loan, &payload)
        .await
        .unwrap();
    assert_eq!(replay, CallbackOutcome::Duplicate);

    let wallet = h.store.wallet(farmer.id).unwrap();
    assert_eq!(wallet.loan_limit, dec("500"));
    assert_eq!(wallet.payable_amount, dec("500"));
    assert_eq!(wallet.borrowed_amount, dec("0"));
    assert_eq!(h.store.transactions()[0].status, TransactionStatus::Failed);
}

#[tokio::test]
async fn test_malformed_and_unknown_callbacks_change_nothing() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-109");
    fund(&h.store, farmer.id, "500", "500");
    h.settlement.request(farmer.id, loan("200")).await.unwrap();

    let malformed = h
        .settlement
        .handle_payout_callback(TransactionKind::Loan, &json!({"Body": {}}))
        .await
        .unwrap();
    assert!(matches!(malformed, CallbackOutcome::Invalid(_)));

    let unknown = h
        .settlement
        .handle_payout_callback(TransactionKind::Loan, &payout_callback("AG_NOPE", 0, "2547 - X"))
        .await
        .unwrap();
    assert_eq!(unknown, CallbackOutcome::UnknownReference);

    assert_eq!(h.store.transactions()[0].status, TransactionStatus::Pending);
    assert_eq!(h.store.wallet(farmer.id).unwrap().loan_limit, dec("280"));
}
