mod common;

use chrono::{TimeZone, Utc};
use common::{add_farmer, dec, record_json, FakeSource, Harness};
use kilo_ledger::services::{StopReason, StopSignal};
use std::sync::Arc;
use tokio::sync::watch;

fn june_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 9, 0, 0).unwrap()
}

#[tokio::test]
async fn test_window_sync_pages_until_exhausted() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-400");
    let records = (1..=5).map(|id| record_json(id, "F-400", 100.0)).collect();
    let source = Arc::new(FakeSource::new(records));
    let sync = h.sync_service(source.clone(), 2);

    let window = sync.monthly_window(june_now());
    let report = sync.sync_window(window, &StopSignal::never()).await;

    assert_eq!(report.stopped, StopReason::Exhausted);
    assert_eq!(report.pages, 3);
    assert_eq!(report.fetched, 5);
    assert_eq!(report.applied, 5);
    assert_eq!(report.total, Some(5));
    assert_eq!(report.next_skip, 5);
    assert_eq!(source.skips(), vec![0, 2, 4]);
    assert_eq!(h.store.wallet(farmer.id).unwrap().earnings_amount, dec("500"));
}

#[tokio::test]
async fn test_replaying_a_window_is_safe() {
    let h = Harness::new();
    let farmer = add_farmer(&h.store, "F-401");
    let records = (1..=3).map(|id| record_json(id, "F-401", 200.0)).collect();
    let source = Arc::new(FakeSource::new(records));
    let sync = h.sync_service(source, 10);
    let window = sync.daily_window(june_now());

    sync.sync_window(window, &StopSignal::never()).await;
    let second = sync.sync_window(window, &StopSignal::never()).await;

    assert_eq!(second.applied, 0);
    assert_eq!(second.skipped_duplicate, 3);
    assert_eq!(h.store.wallet(farmer.id).unwrap().loan_limit, dec("300"));
}

#[tokio::test]
async fn test_farmer_sync_skips_already_stored_records() {
    let h = Harness::new();
    add_farmer(&h.store, "F-402");
    add_farmer(&h.store, "F-403");
    let records = vec![
        record_json(1, "F-402", 100.0),
        record_json(2, "F-403", 100.0),
        record_json(3, "F-402", 100.0),
        record_json(4, "F-402", 100.0),
    ];
    let source = Arc::new(FakeSource::new(records));
    let sync = h.sync_service(source.clone(), 2);
    let window = sync.monthly_window(june_now());

    let first = sync
        .sync_farmer_by_code("F-402", window, &StopSignal::never())
        .await
        .unwrap();
    assert_eq!(first.applied, 3);

    let second = sync
        .sync_farmer_by_code("F-402", window, &StopSignal::never())
        .await
        .unwrap();
    assert_eq!(second.pages, 1);
    assert_eq!(second.fetched, 0);
    assert_eq!(second.stopped, StopReason::Exhausted);

    let queries = source.queries.lock().unwrap();
    assert_eq!(queries.last().unwrap().skip, 3);
    assert!(queries.iter().all(|q| q.farmer_code.as_deref() == Some("F-402")));
}

#[tokio::test]
async fn test_unknown_farmer_code_is_an_error() {
    let h = Harness::new();
    let sync = h.sync_service(Arc::new(FakeSource::new(Vec::new())), 2);
    let window = sync.monthly_window(june_now());

    let err = sync
        .sync_farmer_by_code("NOPE", window, &StopSignal::never())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("NOPE"));
}

#[tokio::test]
async fn test_fetch_failure_aborts_with_resume_offset() {
    let h = Harness::new();
    add_farmer(&h.store, "F-404");
    let records = (1..=6).map(|id| record_json(id, "F-404", 100.0)).collect();
    let source = Arc::new(FakeSource::new(records).failing_at(4));
    let sync = h.sync_service(source, 2);

    let report = sync
        .sync_window(sync.daily_window(june_now()), &StopSignal::never())
        .await;

    assert!(matches!(report.stopped, StopReason::Aborted(_)));
    assert_eq!(report.applied, 4);
    assert_eq!(report.next_skip, 4);
}

#[tokio::test]
async fn test_empty_page_before_total_stops() {
    let h = Harness::new();
    add_farmer(&h.store, "F-405");
    let records = (1..=2).map(|id| record_json(id, "F-405", 100.0)).collect();
    let source = Arc::new(FakeSource::new(records).announcing(10));
    let sync = h.sync_service(source, 2);

    let report = sync
        .sync_window(sync.daily_window(june_now()), &StopSignal::never())
        .await;

    assert_eq!(report.stopped, StopReason::EmptyPage);
    assert_eq!(report.applied, 2);
}

#[tokio::test]
async fn test_cancelled_before_first_page() {
    let h = Harness::new();
    let source = Arc::new(FakeSource::new(vec![record_json(1, "F-406", 100.0)]));
    let sync = h.sync_service(source.clone(), 2);
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let report = sync
        .sync_window(sync.daily_window(june_now()), &StopSignal::new(rx))
        .await;

    assert_eq!(report.stopped, StopReason::Cancelled);
    assert!(source.skips().is_empty());
}

#[tokio::test]
async fn test_all_farmers_sync_isolates_failures() {
    let h = Harness::new();
    let a = add_farmer(&h.store, "F-407");
    let b = add_farmer(&h.store, "F-408");
    let records = vec![record_json(1, "F-407", 100.0), record_json(2, "F-408", 300.0)];
    let source = Arc::new(FakeSource::new(records));
    let sync = h.sync_service(source, 5);

    let results = sync
        .sync_all_farmers(sync.monthly_window(june_now()), &StopSignal::never())
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(h.store.wallet(a.id).unwrap().earnings_amount, dec("100"));
    assert_eq!(h.store.wallet(b.id).unwrap().earnings_amount, dec("300"));
}
