//! Tests for the entitlement store: idempotency, durability, and
//! subscription-activity recomputation.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tokio::sync::broadcast::error::TryRecvError;

use storegate::{EntitlementStore, EventBus, FileStorage, StoreEvent, SubscriptionRecord};

mod common;
use common::*;

#[test]
fn mark_purchased_is_idempotent() {
    let (store, _events) = memory_store();

    assert!(store.mark_purchased(SUB_MONTHLY).unwrap(), "first call inserts");
    assert!(!store.mark_purchased(SUB_MONTHLY).unwrap(), "second call is a no-op");
    assert!(store.is_purchased(SUB_MONTHLY));
    assert_eq!(store.purchased_products(), vec![SUB_MONTHLY.to_string()]);
}

#[test]
fn duplicate_mark_does_not_rebroadcast() {
    let (store, events) = memory_store();
    let mut rx = events.subscribe();

    store.mark_purchased(SUB_MONTHLY).unwrap();
    store.mark_purchased(SUB_MONTHLY).unwrap();

    match rx.try_recv() {
        Ok(StoreEvent::PurchaseCompleted { product_id }) => assert_eq!(product_id, SUB_MONTHLY),
        other => panic!("expected one PurchaseCompleted, got {other:?}"),
    }
    assert!(
        matches!(rx.try_recv(), Err(TryRecvError::Empty)),
        "no second event for the duplicate call"
    );
}

#[test]
fn entitlements_survive_reopening_the_storage() {
    let dir = tempfile::tempdir().unwrap();

    {
        let storage = FileStorage::new(dir.path()).unwrap();
        let store = EntitlementStore::new(Arc::new(storage), EventBus::new(4));
        store.mark_purchased(SUB_MONTHLY).unwrap();
        store.mark_purchased(CONSUMABLE).unwrap();
    }

    // Fresh adapter over the same directory, as after a process restart.
    let storage = FileStorage::new(dir.path()).unwrap();
    let store = EntitlementStore::new(Arc::new(storage), EventBus::new(4));

    assert!(store.is_purchased(SUB_MONTHLY));
    assert!(store.is_purchased(CONSUMABLE));
    assert!(!store.is_purchased(SUB_ALL));
}

#[test]
fn duplicate_mark_leaves_durable_state_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path()).unwrap();
    let store = EntitlementStore::new(Arc::new(storage), EventBus::new(4));

    store.mark_purchased(SUB_MONTHLY).unwrap();
    let first = std::fs::read_to_string(dir.path().join("storegate.json")).unwrap();

    store.mark_purchased(SUB_MONTHLY).unwrap();
    let second = std::fs::read_to_string(dir.path().join("storegate.json")).unwrap();

    assert_eq!(first, second);
}

#[test]
fn file_storage_requires_an_existing_directory() {
    assert!(FileStorage::new(std::path::Path::new("/definitely/not/here")).is_none());
}

#[test]
fn subscription_activity_is_recomputed_not_read_from_the_flag() {
    let (store, _events) = memory_store();
    store.mark_purchased(SUB_MONTHLY).unwrap();

    let record = SubscriptionRecord::from_entry(&entry(
        SUB_MONTHLY,
        "2024-01-01 00:00:00 UTC",
        "2024-02-01 00:00:00 UTC",
    ))
    .unwrap();

    let inside = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
    let after = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

    assert!(store.is_active_subscription(SUB_MONTHLY, Some(&record), inside));
    // The stored flag still says purchased, but the window has lapsed.
    assert!(store.is_purchased(SUB_MONTHLY));
    assert!(!store.is_active_subscription(SUB_MONTHLY, Some(&record), after));
    // No known record at all: not active.
    assert!(!store.is_active_subscription(SUB_MONTHLY, None, inside));
}

#[test]
fn activity_requires_a_confirmed_purchase() {
    let (store, _events) = memory_store();

    let record = SubscriptionRecord::from_entry(&entry(
        SUB_MONTHLY,
        "2024-01-01 00:00:00 UTC",
        "2024-02-01 00:00:00 UTC",
    ))
    .unwrap();
    let inside = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();

    assert!(!store.is_active_subscription(SUB_MONTHLY, Some(&record), inside));
}

#[test]
fn record_for_a_different_product_does_not_activate() {
    let (store, _events) = memory_store();
    store.mark_purchased(SUB_MONTHLY).unwrap();

    let record = SubscriptionRecord::from_entry(&entry(
        SUB_ALL,
        "2024-01-01 00:00:00 UTC",
        "2024-02-01 00:00:00 UTC",
    ))
    .unwrap();
    let inside = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();

    assert!(!store.is_active_subscription(SUB_MONTHLY, Some(&record), inside));
}
