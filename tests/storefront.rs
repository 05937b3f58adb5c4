mod common;

use common::{memory_store, StubBackend};
use popclozet_core::application::services::{StorefrontService, SyncService};
use popclozet_core::domain::value_objects::QueueAction;
use popclozet_core::infrastructure::connectivity::ConnectivityMonitor;
use popclozet_core::infrastructure::offline::MutationQueue;
use serde_json::json;
use std::sync::Arc;

struct Harness {
    backend: Arc<StubBackend>,
    queue: Arc<MutationQueue>,
    monitor: Arc<ConnectivityMonitor>,
    storefront: StorefrontService,
}

async fn harness(initially_online: bool) -> Harness {
    let store = memory_store().await;
    let backend = Arc::new(StubBackend::default());
    let queue = Arc::new(MutationQueue::new(store.clone()));
    let monitor = Arc::new(ConnectivityMonitor::new(initially_online));
    let storefront = StorefrontService::new(
        store,
        queue.clone(),
        backend.clone(),
        monitor.clone(),
    );
    Harness {
        backend,
        queue,
        monitor,
        storefront,
    }
}

#[tokio::test]
async fn offline_cart_mutations_accumulate_and_queue() {
    let h = harness(false).await;

    let item = h.storefront.add_to_cart("p1", 1).await.unwrap();
    assert_eq!(item.quantity, 1);
    let item = h.storefront.add_to_cart("p1", 2).await.unwrap();
    assert_eq!(item.quantity, 3);

    let entries = h.queue.list_unsynced().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.action == QueueAction::AddToCart));

    let items = h.storefront.cart_items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 3);
}

#[tokio::test]
async fn online_cart_mutations_skip_the_queue() {
    let h = harness(true).await;
    h.storefront.add_to_cart("p1", 1).await.unwrap();
    h.storefront.add_to_wishlist("p2").await.unwrap();
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn zero_quantity_update_removes_the_row() {
    let h = harness(false).await;
    h.storefront.add_to_cart("p1", 2).await.unwrap();

    h.storefront.update_cart_quantity("p1", 0).await.unwrap();
    assert!(h.storefront.cart_items().await.unwrap().is_empty());

    let actions: Vec<QueueAction> = h
        .queue
        .list_unsynced()
        .await
        .unwrap()
        .iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec![QueueAction::AddToCart, QueueAction::RemoveFromCart]
    );
}

#[tokio::test]
async fn wishlist_round_trip() {
    let h = harness(false).await;
    h.storefront.add_to_wishlist("p7").await.unwrap();
    assert!(h.storefront.is_in_wishlist("p7").await.unwrap());

    h.storefront.remove_from_wishlist("p7").await.unwrap();
    assert!(!h.storefront.is_in_wishlist("p7").await.unwrap());
    assert!(h.storefront.wishlist_items().await.unwrap().is_empty());
}

#[tokio::test]
async fn offline_signup_queues_until_the_next_drain() {
    let h = harness(false).await;
    let synced = h.storefront.signup_email("shopper@example.com").await.unwrap();
    assert!(!synced);
    assert_eq!(h.backend.insert_count(), 0);
    assert_eq!(h.queue.len().await.unwrap(), 1);

    // 再接続後のドレインでリモートへ届く
    h.monitor.set_online(true);
    let sync = SyncService::new(h.queue.clone(), h.backend.clone(), h.monitor.clone());
    sync.drain().await.unwrap().unwrap();

    let inserts = h.backend.inserts("email_signups");
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0]["email"], "shopper@example.com");
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn online_signup_hits_the_remote_directly() {
    let h = harness(true).await;
    let synced = h.storefront.signup_email("direct@example.com").await.unwrap();
    assert!(synced);
    assert_eq!(h.backend.inserts("email_signups").len(), 1);
    assert_eq!(h.queue.len().await.unwrap(), 0);

    let err = h.storefront.signup_email("not-an-email").await.unwrap_err();
    assert!(matches!(
        err,
        popclozet_core::AppError::ValidationError(_)
    ));
}

#[tokio::test]
async fn preferences_are_singleton_per_key() {
    let h = harness(true).await;
    h.storefront
        .set_preference("theme", &json!("dark"))
        .await
        .unwrap();
    h.storefront
        .set_preference("theme", &json!("light"))
        .await
        .unwrap();

    assert_eq!(
        h.storefront.get_preference("theme").await.unwrap(),
        Some(json!("light"))
    );
    assert_eq!(h.storefront.get_preference("missing").await.unwrap(), None);
}
