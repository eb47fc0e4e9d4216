//! End-to-end fulfillment flow tests over the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{BuyerId, Money, OrderId, ShippingMethodId, VariantId};
use domain::{
    DiscountCode, DiscountValue, OrderStatus, PaymentStatus, StockLevel, UsageState,
};
use fulfillment::{
    CheckoutItem, CheckoutRequest, ExpirySweeper, FulfillmentConfig, FulfillmentError,
    FulfillmentService, InMemoryAuditSink, InMemoryGateway, InMemoryNotificationSender,
};
use store::{DiscountStore, InMemoryStore, InventoryStore, PaymentStore};

struct Harness {
    service: Arc<FulfillmentService>,
    store: InMemoryStore,
    gateway: InMemoryGateway,
    notifications: InMemoryNotificationSender,
}

fn setup() -> Harness {
    setup_with(FulfillmentConfig::default())
}

fn setup_with(config: FulfillmentConfig) -> Harness {
    let store = InMemoryStore::new();
    let gateway = InMemoryGateway::new();
    let notifications = InMemoryNotificationSender::new();
    let audit = InMemoryAuditSink::new();

    let service = Arc::new(FulfillmentService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(gateway.clone()),
        Arc::new(notifications.clone()),
        Arc::new(audit),
        config,
    ));

    Harness {
        service,
        store,
        gateway,
        notifications,
    }
}

async fn seed_variant(store: &InMemoryStore, on_hand: i64) -> VariantId {
    let variant = VariantId::new();
    store
        .put_level(StockLevel::new(variant, on_hand))
        .await
        .unwrap();
    variant
}

fn request(buyer: BuyerId, variant: VariantId, quantity: u32, key: &str) -> CheckoutRequest {
    CheckoutRequest {
        buyer_id: buyer,
        items: vec![CheckoutItem {
            variant_id: variant,
            quantity,
            unit_price: Money::from_cents(2000),
            unit_cost: Money::from_cents(1200),
        }],
        shipping_method_id: ShippingMethodId::new(),
        shipping_cost: Money::from_cents(500),
        discount_code: None,
        idempotency_key: key.to_string(),
    }
}

fn percent_code(code: &str, percent: u32, usage_limit: u32) -> DiscountCode {
    DiscountCode::new(
        code,
        DiscountValue::Percentage { percent, cap: None },
        usage_limit,
        1,
        Utc::now() - Duration::days(1),
        Utc::now() + Duration::days(1),
        Money::zero(),
    )
    .unwrap()
}

/// Drives an order through initiate + callback to Processing.
async fn pay(harness: &Harness, order_id: OrderId) {
    let tx = harness.service.initiate_payment(order_id).await.unwrap();
    let tx = harness
        .service
        .handle_callback(tx.authority())
        .await
        .unwrap();
    assert_eq!(tx.status(), PaymentStatus::Succeeded);
}

#[tokio::test]
async fn happy_path_checkout_pay_fulfill() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    harness
        .store
        .insert_code(&percent_code("TEN", 10, 5))
        .await
        .unwrap();

    let mut req = request(BuyerId::new(), variant, 3, "key-1");
    req.discount_code = Some("ten".to_string());
    let placed = harness.service.place_order(req).await.unwrap();
    assert!(!placed.replayed);

    let order = &placed.order;
    // subtotal 6000, 10% off, shipping 500
    assert_eq!(order.subtotal(), Money::from_cents(6000));
    assert_eq!(order.discount_amount(), Money::from_cents(600));
    assert_eq!(order.final_amount(), Money::from_cents(5900));
    assert_eq!(order.status(), OrderStatus::Pending);

    // stock reserved but not sold
    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.on_hand, 10);
    assert_eq!(level.reserved, 3);

    pay(&harness, order.id()).await;

    let paid = harness.service.load_order(order.id()).await.unwrap();
    assert_eq!(paid.status(), OrderStatus::Processing);

    // reservation converted to a sale
    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.on_hand, 7);
    assert_eq!(level.reserved, 0);

    // discount usage confirmed
    let usage = harness
        .store
        .usage_for_order(order.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(usage.state, UsageState::Confirmed);

    assert!(!harness.notifications.sent().is_empty());
}

#[tokio::test]
async fn idempotency_key_replay_returns_original() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    let buyer = BuyerId::new();

    let first = harness
        .service
        .place_order(request(buyer, variant, 3, "key-1"))
        .await
        .unwrap();
    let second = harness
        .service
        .place_order(request(buyer, variant, 3, "key-1"))
        .await
        .unwrap();

    assert!(second.replayed);
    assert_eq!(second.order.id(), first.order.id());

    // replay reserved nothing extra
    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.reserved, 3);
}

#[tokio::test]
async fn reservation_failure_releases_partial() {
    let harness = setup();
    let plentiful = seed_variant(&harness.store, 10).await;
    let scarce = seed_variant(&harness.store, 1).await;

    let req = CheckoutRequest {
        buyer_id: BuyerId::new(),
        items: vec![
            CheckoutItem {
                variant_id: plentiful,
                quantity: 2,
                unit_price: Money::from_cents(1000),
                unit_cost: Money::from_cents(600),
            },
            CheckoutItem {
                variant_id: scarce,
                quantity: 5,
                unit_price: Money::from_cents(1000),
                unit_cost: Money::from_cents(600),
            },
        ],
        shipping_method_id: ShippingMethodId::new(),
        shipping_cost: Money::zero(),
        discount_code: None,
        idempotency_key: "key-1".to_string(),
    };

    let result = harness.service.place_order(req).await;
    assert!(result.is_err());

    // the first item's reservation was rolled back
    let level = harness.store.level(plentiful).await.unwrap().unwrap();
    assert_eq!(level.reserved, 0);
}

#[tokio::test]
async fn ineligible_discount_aborts_checkout() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    // already exhausted
    let mut code = percent_code("GONE", 10, 1);
    code.record_use();
    harness.store.insert_code(&code).await.unwrap();

    let mut req = request(BuyerId::new(), variant, 2, "key-1");
    req.discount_code = Some("GONE".to_string());

    let result = harness.service.place_order(req).await;
    assert!(result.is_err());

    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.reserved, 0);
}

#[tokio::test]
async fn unknown_discount_code_aborts_checkout() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;

    let mut req = request(BuyerId::new(), variant, 2, "key-1");
    req.discount_code = Some("NOSUCH".to_string());

    let result = harness.service.place_order(req).await;
    assert!(matches!(result, Err(FulfillmentError::OrderNotReady(_))));
}

#[tokio::test]
async fn callback_replay_is_idempotent() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    let placed = harness
        .service
        .place_order(request(BuyerId::new(), variant, 3, "key-1"))
        .await
        .unwrap();

    let tx = harness
        .service
        .initiate_payment(placed.order.id())
        .await
        .unwrap();
    harness.service.handle_callback(tx.authority()).await.unwrap();

    // second delivery of the same callback
    let replay = harness
        .service
        .handle_callback(tx.authority())
        .await
        .unwrap();
    assert_eq!(replay.status(), PaymentStatus::Succeeded);

    // effects ran once: stock sold exactly 3
    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.on_hand, 7);
    assert_eq!(level.reserved, 0);

    let order = harness.service.load_order(placed.order.id()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Processing);
}

#[tokio::test]
async fn declined_verification_marks_failed_and_allows_retry() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    let placed = harness
        .service
        .place_order(request(BuyerId::new(), variant, 2, "key-1"))
        .await
        .unwrap();
    let order_id = placed.order.id();

    let tx = harness.service.initiate_payment(order_id).await.unwrap();
    harness.gateway.set_decline_on_verify(true);
    let tx = harness.service.handle_callback(tx.authority()).await.unwrap();
    assert_eq!(tx.status(), PaymentStatus::Failed);

    // order untouched, reservation still held
    let order = harness.service.load_order(order_id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);
    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.reserved, 2);

    // a fresh attempt succeeds
    harness.gateway.set_decline_on_verify(false);
    pay(&harness, order_id).await;
}

#[tokio::test]
async fn amount_mismatch_marks_failed() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    let placed = harness
        .service
        .place_order(request(BuyerId::new(), variant, 2, "key-1"))
        .await
        .unwrap();

    let tx = harness
        .service
        .initiate_payment(placed.order.id())
        .await
        .unwrap();
    harness
        .gateway
        .set_misreport_amount(Some(Money::from_cents(1)));

    let tx = harness.service.handle_callback(tx.authority()).await.unwrap();
    assert_eq!(tx.status(), PaymentStatus::Failed);
}

#[tokio::test]
async fn paid_order_rejects_second_initiate() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    let placed = harness
        .service
        .place_order(request(BuyerId::new(), variant, 2, "key-1"))
        .await
        .unwrap();
    let order_id = placed.order.id();

    pay(&harness, order_id).await;

    let result = harness.service.initiate_payment(order_id).await;
    assert!(matches!(result, Err(FulfillmentError::OrderNotReady(_))));
}

#[tokio::test]
async fn cancel_releases_reservations_and_usage() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    harness
        .store
        .insert_code(&percent_code("TEN", 10, 5))
        .await
        .unwrap();

    let mut req = request(BuyerId::new(), variant, 3, "key-1");
    req.discount_code = Some("TEN".to_string());
    let placed = harness.service.place_order(req).await.unwrap();
    let order_id = placed.order.id();

    let cancelled = harness
        .service
        .cancel_order(order_id, "buyer", "changed my mind")
        .await
        .unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);

    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.on_hand, 10);
    assert_eq!(level.reserved, 0);

    let usage = harness
        .store
        .usage_for_order(order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(usage.state, UsageState::Cancelled);

    // the counter is not freed by cancellation
    let code = harness.store.find_code("TEN").await.unwrap().unwrap();
    assert_eq!(code.used_count(), 1);

    // a second cancel is rejected
    let again = harness
        .service
        .cancel_order(order_id, "buyer", "again")
        .await;
    assert!(matches!(again, Err(FulfillmentError::Domain(_))));
}

#[tokio::test]
async fn cancel_requires_a_reason() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    let placed = harness
        .service
        .place_order(request(BuyerId::new(), variant, 1, "key-1"))
        .await
        .unwrap();

    let result = harness
        .service
        .cancel_order(placed.order.id(), "buyer", "  ")
        .await;
    assert!(matches!(result, Err(FulfillmentError::Domain(_))));

    // reservation untouched
    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.reserved, 1);
}

#[tokio::test]
async fn cancel_after_payment_does_not_restock() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    let placed = harness
        .service
        .place_order(request(BuyerId::new(), variant, 3, "key-1"))
        .await
        .unwrap();
    let order_id = placed.order.id();

    pay(&harness, order_id).await;

    // Processing is still cancellable; the sold reservation must not be
    // resurrected by the release.
    let cancelled = harness
        .service
        .cancel_order(order_id, "support", "buyer called in")
        .await
        .unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);

    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.on_hand, 7);
    assert_eq!(level.reserved, 0);
}

#[tokio::test]
async fn callback_after_cancel_leaves_no_partial_state() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    harness
        .store
        .insert_code(&percent_code("TEN", 10, 5))
        .await
        .unwrap();

    let mut req = request(BuyerId::new(), variant, 3, "key-1");
    req.discount_code = Some("TEN".to_string());
    let placed = harness.service.place_order(req).await.unwrap();
    let order_id = placed.order.id();

    let tx = harness.service.initiate_payment(order_id).await.unwrap();

    // the cancel wins the order row before the gateway callback lands
    harness
        .service
        .cancel_order(order_id, "buyer", "changed my mind")
        .await
        .unwrap();

    let result = harness.service.handle_callback(tx.authority()).await;
    assert!(result.is_err());

    // fully cancelled, nothing half-done: stock restored, usage cancelled
    let order = harness.service.load_order(order_id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.on_hand, 10);
    assert_eq!(level.reserved, 0);
    let usage = harness
        .store
        .usage_for_order(order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(usage.state, UsageState::Cancelled);
}

#[tokio::test]
async fn rejected_cancel_runs_no_compensation() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    harness
        .store
        .insert_code(&percent_code("TEN", 10, 5))
        .await
        .unwrap();

    let mut req = request(BuyerId::new(), variant, 3, "key-1");
    req.discount_code = Some("TEN".to_string());
    let placed = harness.service.place_order(req).await.unwrap();
    let order_id = placed.order.id();

    pay(&harness, order_id).await;
    harness
        .service
        .ship_order(order_id, Some("TRACK-1".to_string()))
        .await
        .unwrap();

    // Shipped refuses the transition, so no compensation may fire
    let result = harness.service.cancel_order(order_id, "buyer", "too late").await;
    assert!(matches!(result, Err(FulfillmentError::Domain(_))));

    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.on_hand, 7);
    let usage = harness
        .store
        .usage_for_order(order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(usage.state, UsageState::Confirmed);
}

#[tokio::test]
async fn refund_flow() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    let placed = harness
        .service
        .place_order(request(BuyerId::new(), variant, 2, "key-1"))
        .await
        .unwrap();
    let order_id = placed.order.id();

    let tx = harness.service.initiate_payment(order_id).await.unwrap();
    let tx = harness.service.handle_callback(tx.authority()).await.unwrap();

    let refunded = harness
        .service
        .refund(tx.id(), None, "admin", "damaged in transit")
        .await
        .unwrap();
    assert_eq!(refunded.status(), PaymentStatus::Refunded);
    assert_eq!(refunded.refunded_amount(), Some(tx.amount()));

    // refunding twice is rejected
    let again = harness
        .service
        .refund(tx.id(), None, "admin", "again")
        .await;
    assert!(matches!(again, Err(FulfillmentError::Domain(_))));
}

#[tokio::test]
async fn partial_refund_keeps_amount() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    let placed = harness
        .service
        .place_order(request(BuyerId::new(), variant, 2, "key-1"))
        .await
        .unwrap();

    let tx = harness
        .service
        .initiate_payment(placed.order.id())
        .await
        .unwrap();
    let tx = harness.service.handle_callback(tx.authority()).await.unwrap();

    let refunded = harness
        .service
        .refund(tx.id(), Some(Money::from_cents(500)), "admin", "goodwill")
        .await
        .unwrap();
    assert_eq!(refunded.refunded_amount(), Some(Money::from_cents(500)));
}

#[tokio::test]
async fn ship_deliver_return_lifecycle() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    let placed = harness
        .service
        .place_order(request(BuyerId::new(), variant, 3, "key-1"))
        .await
        .unwrap();
    let order_id = placed.order.id();

    // shipping before payment is rejected
    let early = harness
        .service
        .ship_order(order_id, Some("TRACK-1".to_string()))
        .await;
    assert!(matches!(early, Err(FulfillmentError::Domain(_))));

    pay(&harness, order_id).await;

    let shipped = harness
        .service
        .ship_order(order_id, Some("TRACK-1".to_string()))
        .await
        .unwrap();
    assert_eq!(shipped.status(), OrderStatus::Shipped);

    let delivered = harness.service.deliver_order(order_id).await.unwrap();
    assert_eq!(delivered.status(), OrderStatus::Delivered);

    let returned = harness
        .service
        .return_order(order_id, "wrong size")
        .await
        .unwrap();
    assert_eq!(returned.status(), OrderStatus::Returned);

    // sold stock came back
    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.on_hand, 10);
    assert_eq!(level.reserved, 0);
}

#[tokio::test]
async fn stale_payment_sweep_expires_and_cancels() {
    let config = FulfillmentConfig {
        payment_pending_cutoff: Duration::zero(),
        ..FulfillmentConfig::default()
    };
    let harness = setup_with(config);
    let variant = seed_variant(&harness.store, 10).await;
    let placed = harness
        .service
        .place_order(request(BuyerId::new(), variant, 3, "key-1"))
        .await
        .unwrap();
    let order_id = placed.order.id();

    let tx = harness.service.initiate_payment(order_id).await.unwrap();

    let sweeper = ExpirySweeper::new(
        Arc::clone(&harness.service),
        std::time::Duration::from_secs(60),
    );
    let expired = sweeper.sweep_stale_payments().await.unwrap();
    assert_eq!(expired, 1);

    let swept = harness.store.find(tx.id()).await.unwrap().unwrap();
    assert_eq!(swept.status(), PaymentStatus::Expired);

    let order = harness.service.load_order(order_id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.reserved, 0);

    // a second sweep finds nothing
    assert_eq!(sweeper.sweep_stale_payments().await.unwrap(), 0);
}

#[tokio::test]
async fn reservation_sweep_releases_lapsed_holds() {
    let config = FulfillmentConfig {
        reservation_ttl: Duration::zero(),
        ..FulfillmentConfig::default()
    };
    let harness = setup_with(config);
    let variant = seed_variant(&harness.store, 10).await;
    harness
        .service
        .place_order(request(BuyerId::new(), variant, 4, "key-1"))
        .await
        .unwrap();

    let sweeper = ExpirySweeper::new(
        Arc::clone(&harness.service),
        std::time::Duration::from_secs(60),
    );
    let released = sweeper.sweep_expired_reservations().await.unwrap();
    assert_eq!(released, 1);

    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.reserved, 0);

    // sweeping again is a no-op
    assert_eq!(sweeper.sweep_expired_reservations().await.unwrap(), 0);
}

#[tokio::test]
async fn worked_scenario_reserve_commit_oversell_cancel() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;

    // order A reserves 3 of 10
    let order_a = harness
        .service
        .place_order(request(BuyerId::new(), variant, 3, "key-a"))
        .await
        .unwrap()
        .order;
    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.available(), 7);

    // payment succeeds, reservation becomes a sale
    pay(&harness, order_a.id()).await;
    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.on_hand, 7);
    assert_eq!(level.reserved, 0);

    // order B wants 8; only 7 free, deterministic failure
    let result = harness
        .service
        .place_order(request(BuyerId::new(), variant, 8, "key-b"))
        .await;
    assert!(result.is_err());

    // cancelling paid order A releases nothing; the sale stands
    harness
        .service
        .cancel_order(order_a.id(), "support", "requested")
        .await
        .unwrap();
    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.on_hand, 7);
    assert_eq!(level.reserved, 0);
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = Arc::clone(&harness.service);
        handles.push(tokio::spawn(async move {
            service
                .place_order(request(
                    BuyerId::new(),
                    variant,
                    3,
                    &format!("key-{i}"),
                ))
                .await
        }));
    }

    let mut placed = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            placed += 1;
        }
    }

    // 10 on hand, 3 each: exactly 3 checkouts fit
    assert_eq!(placed, 3);
    let level = harness.store.level(variant).await.unwrap().unwrap();
    assert_eq!(level.reserved, 9);
    assert!(level.reserved <= level.on_hand);
}

#[tokio::test]
async fn notification_failure_never_fails_the_flow() {
    let harness = setup();
    let variant = seed_variant(&harness.store, 10).await;
    let placed = harness
        .service
        .place_order(request(BuyerId::new(), variant, 2, "key-1"))
        .await
        .unwrap();

    harness.notifications.set_fail_on_send(true);
    pay(&harness, placed.order.id()).await;

    let order = harness.service.load_order(placed.order.id()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Processing);
}
