//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and serialize on it; each
//! test truncates the tables it touches before running.
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{BuyerId, Money, OrderId, ReferenceNumber, ShippingMethodId, VariantId};
use domain::order::{NewOrder, OrderItem};
use domain::{
    DiscountCode, DiscountValue, MovementKind, Order, PaymentStatus, PaymentTransaction,
    StockLevel, UsageState,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{DiscountStore, InventoryStore, OrderStore, PaymentStore, PostgresStore, StoreError};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Run the schema using raw_sql to execute multiple statements
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/20250301000001_initial_schema.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    // Clear tables for test isolation
    sqlx::query(
        "TRUNCATE TABLE orders, payment_transactions, stock_levels, stock_movements, \
         discount_usages, discount_codes",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

fn place_order(buyer_id: BuyerId, key: &str) -> Order {
    Order::place(
        NewOrder {
            id: OrderId::new(),
            buyer_id,
            items: vec![OrderItem::new(
                VariantId::new(),
                2,
                Money::from_cents(1500),
                Money::from_cents(900),
            )],
            shipping_method_id: ShippingMethodId::new(),
            shipping_cost: Money::from_cents(500),
            discount: None,
            idempotency_key: key.to_string(),
        },
        Utc::now(),
    )
    .unwrap()
}

fn active_code(code: &str, usage_limit: u32, per_user_limit: u32) -> DiscountCode {
    DiscountCode::new(
        code,
        DiscountValue::Fixed {
            amount: Money::from_cents(500),
        },
        usage_limit,
        per_user_limit,
        Utc::now() - Duration::days(1),
        Utc::now() + Duration::days(1),
        Money::zero(),
    )
    .unwrap()
}

#[tokio::test]
#[serial]
async fn insert_and_find_order_round_trips() {
    let store = get_test_store().await;
    let order = place_order(BuyerId::new(), "key-1");

    OrderStore::insert(&store, &order).await.unwrap();

    let found = OrderStore::find(&store, order.id()).await.unwrap().unwrap();
    assert_eq!(found.id(), order.id());
    assert_eq!(found.final_amount(), order.final_amount());
    assert_eq!(found.version(), order.version());
}

#[tokio::test]
#[serial]
async fn duplicate_idempotency_key_maps_to_duplicate_key() {
    let store = get_test_store().await;
    let buyer = BuyerId::new();

    OrderStore::insert(&store, &place_order(buyer, "key-1"))
        .await
        .unwrap();
    let result = OrderStore::insert(&store, &place_order(buyer, "key-1")).await;
    assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));

    // same key for a different buyer is fine
    OrderStore::insert(&store, &place_order(BuyerId::new(), "key-1"))
        .await
        .unwrap();

    let replayed = store
        .find_by_idempotency_key(buyer, "key-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replayed.buyer_id(), buyer);
}

#[tokio::test]
#[serial]
async fn stale_order_update_conflicts() {
    let store = get_test_store().await;
    let order = place_order(BuyerId::new(), "key-1");
    OrderStore::insert(&store, &order).await.unwrap();

    let mut winner = order.clone();
    winner.mark_paid().unwrap();
    let new_version = OrderStore::update(&store, &winner).await.unwrap();
    assert_eq!(new_version, order.version().next());

    let mut loser = order.clone();
    loser.cancel("buyer", "changed my mind").unwrap();
    let result = OrderStore::update(&store, &loser).await;
    assert!(matches!(result, Err(StoreError::VersionConflict { .. })));

    // the winner's write survived
    let stored = OrderStore::find(&store, order.id()).await.unwrap().unwrap();
    assert!(stored.status().is_paid());
    assert_eq!(stored.version(), new_version);
}

#[tokio::test]
#[serial]
async fn payment_authority_is_unique() {
    let store = get_test_store().await;
    let amount = Money::from_cents(1000);

    let tx1 = PaymentTransaction::initiate(OrderId::new(), amount, "AUTH-1", Utc::now());
    let tx2 = PaymentTransaction::initiate(OrderId::new(), amount, "AUTH-1", Utc::now());

    PaymentStore::insert(&store, &tx1).await.unwrap();
    let result = PaymentStore::insert(&store, &tx2).await;
    assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));

    let found = store.find_by_authority("AUTH-1").await.unwrap().unwrap();
    assert_eq!(found.id(), tx1.id());
}

#[tokio::test]
#[serial]
async fn second_success_per_order_rejected() {
    let store = get_test_store().await;
    let order_id = OrderId::new();
    let amount = Money::from_cents(1000);

    let mut tx1 = PaymentTransaction::initiate(order_id, amount, "AUTH-A", Utc::now());
    let mut tx2 = PaymentTransaction::initiate(order_id, amount, "AUTH-B", Utc::now());
    PaymentStore::insert(&store, &tx1).await.unwrap();
    PaymentStore::insert(&store, &tx2).await.unwrap();

    tx1.verify(true, amount, None, None, Utc::now()).unwrap();
    PaymentStore::update(&store, &tx1).await.unwrap();
    assert!(store.has_succeeded_for_order(order_id).await.unwrap());

    tx2.verify(true, amount, None, None, Utc::now()).unwrap();
    let result = PaymentStore::update(&store, &tx2).await;
    assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
}

#[tokio::test]
#[serial]
async fn failed_attempt_does_not_block_retry() {
    let store = get_test_store().await;
    let order_id = OrderId::new();
    let amount = Money::from_cents(1000);

    let mut failed = PaymentTransaction::initiate(order_id, amount, "AUTH-F", Utc::now());
    PaymentStore::insert(&store, &failed).await.unwrap();
    failed.verify(false, amount, None, None, Utc::now()).unwrap();
    PaymentStore::update(&store, &failed).await.unwrap();

    // a fresh attempt for the same order inserts cleanly
    let retry = PaymentTransaction::initiate(order_id, amount, "AUTH-G", Utc::now());
    PaymentStore::insert(&store, &retry).await.unwrap();
}

#[tokio::test]
#[serial]
async fn stale_pending_scan_respects_cutoff() {
    let store = get_test_store().await;
    let amount = Money::from_cents(1000);

    let old = PaymentTransaction::initiate(
        OrderId::new(),
        amount,
        "OLD",
        Utc::now() - Duration::hours(2),
    );
    let fresh = PaymentTransaction::initiate(OrderId::new(), amount, "FRESH", Utc::now());
    PaymentStore::insert(&store, &old).await.unwrap();
    PaymentStore::insert(&store, &fresh).await.unwrap();

    let stale = store
        .find_stale_pending(Utc::now() - Duration::hours(1), 10)
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].authority(), "OLD");
    assert_eq!(stale[0].status(), PaymentStatus::Pending);
}

#[tokio::test]
#[serial]
async fn reserve_commit_ledger_and_counters_agree() {
    let store = get_test_store().await;
    let variant = VariantId::new();
    store
        .put_level(StockLevel::new(variant, 10))
        .await
        .unwrap();

    let reference = ReferenceNumber::for_order(OrderId::new());
    store.reserve(variant, 3, &reference, None).await.unwrap();

    let level = InventoryStore::level(&store, variant)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(level.on_hand, 10);
    assert_eq!(level.reserved, 3);

    assert_eq!(store.commit(&reference).await.unwrap(), 1);
    assert_eq!(store.commit(&reference).await.unwrap(), 0);

    let level = InventoryStore::level(&store, variant)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(level.on_hand, 7);
    assert_eq!(level.reserved, 0);

    let movements = store.movements_for(&reference).await.unwrap();
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[0].kind, MovementKind::Reservation);
    assert!(movements[0].reversed);
    assert_eq!(movements[1].kind, MovementKind::Sale);
    assert_eq!(movements[1].stock_before, 10);
    assert_eq!(movements[1].stock_after, 7);
}

#[tokio::test]
#[serial]
async fn release_restores_availability() {
    let store = get_test_store().await;
    let variant = VariantId::new();
    store
        .put_level(StockLevel::new(variant, 10))
        .await
        .unwrap();

    let reference = ReferenceNumber::for_order(OrderId::new());
    store.reserve(variant, 4, &reference, None).await.unwrap();
    assert_eq!(store.release(&reference).await.unwrap(), 1);
    assert_eq!(store.release(&reference).await.unwrap(), 0);

    let availability = store.availability(variant).await.unwrap().unwrap();
    assert_eq!(availability.available, 10);
    assert!(availability.in_stock);
}

#[tokio::test]
#[serial]
async fn insufficient_stock_fails_without_side_effects() {
    let store = get_test_store().await;
    let variant = VariantId::new();
    store
        .put_level(StockLevel::new(variant, 10))
        .await
        .unwrap();

    let winner = ReferenceNumber::for_order(OrderId::new());
    store.reserve(variant, 8, &winner, None).await.unwrap();

    let loser = ReferenceNumber::for_order(OrderId::new());
    let result = store.reserve(variant, 3, &loser, None).await;
    assert!(matches!(result, Err(StoreError::Domain(_))));

    // no partial state from the failed reserve
    let level = InventoryStore::level(&store, variant)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(level.reserved, 8);
    assert!(store.movements_for(&loser).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn unlimited_variant_reserves_without_rows() {
    let store = get_test_store().await;
    let variant = VariantId::new();
    store
        .put_level(StockLevel::unlimited(variant))
        .await
        .unwrap();

    let reference = ReferenceNumber::for_order(OrderId::new());
    store
        .reserve(variant, 1000, &reference, None)
        .await
        .unwrap();

    assert!(store.movements_for(&reference).await.unwrap().is_empty());
    let availability = store.availability(variant).await.unwrap().unwrap();
    assert!(availability.in_stock);
    assert!(availability.unlimited);
}

#[tokio::test]
#[serial]
async fn expired_references_are_distinct() {
    let store = get_test_store().await;
    let variant_a = VariantId::new();
    let variant_b = VariantId::new();
    store
        .put_level(StockLevel::new(variant_a, 10))
        .await
        .unwrap();
    store
        .put_level(StockLevel::new(variant_b, 10))
        .await
        .unwrap();

    let stale = ReferenceNumber::for_order(OrderId::new());
    let fresh = ReferenceNumber::for_order(OrderId::new());
    let past = Utc::now() - Duration::minutes(5);
    let future = Utc::now() + Duration::hours(1);

    store
        .reserve(variant_a, 1, &stale, Some(past))
        .await
        .unwrap();
    store
        .reserve(variant_b, 1, &stale, Some(past))
        .await
        .unwrap();
    store
        .reserve(variant_a, 1, &fresh, Some(future))
        .await
        .unwrap();

    let expired = store.expired_references(Utc::now()).await.unwrap();
    assert_eq!(expired, vec![stale.clone()]);

    // released references stop showing up
    store.release(&stale).await.unwrap();
    assert!(store.expired_references(Utc::now()).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn adjustment_is_logged() {
    let store = get_test_store().await;
    let variant = VariantId::new();
    store
        .put_level(StockLevel::new(variant, 10))
        .await
        .unwrap();

    store.adjust(variant, -4).await.unwrap();

    let level = InventoryStore::level(&store, variant)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(level.on_hand, 6);
}

#[tokio::test]
#[serial]
async fn discount_apply_increments_under_lock() {
    let store = get_test_store().await;
    store.insert_code(&active_code("SAVE5", 10, 3)).await.unwrap();

    let buyer = BuyerId::new();
    let usage = store
        .apply("save5", buyer, OrderId::new(), Money::from_cents(4000), Utc::now())
        .await
        .unwrap();
    assert_eq!(usage.amount, Money::from_cents(500));
    assert_eq!(usage.state, UsageState::Pending);

    let code = store.find_code("SAVE5").await.unwrap().unwrap();
    assert_eq!(code.used_count(), 1);
}

#[tokio::test]
#[serial]
async fn concurrent_appliers_never_overshoot_the_limit() {
    let store = get_test_store().await;
    let limit = 5u32;
    store.insert_code(&active_code("HOT", limit, 1)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .apply(
                    "HOT",
                    BuyerId::new(),
                    OrderId::new(),
                    Money::from_cents(10_000),
                    Utc::now(),
                )
                .await
        }));
    }

    let mut ok = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            ok += 1;
        }
    }

    assert_eq!(ok, limit);
    let code = store.find_code("HOT").await.unwrap().unwrap();
    assert_eq!(code.used_count(), limit);
}

#[tokio::test]
#[serial]
async fn per_user_limit_counts_prior_usages() {
    let store = get_test_store().await;
    store.insert_code(&active_code("ONCE", 10, 1)).await.unwrap();

    let buyer = BuyerId::new();
    let total = Money::from_cents(4000);
    store
        .apply("ONCE", buyer, OrderId::new(), total, Utc::now())
        .await
        .unwrap();

    let result = store
        .apply("ONCE", buyer, OrderId::new(), total, Utc::now())
        .await;
    assert!(matches!(result, Err(StoreError::Domain(_))));
}

#[tokio::test]
#[serial]
async fn cancelled_usage_keeps_the_counter() {
    let store = get_test_store().await;
    store.insert_code(&active_code("KEEP", 10, 5)).await.unwrap();

    let order_id = OrderId::new();
    store
        .apply("KEEP", BuyerId::new(), order_id, Money::from_cents(4000), Utc::now())
        .await
        .unwrap();

    assert!(store.cancel_usage(order_id).await.unwrap());
    assert!(!store.cancel_usage(order_id).await.unwrap());
    assert!(!store.confirm_usage(order_id).await.unwrap());

    let usage = store.usage_for_order(order_id).await.unwrap().unwrap();
    assert_eq!(usage.state, UsageState::Cancelled);
    let code = store.find_code("KEEP").await.unwrap().unwrap();
    assert_eq!(code.used_count(), 1);
}
