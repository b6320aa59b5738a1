//! End-to-end order flow scenarios against a live Postgres.
//!
//! These are ignored by default so the suite passes without infrastructure.
//! Point DATABASE_URL at a scratch database and run:
//!
//! ```text
//! cargo test --test order_flow -- --ignored
//! ```

use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use loomworks_orders::domain::order::{OrderStatus, ShippingAddress};
use loomworks_orders::error::OrderServiceError;
use loomworks_orders::intake::{self, CreateOrderRequest, OrderItemRequest};
use loomworks_orders::{inventory, lifecycle, lookup, sweeper};

async fn test_pool() -> Result<PgPool> {
    let url = std::env::var("DATABASE_URL")?;
    let pool = PgPool::connect(&url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Seed one product with one variant at the given stock level. Fresh UUIDs
/// per call keep tests independent even on a shared database.
async fn seed_variant(pool: &PgPool, stock: i32, price: i64) -> Result<Uuid> {
    let product_id = Uuid::new_v4();
    let variant_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO products (id, name, slug, base_price, active) VALUES ($1, $2, $3, $4, TRUE)",
    )
    .bind(product_id)
    .bind("Block Print Kurta")
    .bind(format!("block-print-kurta-{product_id}"))
    .bind(price)
    .execute(pool)
    .await?;
    sqlx::query(
        "INSERT INTO product_variants (id, product_id, sku, size, color, stock_qty, reserved_qty) \
         VALUES ($1, $2, $3, 'M', 'Blue', $4, 0)",
    )
    .bind(variant_id)
    .bind(product_id)
    .bind(format!("kurta-m-blue-{variant_id}"))
    .bind(stock)
    .execute(pool)
    .await?;
    Ok(variant_id)
}

fn request_for(variant_id: Uuid, qty: i32) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_name: "Ravi Kumar".into(),
        customer_phone: "+91 98765-43210".into(),
        customer_email: Some("ravi@example.com".into()),
        shipping_address: ShippingAddress {
            line1: Some("12 Weaver Lane".into()),
            line2: None,
            city: Some("Coimbatore".into()),
            state: Some("Tamil Nadu".into()),
            postal_code: Some("641001".into()),
            country: Some("India".into()),
        },
        items: vec![OrderItemRequest {
            variant_id: Some(variant_id),
            product_id: None,
            product_name: None,
            size: None,
            color: None,
            qty,
            unit_price: None,
        }],
        payment_method: None,
    }
}

async fn counters(pool: &PgPool, variant_id: Uuid) -> Result<(i32, i32)> {
    let row: (i32, i32) =
        sqlx::query_as("SELECT stock_qty, reserved_qty FROM product_variants WHERE id = $1")
            .bind(variant_id)
            .fetch_one(pool)
            .await?;
    Ok(row)
}

async fn reservation_count(pool: &PgPool, order_id: Uuid) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM inventory_reservations WHERE order_id = $1")
            .bind(order_id)
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

/// Backdate an order's hold so the sweeper sees it as expired.
async fn expire_order(pool: &PgPool, order_id: Uuid) -> Result<()> {
    let past = Utc::now() - Duration::minutes(30);
    sqlx::query("UPDATE orders SET reserved_until = $2 WHERE id = $1")
        .bind(order_id)
        .bind(past)
        .execute(pool)
        .await?;
    sqlx::query("UPDATE inventory_reservations SET reserved_until = $2 WHERE order_id = $1")
        .bind(order_id)
        .bind(past)
        .execute(pool)
        .await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres via DATABASE_URL"]
async fn creating_an_order_reserves_stock() -> Result<()> {
    let pool = test_pool().await?;
    let variant_id = seed_variant(&pool, 10, 1899).await?;

    let created = intake::create_order(
        &pool,
        "LW",
        "919876543210",
        request_for(variant_id, 3),
        Utc::now(),
    )
    .await?;

    assert_eq!(counters(&pool, variant_id).await?, (7, 3));
    assert_eq!(reservation_count(&pool, created.order.id).await?, 1);
    assert_eq!(created.order.status, "PENDING");
    assert_eq!(created.order.customer_phone, "9876543210");
    assert_eq!(created.order.subtotal, 3 * 1899);
    assert_eq!(created.order.shipping, 0); // over the free-shipping threshold
    assert!(created.order.reserved_until.is_some());
    assert_eq!(created.items.len(), 1);
    assert!(created.whatsapp_url.starts_with("https://wa.me/919876543210?text="));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres via DATABASE_URL"]
async fn small_orders_pay_flat_shipping() -> Result<()> {
    let pool = test_pool().await?;
    let variant_id = seed_variant(&pool, 10, 650).await?;

    let created = intake::create_order(
        &pool,
        "LW",
        "919876543210",
        request_for(variant_id, 1),
        Utc::now(),
    )
    .await?;

    assert_eq!(created.order.subtotal, 650);
    assert_eq!(created.order.shipping, 50);
    assert_eq!(created.order.total, 700);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres via DATABASE_URL"]
async fn cancelling_releases_the_hold() -> Result<()> {
    let pool = test_pool().await?;
    let variant_id = seed_variant(&pool, 10, 1899).await?;
    let created = intake::create_order(
        &pool,
        "LW",
        "919876543210",
        request_for(variant_id, 3),
        Utc::now(),
    )
    .await?;

    let (order, previous) =
        lifecycle::advance(&pool, created.order.id, OrderStatus::Cancelled).await?;
    assert_eq!(previous, OrderStatus::Pending);
    assert_eq!(order.status, "CANCELLED");
    assert_eq!(counters(&pool, variant_id).await?, (10, 0));
    assert_eq!(reservation_count(&pool, created.order.id).await?, 0);

    // A second cancellation attempt is rejected by the state machine and
    // must not touch the ledger again.
    let err = lifecycle::advance(&pool, created.order.id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderServiceError::InvalidTransition { .. }));
    assert_eq!(counters(&pool, variant_id).await?, (10, 0));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres via DATABASE_URL"]
async fn sweeper_reclaims_expired_holds_and_cancels() -> Result<()> {
    let pool = test_pool().await?;
    let variant_id = seed_variant(&pool, 10, 1899).await?;
    let created = intake::create_order(
        &pool,
        "LW",
        "919876543210",
        request_for(variant_id, 3),
        Utc::now(),
    )
    .await?;
    expire_order(&pool, created.order.id).await?;

    let outcome = sweeper::sweep_expired(&pool, Utc::now(), sweeper::DEFAULT_BATCH_LIMIT).await?;
    assert_eq!(outcome.reservations_released, 1);
    assert_eq!(outcome.orders_cancelled, 1);
    assert_eq!(counters(&pool, variant_id).await?, (10, 0));

    let status: (String,) = sqlx::query_as("SELECT status FROM orders WHERE id = $1")
        .bind(created.order.id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(status.0, "CANCELLED");

    // Overlapping schedules: a second pass finds nothing to do.
    let again = sweeper::sweep_expired(&pool, Utc::now(), sweeper::DEFAULT_BATCH_LIMIT).await?;
    assert_eq!(again, sweeper::SweepOutcome::default());
    assert_eq!(counters(&pool, variant_id).await?, (10, 0));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres via DATABASE_URL"]
async fn deleting_a_pending_order_restores_stock() -> Result<()> {
    let pool = test_pool().await?;
    let variant_id = seed_variant(&pool, 10, 1899).await?;
    let created = intake::create_order(
        &pool,
        "LW",
        "919876543210",
        request_for(variant_id, 3),
        Utc::now(),
    )
    .await?;

    let deleted = lifecycle::delete_orders(&pool, &[created.order.id]).await?;
    assert_eq!(deleted, 1);
    assert_eq!(counters(&pool, variant_id).await?, (10, 0));

    let remaining: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE id = $1")
        .bind(created.order.id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(remaining.0, 0);

    // Unknown ids are skipped, and nothing is double-released.
    let deleted = lifecycle::delete_orders(&pool, &[created.order.id]).await?;
    assert_eq!(deleted, 0);
    assert_eq!(counters(&pool, variant_id).await?, (10, 0));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres via DATABASE_URL"]
async fn confirm_consumes_hold_and_delete_restocks() -> Result<()> {
    let pool = test_pool().await?;
    let variant_id = seed_variant(&pool, 10, 1899).await?;
    let created = intake::create_order(
        &pool,
        "LW",
        "919876543210",
        request_for(variant_id, 3),
        Utc::now(),
    )
    .await?;

    let (order, _) = lifecycle::advance(&pool, created.order.id, OrderStatus::Confirmed).await?;
    assert_eq!(order.status, "CONFIRMED");
    assert!(order.reserved_until.is_none());
    // Hold consumed: units leave the ledger, available stock unchanged.
    assert_eq!(counters(&pool, variant_id).await?, (7, 0));
    assert_eq!(reservation_count(&pool, created.order.id).await?, 0);

    // Hard delete of a confirmed order returns the committed units.
    lifecycle::delete_orders(&pool, &[created.order.id]).await?;
    assert_eq!(counters(&pool, variant_id).await?, (10, 0));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres via DATABASE_URL"]
async fn cancel_then_delete_releases_exactly_once() -> Result<()> {
    let pool = test_pool().await?;
    let variant_id = seed_variant(&pool, 10, 1899).await?;
    let created = intake::create_order(
        &pool,
        "LW",
        "919876543210",
        request_for(variant_id, 4),
        Utc::now(),
    )
    .await?;

    lifecycle::advance(&pool, created.order.id, OrderStatus::Cancelled).await?;
    assert_eq!(counters(&pool, variant_id).await?, (10, 0));

    lifecycle::delete_orders(&pool, &[created.order.id]).await?;
    assert_eq!(counters(&pool, variant_id).await?, (10, 0));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres via DATABASE_URL"]
async fn concurrent_checkouts_never_oversell() -> Result<()> {
    let pool = test_pool().await?;
    let variant_id = seed_variant(&pool, 10, 1899).await?;

    let (a, b) = tokio::join!(
        intake::create_order(
            &pool,
            "LW",
            "919876543210",
            request_for(variant_id, 6),
            Utc::now(),
        ),
        intake::create_order(
            &pool,
            "LW",
            "919876543210",
            request_for(variant_id, 6),
            Utc::now(),
        ),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|&&ok| ok).count();
    assert_eq!(successes, 1, "exactly one of two 6-unit checkouts may win");
    for result in [a, b] {
        if let Err(e) = result {
            assert!(matches!(e, OrderServiceError::InsufficientStock { .. }));
        }
    }
    assert_eq!(counters(&pool, variant_id).await?, (4, 6));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres via DATABASE_URL"]
async fn rejected_checkout_leaves_no_partial_order() -> Result<()> {
    let pool = test_pool().await?;
    let variant_id = seed_variant(&pool, 2, 1899).await?;

    let err = intake::create_order(
        &pool,
        "LW",
        "919876543210",
        request_for(variant_id, 5),
        Utc::now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, OrderServiceError::InsufficientStock { .. }));

    // All-or-nothing: the rolled-back order left no rows and no holds.
    let orders: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM order_items WHERE variant_id = $1",
    )
    .bind(variant_id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(orders.0, 0);
    assert_eq!(counters(&pool, variant_id).await?, (2, 0));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres via DATABASE_URL"]
async fn unresolved_lines_skip_inventory() -> Result<()> {
    let pool = test_pool().await?;
    let variant_id = seed_variant(&pool, 10, 1899).await?;

    let mut req = request_for(variant_id, 2);
    req.items.push(OrderItemRequest {
        variant_id: None,
        product_id: None,
        product_name: Some("Custom Tailoring Charge".into()),
        size: None,
        color: None,
        qty: 1,
        unit_price: Some(200),
    });

    let created = intake::create_order(&pool, "LW", "919876543210", req, Utc::now()).await?;
    assert_eq!(created.items.len(), 2);
    assert_eq!(created.order.subtotal, 2 * 1899 + 200);
    // Only the resolved line holds stock.
    assert_eq!(counters(&pool, variant_id).await?, (8, 2));
    assert_eq!(reservation_count(&pool, created.order.id).await?, 1);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres via DATABASE_URL"]
async fn phone_lookup_matches_all_formats() -> Result<()> {
    let pool = test_pool().await?;
    let variant_id = seed_variant(&pool, 10, 1899).await?;
    let created = intake::create_order(
        &pool,
        "LW",
        "919876543210",
        request_for(variant_id, 1),
        Utc::now(),
    )
    .await?;

    for query in ["+91 98765-43210", "9876543210", "919876543210"] {
        let found = lookup::find_by_phone(&pool, query).await?;
        assert!(
            found.iter().any(|o| o.order.id == created.order.id),
            "query {query:?} should find the order"
        );
        for o in &found {
            assert!(!o.items.is_empty());
        }
    }

    let by_number = lookup::find_by_order_number(&pool, &created.order.order_number).await?;
    assert_eq!(by_number.unwrap().order.id, created.order.id);
    assert!(lookup::find_by_order_number(&pool, "LW-19700101-XXXXXX")
        .await?
        .is_none());

    let by_email = lookup::find_by_email(&pool, "ravi@example.com").await?;
    assert!(by_email.iter().any(|o| o.order.id == created.order.id));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres via DATABASE_URL"]
async fn forward_transitions_walk_the_chain() -> Result<()> {
    let pool = test_pool().await?;
    let variant_id = seed_variant(&pool, 10, 1899).await?;
    let created = intake::create_order(
        &pool,
        "LW",
        "919876543210",
        request_for(variant_id, 1),
        Utc::now(),
    )
    .await?;

    for status in [
        OrderStatus::Confirmed,
        OrderStatus::Packed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        let (order, _) = lifecycle::advance(&pool, created.order.id, status).await?;
        assert_eq!(order.status, status.as_str());
    }

    // Terminal: nothing further, including cancellation.
    let err = lifecycle::advance(&pool, created.order.id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderServiceError::InvalidTransition { .. }));

    // Skipping a step is rejected too.
    let variant2 = seed_variant(&pool, 5, 999).await?;
    let other = intake::create_order(
        &pool,
        "LW",
        "919876543210",
        request_for(variant2, 1),
        Utc::now(),
    )
    .await?;
    let err = lifecycle::advance(&pool, other.order.id, OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderServiceError::InvalidTransition { .. }));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres via DATABASE_URL"]
async fn reserve_release_round_trip_is_a_noop() -> Result<()> {
    let pool = test_pool().await?;
    let variant_id = seed_variant(&pool, 10, 1899).await?;
    let mut conn = pool.acquire().await?;

    inventory::reserve(&mut conn, variant_id, 4).await?;
    inventory::release(&mut conn, variant_id, 4).await?;
    assert_eq!(counters(&pool, variant_id).await?, (10, 0));

    // Releasing beyond what is reserved clamps reserved_qty at zero rather
    // than driving it negative.
    inventory::release(&mut conn, variant_id, 3).await?;
    let (_, reserved) = counters(&pool, variant_id).await?;
    assert_eq!(reserved, 0);

    inventory::restock(&mut conn, variant_id, 2).await?;
    let (stock, _) = counters(&pool, variant_id).await?;
    assert_eq!(stock, 15);
    Ok(())
}
