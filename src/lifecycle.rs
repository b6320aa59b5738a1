//! Order Lifecycle Manager
//!
//! Admin-driven status transitions and hard deletion, with the ledger
//! reconciliation each implies. All writes run inside a transaction with the
//! order row locked, and the status update itself is conditional, so two
//! concurrent transitions cannot both apply their side effects.

use std::collections::HashMap;

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::order::{Order, OrderStatus};
use crate::error::{OrderServiceError, Result};
use crate::inventory;

/// Apply `new_status` to an order, enforcing the state machine.
///
/// CONFIRMED consumes the order's holds (the stock is committed; the timer
/// is cleared so the sweeper leaves the order alone). CANCELLED releases
/// whatever holds are still live. Every other transition touches nothing but
/// the status column. Returns the updated order and the status it left.
pub async fn advance(
    pool: &PgPool,
    order_id: Uuid,
    new_status: OrderStatus,
) -> Result<(Order, OrderStatus)> {
    let mut tx = pool.begin().await?;

    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(OrderServiceError::NotFound("order"))?;

    let current = order
        .status()
        .ok_or_else(|| OrderServiceError::InvalidStatus(order.status.clone()))?;
    if !current.can_transition_to(new_status) {
        return Err(OrderServiceError::InvalidTransition {
            from: current.to_string(),
            to: new_status.to_string(),
        });
    }

    let updated = sqlx::query_as::<_, Order>(
        "UPDATE orders \
         SET status = $2, \
             reserved_until = CASE WHEN $2 = 'CONFIRMED' THEN NULL ELSE reserved_until END \
         WHERE id = $1 AND status = $3 \
         RETURNING *",
    )
    .bind(order_id)
    .bind(new_status.as_str())
    .bind(current.as_str())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| OrderServiceError::InvalidTransition {
        from: current.to_string(),
        to: new_status.to_string(),
    })?;

    match new_status {
        OrderStatus::Confirmed => {
            for (variant_id, qty) in take_reservations(&mut tx, order_id).await? {
                inventory::consume(&mut tx, variant_id, qty).await?;
            }
        }
        OrderStatus::Cancelled => {
            for (variant_id, qty) in take_reservations(&mut tx, order_id).await? {
                inventory::release(&mut tx, variant_id, qty).await?;
            }
        }
        _ => {}
    }

    tx.commit().await?;
    tracing::info!(
        order_number = %updated.order_number,
        from = %current,
        to = %new_status,
        "order status advanced"
    );
    Ok((updated, current))
}

/// Remove the order's reservation rows, handing back what they held.
async fn take_reservations(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> Result<Vec<(Uuid, i32)>> {
    let rows: Vec<(Uuid, i32)> = sqlx::query_as(
        "DELETE FROM inventory_reservations WHERE order_id = $1 RETURNING variant_id, qty",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Hard-delete orders, restoring inventory first. Returns how many orders
/// were actually removed; unknown ids are skipped, not errors.
pub async fn delete_orders(pool: &PgPool, order_ids: &[Uuid]) -> Result<u64> {
    let mut deleted = 0u64;
    for &order_id in order_ids {
        if delete_one(pool, order_id).await? {
            deleted += 1;
        }
    }
    Ok(deleted)
}

async fn delete_one(pool: &PgPool, order_id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(order) = order else {
        return Ok(false);
    };

    let live: HashMap<Uuid, i32> = take_reservations(&mut tx, order_id)
        .await?
        .into_iter()
        .collect();

    // A cancelled order already gave its stock back; anything else still
    // owes the ledger. Live holds are released; holds consumed at CONFIRMED
    // come back as plain restock.
    if order.status() != Some(OrderStatus::Cancelled) {
        for (&variant_id, &qty) in &live {
            inventory::release(&mut tx, variant_id, qty).await?;
        }
        let items: Vec<(Option<Uuid>, i32)> =
            sqlx::query_as("SELECT variant_id, qty FROM order_items WHERE order_id = $1")
                .bind(order_id)
                .fetch_all(&mut *tx)
                .await?;
        let mut consumed: HashMap<Uuid, i32> = HashMap::new();
        for (variant_id, qty) in items {
            if let Some(variant_id) = variant_id {
                if !live.contains_key(&variant_id) {
                    *consumed.entry(variant_id).or_insert(0) += qty;
                }
            }
        }
        for (variant_id, qty) in consumed {
            inventory::restock(&mut tx, variant_id, qty).await?;
        }
    }

    sqlx::query("DELETE FROM order_items WHERE order_id = $1")
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!(order_number = %order.order_number, "order deleted, inventory restored");
    Ok(true)
}
