//! Inventory Ledger
//!
//! Owns the `stock_qty` / `reserved_qty` counters. Every writer goes through
//! the relative adjustments below; nothing else mutates the pair, so the
//! invariant `stock_qty + reserved_qty == physical stock` is enforced in one
//! place. Each operation is a single conditional UPDATE: correct under
//! concurrent checkouts from any number of processes.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::order::ProductVariant;
use crate::error::{OrderServiceError, Result};

fn ensure_positive(qty: i32) -> Result<()> {
    if qty <= 0 {
        return Err(OrderServiceError::validation("qty must be positive"));
    }
    Ok(())
}

/// Move `qty` units from available to reserved. Strict policy: the decrement
/// is bounded by the WHERE clause, so a request beyond the available stock
/// fails with `InsufficientStock` instead of clamping.
pub async fn reserve(conn: &mut PgConnection, variant_id: Uuid, qty: i32) -> Result<()> {
    ensure_positive(qty)?;
    let result = sqlx::query(
        "UPDATE product_variants \
         SET stock_qty = stock_qty - $2, reserved_qty = reserved_qty + $2 \
         WHERE id = $1 AND stock_qty >= $2",
    )
    .bind(variant_id)
    .bind(qty)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let exists: Option<(i32,)> =
            sqlx::query_as("SELECT stock_qty FROM product_variants WHERE id = $1")
                .bind(variant_id)
                .fetch_optional(&mut *conn)
                .await?;
        return Err(match exists {
            Some(_) => OrderServiceError::InsufficientStock {
                variant_id,
                requested: qty,
            },
            None => OrderServiceError::NotFound("variant"),
        });
    }
    Ok(())
}

/// Return `qty` units from reserved to available. `reserved_qty` floors at
/// zero so a stray double-release cannot drive it negative.
pub async fn release(conn: &mut PgConnection, variant_id: Uuid, qty: i32) -> Result<()> {
    ensure_positive(qty)?;
    sqlx::query(
        "UPDATE product_variants \
         SET stock_qty = stock_qty + $2, reserved_qty = GREATEST(reserved_qty - $2, 0) \
         WHERE id = $1",
    )
    .bind(variant_id)
    .bind(qty)
    .execute(conn)
    .await?;
    Ok(())
}

/// Fulfillment-consumption: the held units leave the ledger entirely when an
/// order is confirmed. `stock_qty` is untouched.
pub async fn consume(conn: &mut PgConnection, variant_id: Uuid, qty: i32) -> Result<()> {
    ensure_positive(qty)?;
    sqlx::query(
        "UPDATE product_variants \
         SET reserved_qty = GREATEST(reserved_qty - $2, 0) \
         WHERE id = $1",
    )
    .bind(variant_id)
    .bind(qty)
    .execute(conn)
    .await?;
    Ok(())
}

/// Admin restock: adds to available stock only. Returns the updated counters.
pub async fn restock(conn: &mut PgConnection, variant_id: Uuid, qty: i32) -> Result<ProductVariant> {
    ensure_positive(qty)?;
    sqlx::query_as::<_, ProductVariant>(
        "UPDATE product_variants SET stock_qty = stock_qty + $2 WHERE id = $1 RETURNING *",
    )
    .bind(variant_id)
    .bind(qty)
    .fetch_optional(conn)
    .await?
    .ok_or(OrderServiceError::NotFound("variant"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_quantities_rejected() {
        assert!(ensure_positive(0).is_err());
        assert!(ensure_positive(-3).is_err());
        assert!(ensure_positive(1).is_ok());
    }
}
