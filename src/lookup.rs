//! Order Lookup Service
//!
//! Retrieval by order number, email, or phone. Phone queries are normalized
//! the same way intake stores them; a pattern-match fallback still finds
//! orders written before normalization existed.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::order::{Order, OrderItem};
use crate::domain::phone::normalize_phone;
use crate::error::Result;

#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

pub async fn find_by_order_number(pool: &PgPool, number: &str) -> Result<Option<OrderWithItems>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = $1")
        .bind(number)
        .fetch_optional(pool)
        .await?;
    match order {
        Some(order) => Ok(with_items(pool, vec![order]).await?.pop()),
        None => Ok(None),
    }
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Vec<OrderWithItems>> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE customer_email = $1 ORDER BY created_at DESC",
    )
    .bind(email)
    .fetch_all(pool)
    .await?;
    with_items(pool, orders).await
}

pub async fn find_by_phone(pool: &PgPool, phone: &str) -> Result<Vec<OrderWithItems>> {
    let normalized = normalize_phone(phone);

    let mut orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE customer_phone = $1 ORDER BY created_at DESC",
    )
    .bind(&normalized)
    .fetch_all(pool)
    .await?;

    // Orders stored before write-time normalization carry raw phone text;
    // match them on the trailing digits.
    if orders.is_empty() && !normalized.is_empty() {
        orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE customer_phone LIKE $1 ORDER BY created_at DESC",
        )
        .bind(format!("%{normalized}"))
        .fetch_all(pool)
        .await?;
    }

    with_items(pool, orders).await
}

async fn with_items(pool: &PgPool, orders: Vec<Order>) -> Result<Vec<OrderWithItems>> {
    if orders.is_empty() {
        return Ok(vec![]);
    }
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut by_order: std::collections::HashMap<Uuid, Vec<OrderItem>> =
        std::collections::HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }

    Ok(orders
        .into_iter()
        .map(|order| {
            let items = by_order.remove(&order.id).unwrap_or_default();
            OrderWithItems { order, items }
        })
        .collect())
}
