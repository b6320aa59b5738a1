//! Order Intake Service
//!
//! Turns a checkout request into a durable PENDING order: validation, phone
//! canonicalization, line resolution against the catalog, pricing, and stock
//! reservation. The whole write is one transaction; a line that cannot be
//! reserved rolls back the order, its items and every prior hold.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::domain::order::{Order, OrderItem, ShippingAddress};
use crate::domain::order_number;
use crate::domain::phone::{is_valid_phone, normalize_phone};
use crate::error::{OrderServiceError, Result};
use crate::inventory;
use crate::whatsapp;

/// Orders at or above this subtotal ship free.
pub const FREE_SHIPPING_THRESHOLD: i64 = 1000;
pub const FLAT_SHIPPING_FEE: i64 = 50;
/// How long a checkout holds its stock before the sweeper reclaims it.
pub const RESERVATION_TTL_MINUTES: i64 = 15;
pub const MAX_ITEM_QTY: i32 = 100;

const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 5;

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub variant_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub product_name: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub qty: i32,
    pub unit_price: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 100, message = "customer_name"))]
    pub customer_name: String,
    pub customer_phone: String,
    #[validate(email(message = "customer_email"))]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub shipping_address: ShippingAddress,
    pub items: Vec<OrderItemRequest>,
    pub payment_method: Option<String>,
}

impl CreateOrderRequest {
    /// Collects every offending field so the caller can fix them in one go.
    fn check(&self) -> Result<()> {
        let mut fields: Vec<String> = vec![];

        if let Err(errors) = self.validate() {
            for (_, field_errors) in errors.field_errors() {
                for error in field_errors {
                    fields.push(
                        error
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| error.code.to_string()),
                    );
                }
            }
        }
        if !is_valid_phone(&self.customer_phone) {
            fields.push("customer_phone".into());
        }
        for field in self.shipping_address.missing_fields() {
            fields.push(field.into());
        }
        if self.items.is_empty() {
            fields.push("items".into());
        }
        for (i, item) in self.items.iter().enumerate() {
            if item.qty < 1 || item.qty > MAX_ITEM_QTY {
                fields.push(format!("items[{i}].qty"));
            }
            if item.variant_id.is_none()
                && item.product_id.is_none()
                && item.product_name.as_deref().map_or(true, str::is_empty)
            {
                fields.push(format!("items[{i}].product"));
            }
        }

        if fields.is_empty() {
            Ok(())
        } else {
            fields.sort();
            fields.dedup();
            Err(OrderServiceError::Validation(fields))
        }
    }
}

#[derive(Debug)]
pub struct CreatedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub whatsapp_url: String,
}

#[derive(sqlx::FromRow)]
struct ResolvedVariant {
    id: Uuid,
    product_name: String,
    size: Option<String>,
    color: Option<String>,
    unit_price: i64,
}

/// A request line after catalog resolution and price snapshotting.
struct PricedLine {
    variant_id: Option<Uuid>,
    product_name: String,
    size: Option<String>,
    color: Option<String>,
    qty: i32,
    unit_price: i64,
    line_total: i64,
}

/// Resolve a request line to a concrete variant and its authoritative price.
///
/// An explicit variant id wins. A product id must be disambiguated by size
/// and color; the oldest matching variant is taken so repeated requests
/// resolve identically. `None` means the line carries no inventory effect.
async fn resolve_variant(
    conn: &mut PgConnection,
    item: &OrderItemRequest,
) -> Result<Option<ResolvedVariant>> {
    if let Some(variant_id) = item.variant_id {
        let found = sqlx::query_as::<_, ResolvedVariant>(
            "SELECT v.id, p.name AS product_name, v.size, v.color, \
                    COALESCE(v.price, p.base_price) AS unit_price \
             FROM product_variants v JOIN products p ON p.id = v.product_id \
             WHERE v.id = $1",
        )
        .bind(variant_id)
        .fetch_optional(&mut *conn)
        .await?;
        return Ok(found);
    }

    if let (Some(product_id), Some(size), Some(color)) =
        (item.product_id, item.size.as_deref(), item.color.as_deref())
    {
        let found = sqlx::query_as::<_, ResolvedVariant>(
            "SELECT v.id, p.name AS product_name, v.size, v.color, \
                    COALESCE(v.price, p.base_price) AS unit_price \
             FROM product_variants v JOIN products p ON p.id = v.product_id \
             WHERE v.product_id = $1 AND v.size = $2 AND v.color = $3 \
             ORDER BY v.created_at LIMIT 1",
        )
        .bind(product_id)
        .bind(size)
        .bind(color)
        .fetch_optional(&mut *conn)
        .await?;
        return Ok(found);
    }

    Ok(None)
}

pub async fn create_order(
    pool: &PgPool,
    order_number_prefix: &str,
    store_whatsapp: &str,
    req: CreateOrderRequest,
    now: DateTime<Utc>,
) -> Result<CreatedOrder> {
    req.check()?;

    let mut attempt = 0;
    loop {
        let number = order_number::generate(order_number_prefix, now);
        match try_create(pool, &number, store_whatsapp, &req, now).await {
            Err(e) if is_order_number_collision(&e) && attempt + 1 < MAX_ORDER_NUMBER_ATTEMPTS => {
                attempt += 1;
                tracing::warn!(order_number = %number, "order number collision, retrying");
            }
            other => return other,
        }
    }
}

async fn try_create(
    pool: &PgPool,
    number: &str,
    store_whatsapp: &str,
    req: &CreateOrderRequest,
    now: DateTime<Utc>,
) -> Result<CreatedOrder> {
    let mut tx = pool.begin().await?;

    let mut lines: Vec<PricedLine> = Vec::with_capacity(req.items.len());
    for item in &req.items {
        let line = match resolve_variant(&mut tx, item).await? {
            Some(variant) => PricedLine {
                variant_id: Some(variant.id),
                product_name: variant.product_name,
                size: variant.size,
                color: variant.color,
                qty: item.qty,
                unit_price: variant.unit_price,
                line_total: variant.unit_price * i64::from(item.qty),
            },
            // Accepted without a variant: recorded on the order but excluded
            // from any inventory effect.
            None => {
                let unit_price = item.unit_price.unwrap_or(0);
                PricedLine {
                    variant_id: None,
                    product_name: item.product_name.clone().unwrap_or_default(),
                    size: item.size.clone(),
                    color: item.color.clone(),
                    qty: item.qty,
                    unit_price,
                    line_total: unit_price * i64::from(item.qty),
                }
            }
        };
        lines.push(line);
    }

    let subtotal: i64 = lines.iter().map(|l| l.line_total).sum();
    let shipping = if subtotal >= FREE_SHIPPING_THRESHOLD {
        0
    } else {
        FLAT_SHIPPING_FEE
    };
    let total = subtotal + shipping;
    let payment_method = req.payment_method.clone().unwrap_or_else(|| "COD".to_string());
    let reserved_until = now + Duration::minutes(RESERVATION_TTL_MINUTES);
    let normalized_phone = normalize_phone(&req.customer_phone);

    let message_lines: Vec<whatsapp::MessageLine<'_>> = lines
        .iter()
        .map(|l| whatsapp::MessageLine {
            product_name: &l.product_name,
            size: l.size.as_deref(),
            color: l.color.as_deref(),
            qty: l.qty,
            line_total: l.line_total,
        })
        .collect();
    let message = whatsapp::render_order_message(
        number,
        &req.customer_name,
        &normalized_phone,
        &req.shipping_address,
        &message_lines,
        total,
        &payment_method,
    );

    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (id, order_number, customer_name, customer_phone, customer_email, \
                             shipping_address, subtotal, shipping, total, payment_method, status, \
                             whatsapp_message, reserved_until, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'PENDING', $11, $12, $13) \
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(number)
    .bind(&req.customer_name)
    .bind(&normalized_phone)
    .bind(&req.customer_email)
    .bind(Json(&req.shipping_address))
    .bind(subtotal)
    .bind(shipping)
    .bind(total)
    .bind(&payment_method)
    .bind(&message)
    .bind(reserved_until)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(lines.len());
    for line in &lines {
        let item = sqlx::query_as::<_, OrderItem>(
            "INSERT INTO order_items (id, order_id, variant_id, product_name, size, color, \
                                      qty, unit_price, line_total) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(line.variant_id)
        .bind(&line.product_name)
        .bind(&line.size)
        .bind(&line.color)
        .bind(line.qty)
        .bind(line.unit_price)
        .bind(line.line_total)
        .fetch_one(&mut *tx)
        .await?;
        items.push(item);
    }

    for line in &lines {
        let Some(variant_id) = line.variant_id else {
            continue;
        };
        inventory::reserve(&mut tx, variant_id, line.qty).await?;
        // Two lines resolving to the same variant fold into one hold.
        sqlx::query(
            "INSERT INTO inventory_reservations (id, variant_id, order_id, qty, reserved_at, reserved_until) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (order_id, variant_id) \
             DO UPDATE SET qty = inventory_reservations.qty + EXCLUDED.qty",
        )
        .bind(Uuid::new_v4())
        .bind(variant_id)
        .bind(order.id)
        .bind(line.qty)
        .bind(now)
        .bind(reserved_until)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let whatsapp_url = whatsapp::order_deep_link(store_whatsapp, &message);
    Ok(CreatedOrder {
        order,
        items,
        whatsapp_url,
    })
}

fn is_order_number_collision(error: &OrderServiceError) -> bool {
    match error {
        OrderServiceError::Database(sqlx::Error::Database(db)) => {
            db.constraint() == Some("orders_order_number_key")
        }
        _ => false,
    }
}
