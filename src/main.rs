//! Loomworks Orders - order intake & inventory reservation service

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use loomworks_orders::config::Config;
use loomworks_orders::domain::events::OrderEvent;
use loomworks_orders::domain::order::OrderStatus;
use loomworks_orders::error::OrderServiceError;
use loomworks_orders::{intake, inventory, lifecycle, lookup, AppState, sweeper};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => async_nats::connect(url).await.ok(),
        None => None,
    };

    tokio::spawn(sweeper::run(db.clone(), config.sweep_interval_secs));

    let port = config.port;
    let state = AppState { db, nats, config };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "loomworks-orders"})) }))
        .route("/api/v1/orders", post(create_order).get(lookup_orders).delete(delete_orders))
        .route("/api/v1/orders/:id/status", patch(advance_status))
        .route("/api/v1/variants/:id/restock", post(restock_variant))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!("loomworks-orders listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}

async fn create_order(
    State(s): State<AppState>,
    Json(req): Json<intake::CreateOrderRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), OrderServiceError> {
    let created = intake::create_order(
        &s.db,
        &s.config.order_number_prefix,
        &s.config.whatsapp_number,
        req,
        chrono::Utc::now(),
    )
    .await?;

    s.publish_event(&OrderEvent::Created {
        order_id: created.order.id,
        order_number: created.order.order_number.clone(),
        total: created.order.total,
    })
    .await;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "order": created.order,
            "items": created.items,
            "whatsapp_url": created.whatsapp_url,
        })),
    ))
}

#[derive(Debug, Deserialize)]
struct LookupParams {
    order_number: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

async fn lookup_orders(
    State(s): State<AppState>,
    Query(p): Query<LookupParams>,
) -> Result<Json<serde_json::Value>, OrderServiceError> {
    let supplied = [
        p.order_number.is_some(),
        p.email.is_some(),
        p.phone.is_some(),
    ]
    .into_iter()
    .filter(|&b| b)
    .count();
    if supplied != 1 {
        return Err(OrderServiceError::validation(
            "provide exactly one of order_number, email, phone",
        ));
    }

    // Empty result, not an error, when nothing matches.
    let orders = if let Some(number) = &p.order_number {
        lookup::find_by_order_number(&s.db, number)
            .await?
            .into_iter()
            .collect()
    } else if let Some(email) = &p.email {
        lookup::find_by_email(&s.db, email).await?
    } else if let Some(phone) = &p.phone {
        lookup::find_by_phone(&s.db, phone).await?
    } else {
        vec![]
    };

    Ok(Json(serde_json::json!({ "orders": orders })))
}

#[derive(Debug, Deserialize)]
struct DeleteOrdersRequest {
    order_ids: Vec<Uuid>,
}

async fn delete_orders(
    State(s): State<AppState>,
    Json(req): Json<DeleteOrdersRequest>,
) -> Result<Json<serde_json::Value>, OrderServiceError> {
    if req.order_ids.is_empty() {
        return Err(OrderServiceError::validation("order_ids"));
    }
    let deleted = lifecycle::delete_orders(&s.db, &req.order_ids).await?;
    for &order_id in &req.order_ids {
        s.publish_event(&OrderEvent::Deleted { order_id }).await;
    }
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

#[derive(Debug, Deserialize)]
struct AdvanceStatusRequest {
    status: String,
}

async fn advance_status(
    State(s): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<AdvanceStatusRequest>,
) -> Result<Json<serde_json::Value>, OrderServiceError> {
    let new_status = OrderStatus::parse(&req.status)
        .ok_or_else(|| OrderServiceError::InvalidStatus(req.status.clone()))?;

    let (order, previous) = lifecycle::advance(&s.db, order_id, new_status).await?;

    let event = match new_status {
        OrderStatus::Cancelled => OrderEvent::Cancelled {
            order_id: order.id,
            order_number: order.order_number.clone(),
        },
        _ => OrderEvent::StatusChanged {
            order_id: order.id,
            order_number: order.order_number.clone(),
            from: previous.to_string(),
            to: new_status.to_string(),
        },
    };
    s.publish_event(&event).await;

    Ok(Json(serde_json::json!({ "order": order })))
}

#[derive(Debug, Deserialize)]
struct RestockRequest {
    qty: i32,
}

async fn restock_variant(
    State(s): State<AppState>,
    Path(variant_id): Path<Uuid>,
    Json(req): Json<RestockRequest>,
) -> Result<Json<serde_json::Value>, OrderServiceError> {
    let mut conn = s.db.acquire().await?;
    let variant = inventory::restock(&mut conn, variant_id, req.qty).await?;
    Ok(Json(serde_json::json!({ "variant": variant })))
}
