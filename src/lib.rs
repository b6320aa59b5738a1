//! Loomworks order service
//!
//! Order intake with inventory reservation and lifecycle management for the
//! Loomworks storefront: turning a cart into a durable order without ever
//! overselling committed stock, reclaiming holds that lapse, and keeping the
//! order state machine consistent with the inventory ledger under concurrent
//! access.

pub mod config;
pub mod domain;
pub mod error;
pub mod intake;
pub mod inventory;
pub mod lifecycle;
pub mod lookup;
pub mod sweeper;
pub mod whatsapp;

use crate::config::Config;
use crate::domain::events::OrderEvent;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub nats: Option<async_nats::Client>,
    pub config: Config,
}

impl AppState {
    /// Fire-and-forget event publish; the bus is optional and never blocks
    /// order processing.
    pub async fn publish_event(&self, event: &OrderEvent) {
        let Some(nats) = &self.nats else { return };
        match serde_json::to_vec(event) {
            Ok(payload) => {
                if let Err(e) = nats
                    .publish(event.subject().to_string(), payload.into())
                    .await
                {
                    tracing::warn!(error = %e, subject = event.subject(), "event publish failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "event serialization failed"),
        }
    }
}
