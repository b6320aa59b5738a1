//! Lifecycle events published to the message bus when one is configured

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created {
        order_id: Uuid,
        order_number: String,
        total: i64,
    },
    StatusChanged {
        order_id: Uuid,
        order_number: String,
        from: String,
        to: String,
    },
    Cancelled {
        order_id: Uuid,
        order_number: String,
    },
    Deleted {
        order_id: Uuid,
    },
}

impl OrderEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Created { .. } => "orders.created",
            Self::StatusChanged { .. } => "orders.status_changed",
            Self::Cancelled { .. } => "orders.cancelled",
            Self::Deleted { .. } => "orders.deleted",
        }
    }
}
