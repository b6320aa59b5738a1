//! Reservation Expiry Sweeper
//!
//! Reclaims stock held by abandoned checkouts: expired holds go back to the
//! ledger, their rows are deleted, and the still-pending orders they backed
//! are cancelled. The clock is a parameter so expiry behavior is testable
//! without waiting out real TTLs.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::domain::order::Reservation;
use crate::error::Result;
use crate::inventory;

/// Upper bound on holds reclaimed per pass, keeping each transaction's lock
/// footprint small on large reservation tables.
pub const DEFAULT_BATCH_LIMIT: i64 = 500;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub reservations_released: u64,
    pub orders_cancelled: u64,
}

/// One sweep pass. Safe to run concurrently with itself and with intake and
/// lifecycle operations: expired rows are claimed with `FOR UPDATE SKIP
/// LOCKED`, ledger adjustments are relative, and the order cancellation is
/// conditional on the order still being PENDING. Release and cancellation
/// run as separate transactions; lifecycle transitions lock the order row
/// before its reservations, and keeping order locks out of the release
/// transaction means neither writer can wait on the other in a cycle.
pub async fn sweep_expired(
    pool: &PgPool,
    now: DateTime<Utc>,
    batch_limit: i64,
) -> Result<SweepOutcome> {
    let mut tx = pool.begin().await?;

    let expired = sqlx::query_as::<_, Reservation>(
        "SELECT * FROM inventory_reservations \
         WHERE reserved_until < $1 \
         ORDER BY reserved_until \
         LIMIT $2 \
         FOR UPDATE SKIP LOCKED",
    )
    .bind(now)
    .bind(batch_limit)
    .fetch_all(&mut *tx)
    .await?;

    for reservation in &expired {
        inventory::release(&mut tx, reservation.variant_id, reservation.qty).await?;
    }

    let ids: Vec<Uuid> = expired.iter().map(|r| r.id).collect();
    if !ids.is_empty() {
        sqlx::query("DELETE FROM inventory_reservations WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let cancelled = sqlx::query(
        "UPDATE orders SET status = 'CANCELLED' \
         WHERE status = 'PENDING' AND reserved_until < $1",
    )
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(SweepOutcome {
        reservations_released: expired.len() as u64,
        orders_cancelled: cancelled,
    })
}

/// Background runner: one sweep per interval tick, forever.
pub async fn run(pool: PgPool, interval_secs: u64) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match sweep_expired(&pool, Utc::now(), DEFAULT_BATCH_LIMIT).await {
            Ok(outcome)
                if outcome.reservations_released > 0 || outcome.orders_cancelled > 0 =>
            {
                tracing::info!(
                    released = outcome.reservations_released,
                    cancelled = outcome.orders_cancelled,
                    "expired reservations reclaimed"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "reservation sweep failed"),
        }
    }
}
