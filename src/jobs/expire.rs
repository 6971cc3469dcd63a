//! Nightly expiration of reservations that were never collected.
//!
//! Each unclaimed reservation of the day is marked expired, and expiration
//! consumes one entitlement per distinct owner: an owner with several
//! unclaimed rows loses one meal from the counter, not one per row. The
//! counter is floored at zero.

use crate::{
    core::ledger::{self, week_bucket},
    entities::{OrderRecord, OrderStatus, order_record},
    errors::Result,
};
use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::{QuerySelect, Set, TransactionTrait, prelude::*};
use tracing::{info, instrument};

/// Represents the result of one expiration run.
#[derive(Debug, Clone)]
pub struct ExpirationResult {
    /// Day whose reservations were expired
    pub date: NaiveDate,
    /// Reservations flipped to expired
    pub expired_orders: u64,
    /// Distinct card-holders owning those reservations
    pub affected_users: Vec<i64>,
    /// Card-holders whose counter actually went down (others were at zero)
    pub decremented_users: u64,
}

/// Expires today's unclaimed reservations and decrements each owner once.
///
/// Runs in one transaction: either every row is expired and every counter
/// compensated, or nothing changes.
#[instrument(skip(db))]
pub async fn expire_reserved_orders(
    db: &DatabaseConnection,
    now: NaiveDateTime,
) -> Result<ExpirationResult> {
    let date = now.date();
    let bucket = week_bucket(date);
    let txn = db.begin().await?;

    let affected_users: Vec<i64> = OrderRecord::find()
        .select_only()
        .column(order_record::Column::UserId)
        .distinct()
        .filter(order_record::Column::WeekNumber.eq(bucket.as_str()))
        .filter(order_record::Column::Status.eq(OrderStatus::Reserved))
        .into_tuple()
        .all(&txn)
        .await?;

    let expired = OrderRecord::update_many()
        .set(order_record::ActiveModel {
            status: Set(OrderStatus::Expired),
            update_time: Set(now),
            ..Default::default()
        })
        .filter(order_record::Column::WeekNumber.eq(bucket.as_str()))
        .filter(order_record::Column::Status.eq(OrderStatus::Reserved))
        .exec(&txn)
        .await?;

    let decremented_users = ledger::decrement_entitlements(&txn, &affected_users).await?;
    txn.commit().await?;

    info!(
        "Expired {} reservations for {}, {} card-holders decremented",
        expired.rows_affected, bucket, decremented_users
    );

    Ok(ExpirationResult {
        date,
        expired_orders: expired.rows_affected,
        affected_users,
        decremented_users,
    })
}
