//! Order ledger and entitlement counter.
//!
//! This module provides the storage operations behind a swipe: looking up the
//! card-holder and the day's order, creating walk-in orders, marking
//! reservations collected and decrementing the remaining entitlement. Every
//! function is generic over `ConnectionTrait` so the engine can run a whole
//! decision inside one `DatabaseTransaction`; the counter is only ever changed
//! with a relative, zero-floored `UPDATE`, never read-modify-write.

use crate::{
    entities::{
        OrderRecord, OrderStatus, Period, SysUser, WeekdayLabel, order_record, sys_user,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::{Set, prelude::*, sea_query::Expr};

/// Week-bucket key for a date: `YYYYMMDD`.
#[must_use]
pub fn week_bucket(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Resolves a card number to its card-holder.
pub async fn find_user_by_card<C>(db: &C, card_no: &str) -> Result<Option<sys_user::Model>>
where
    C: ConnectionTrait,
{
    SysUser::find()
        .filter(sys_user::Column::CardNo.eq(card_no))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds the card-holder's order for a period on a given day.
pub async fn find_order<C>(
    db: &C,
    user_id: i64,
    period: Period,
    date: NaiveDate,
) -> Result<Option<order_record::Model>>
where
    C: ConnectionTrait,
{
    OrderRecord::find()
        .filter(order_record::Column::UserId.eq(user_id))
        .filter(order_record::Column::MealType.eq(period))
        .filter(order_record::Column::WeekNumber.eq(week_bucket(date)))
        .filter(order_record::Column::Weekday.eq(WeekdayLabel::of(date)))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Fields of an order created by the gate or by test fixtures.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Card-holder
    pub user_id: i64,
    /// Meal period
    pub period: Period,
    /// Day the meal is for
    pub date: NaiveDate,
    /// Weekly slot the order is bound to
    pub setmeal_id: Option<i64>,
    /// Initial status
    pub status: OrderStatus,
}

/// Inserts an order row.
pub async fn create_order<C>(
    db: &C,
    order: NewOrder,
    now: NaiveDateTime,
) -> Result<order_record::Model>
where
    C: ConnectionTrait,
{
    let model = order_record::ActiveModel {
        user_id: Set(order.user_id),
        week_number: Set(week_bucket(order.date)),
        order_date: Set(order.date),
        weekday: Set(WeekdayLabel::of(order.date)),
        meal_type: Set(order.period),
        setmeal_id: Set(order.setmeal_id),
        quantity: Set(1),
        status: Set(order.status),
        create_time: Set(now),
        update_time: Set(now),
        ..Default::default()
    };

    model.insert(db).await.map_err(Into::into)
}

/// Records a walk-in meal for today.
pub async fn create_walk_in<C>(
    db: &C,
    user_id: i64,
    period: Period,
    now: NaiveDateTime,
    setmeal_id: i64,
) -> Result<order_record::Model>
where
    C: ConnectionTrait,
{
    create_order(
        db,
        NewOrder {
            user_id,
            period,
            date: now.date(),
            setmeal_id: Some(setmeal_id),
            status: OrderStatus::WalkIn,
        },
        now,
    )
    .await
}

/// Turns an existing row without a usable reservation into the walk-in record,
/// keeping a single row per card-holder, period and day.
pub async fn claim_as_walk_in<C>(
    db: &C,
    order_id: i64,
    period: Period,
    setmeal_id: i64,
    now: NaiveDateTime,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = OrderRecord::update_many()
        .set(order_record::ActiveModel {
            status: Set(OrderStatus::WalkIn),
            setmeal_id: Set(Some(setmeal_id)),
            update_time: Set(now),
            ..Default::default()
        })
        .filter(order_record::Column::Id.eq(order_id))
        .filter(
            order_record::Column::Status
                .is_not_in([OrderStatus::Collected, OrderStatus::WalkIn]),
        )
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::DuplicateSwipe {
            period: period.to_string(),
        });
    }
    Ok(())
}

/// Marks an order collected.
///
/// The update only applies while the order is still unconsumed, so a second
/// collection of the same row reports a duplicate swipe instead of succeeding.
pub async fn mark_collected<C>(db: &C, order_id: i64, period: Period, now: NaiveDateTime) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = OrderRecord::update_many()
        .set(order_record::ActiveModel {
            status: Set(OrderStatus::Collected),
            update_time: Set(now),
            ..Default::default()
        })
        .filter(order_record::Column::Id.eq(order_id))
        .filter(
            order_record::Column::Status
                .is_not_in([OrderStatus::Collected, OrderStatus::WalkIn]),
        )
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::DuplicateSwipe {
            period: period.to_string(),
        });
    }
    Ok(())
}

/// Decrements the card-holder's remaining entitlement by one, floored at zero,
/// and returns the value after the update.
///
/// This performs a single database-level update:
/// `UPDATE sys_user SET count = count - 1 WHERE user_id = ? AND count > 0`
pub async fn decrement_entitlement<C>(db: &C, user_id: i64) -> Result<i32>
where
    C: ConnectionTrait,
{
    SysUser::update_many()
        .col_expr(
            sys_user::Column::Count,
            Expr::col(sys_user::Column::Count).sub(1),
        )
        .filter(sys_user::Column::UserId.eq(user_id))
        .filter(sys_user::Column::Count.gt(0))
        .exec(db)
        .await?;

    let user = SysUser::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::CardNotFound {
            card_no: format!("user {user_id}"),
        })?;
    Ok(user.count)
}

/// Decrements every listed card-holder once, floored at zero. Returns the
/// number of card-holders whose count actually changed.
pub async fn decrement_entitlements<C>(db: &C, user_ids: &[i64]) -> Result<u64>
where
    C: ConnectionTrait,
{
    if user_ids.is_empty() {
        return Ok(0);
    }

    let result = SysUser::update_many()
        .col_expr(
            sys_user::Column::Count,
            Expr::col(sys_user::Column::Count).sub(1),
        )
        .filter(sys_user::Column::UserId.is_in(user_ids.iter().copied()))
        .filter(sys_user::Column::Count.gt(0))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
