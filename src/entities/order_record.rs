//! Order entity - One entitlement-consuming event per card-holder, period and day.
//!
//! At most one row exists per (`user_id`, `meal_type`, `order_date`). Storage
//! does not enforce this; the swipe engine serializes creation per key.
//! `setmeal_id` references the weekly slot row the order is bound to.

use super::enums::{OrderStatus, Period, WeekdayLabel};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_record")]
pub struct Model {
    /// Unique identifier for the order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Card-holder who owns the order
    pub user_id: i64,
    /// Week bucket: the order date as `YYYYMMDD`
    pub week_number: String,
    /// Calendar date the meal is for
    pub order_date: Date,
    /// Weekday label of `order_date`
    pub weekday: WeekdayLabel,
    /// Meal period
    pub meal_type: Period,
    /// Weekly slot the order is bound to, if assigned
    pub setmeal_id: Option<i64>,
    /// Number of meals, always 1 for swipe-created orders
    pub quantity: i32,
    /// Current status
    pub status: OrderStatus,
    /// When the order was created
    pub create_time: DateTime,
    /// When the order was last modified
    pub update_time: DateTime,
}

/// No relations: `sys_user` belongs to the user-management side and carries no
/// foreign key from this table.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
