//! Weekly slot entity - Which meal each serving window offers on a given day.
//!
//! Rows are generated as a skeleton with `setmeal_id` unset; menu planning
//! fills the meal in later. `remark` names the window (`套餐A` and so on).

use super::enums::{Period, WeekdayLabel};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Weekly slot database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "weekly_setmeal")]
pub struct Model {
    /// Slot row id, cached as the window's meal for the day
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Day bucket as `YYYYMMDD`
    pub week_number: String,
    /// Weekday of `week_number`
    pub weekday: WeekdayLabel,
    /// Lunch or dinner
    pub meal_type: Period,
    /// Meal chosen by menu planning, unset until decided
    pub setmeal_id: Option<i64>,
    /// When the skeleton row was generated
    pub create_time: DateTime,
    /// User id recorded as the creator of generated rows
    pub create_user: i64,
    /// Window label text, e.g. `套餐A`
    pub remark: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
