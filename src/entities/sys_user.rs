//! Card-holder entity - The reference user table owned by user management.
//!
//! The swipe gate only reads card-holders and issues relative decrements of
//! `count`, the remaining meal entitlement.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Card-holder database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sys_user")]
pub struct Model {
    /// Unique identifier for the card-holder
    #[sea_orm(primary_key)]
    pub user_id: i64,
    /// Department the card-holder belongs to
    pub dept_id: i64,
    /// Display name shown and spoken at the terminal
    pub nick_name: String,
    /// Remaining meal entitlement
    pub count: i32,
    /// Physical card number
    pub card_no: String,
}

/// Orders reference `user_id` without a foreign key
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
