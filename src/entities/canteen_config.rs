//! Canteen configuration entity - Key/value reference settings for the canteen.
//! Holds the dining-policy inputs: which departments dine on the flexible or
//! fixed schedule and when each schedule's dinner window opens.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Canteen configuration model - stores key-value configuration pairs
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "canteen_config")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Configuration key (e.g., `"flexible_dept_id"`)
    pub config_key: String,
    /// Configuration value stored as string
    pub config_value: String,
    /// When this configuration was last modified
    pub updated_at: DateTime,
}

/// `CanteenConfig` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
