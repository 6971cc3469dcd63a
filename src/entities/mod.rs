//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities mirror the canteen tables the swipe gate reads and writes.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod canteen_config;
pub mod enums;
pub mod order_record;
pub mod sys_user;
pub mod weekly_setmeal;

// Re-export specific types to avoid conflicts
pub use canteen_config::{
    Column as CanteenConfigColumn, Entity as CanteenConfig, Model as CanteenConfigModel,
};
pub use enums::{OrderStatus, Period, SERVED_SLOTS, WeekdayLabel, Window};
pub use order_record::{
    Column as OrderRecordColumn, Entity as OrderRecord, Model as OrderRecordModel,
};
pub use sys_user::{Column as SysUserColumn, Entity as SysUser, Model as SysUserModel};
pub use weekly_setmeal::{
    Column as WeeklySetmealColumn, Entity as WeeklySetmeal, Model as WeeklySetmealModel,
};
