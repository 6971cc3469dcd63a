//! Shared test utilities for the canteen gate.
//!
//! This module provides common helper functions for setting up test databases,
//! seeding reference data and building an engine over in-memory stores.

use crate::{
    cache::{MEAL_SLOT_TTL, MealSlotCache, MemoryStore},
    config::AppConfig,
    core::{
        ConsumeEngine, FixedClock,
        ledger::{self, NewOrder},
    },
    entities::{OrderStatus, Period, SysUser, Window, canteen_config, order_record, sys_user},
    errors::{Error, Result},
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Device bound to window A in the default configuration.
pub const DEVICE_A: &str = "0180800116";
/// Device bound to window B in the default configuration.
pub const DEVICE_B: &str = "0127448632";
/// Device bound to window C in the default configuration.
pub const DEVICE_C: &str = "0158577664";

/// Routes `tracing` output to the test harness; repeated calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Configuration used by engine tests: the built-in defaults.
#[must_use]
pub fn test_config() -> AppConfig {
    AppConfig::default()
}

/// Creates a card-holder.
///
/// # Defaults
/// * `nick_name`: `"User {user_id}"`
pub async fn create_test_user(
    db: &DatabaseConnection,
    user_id: i64,
    card_no: &str,
    dept_id: i64,
    count: i32,
) -> Result<sys_user::Model> {
    sys_user::ActiveModel {
        user_id: Set(user_id),
        dept_id: Set(dept_id),
        nick_name: Set(format!("User {user_id}")),
        count: Set(count),
        card_no: Set(card_no.to_string()),
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Remaining entitlement of a card-holder.
pub async fn user_count(db: &DatabaseConnection, user_id: i64) -> Result<i32> {
    SysUser::find_by_id(user_id)
        .one(db)
        .await?
        .map(|user| user.count)
        .ok_or_else(|| Error::CardNotFound {
            card_no: format!("user {user_id}"),
        })
}

/// Makes every later update of a card-holder's count fail inside the
/// database, so the statement after an order write aborts its transaction.
pub async fn block_entitlement_updates(db: &DatabaseConnection) -> Result<()> {
    db.execute_unprepared(
        "CREATE TRIGGER block_count_update BEFORE UPDATE ON sys_user \
         BEGIN SELECT RAISE(ABORT, 'count locked'); END;",
    )
    .await?;
    Ok(())
}

/// Creates a reservation for `date`, created the day before at noon.
pub async fn create_reserved_order(
    db: &DatabaseConnection,
    user_id: i64,
    period: Period,
    date: NaiveDate,
    setmeal_id: i64,
) -> Result<order_record::Model> {
    let created = date
        .pred_opt()
        .unwrap_or(date)
        .and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN));

    ledger::create_order(
        db,
        NewOrder {
            user_id,
            period,
            date,
            setmeal_id: Some(setmeal_id),
            status: OrderStatus::Reserved,
        },
        created,
    )
    .await
}

/// Writes the four dining-policy rows into `canteen_config`.
pub async fn seed_dining_policy(
    db: &DatabaseConnection,
    flexible_dept_ids: &str,
    fixed_dept_ids: &str,
    flexible_start: &str,
    fixed_start: &str,
) -> Result<()> {
    let updated_at = NaiveDateTime::default();
    for (key, value) in [
        ("flexible_dept_id", flexible_dept_ids),
        ("fixed_dept_id", fixed_dept_ids),
        ("flexible_dinner_start_time", flexible_start),
        ("fixed_dinner_start_time", fixed_start),
    ] {
        canteen_config::ActiveModel {
            config_key: Set(key.to_string()),
            config_value: Set(value.to_string()),
            updated_at: Set(updated_at),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

/// Assigns a meal to a window for the day.
pub async fn set_slot(
    store: &MemoryStore,
    date: NaiveDate,
    period: Period,
    window: Window,
    meal_id: i64,
) -> Result<()> {
    MealSlotCache::new(store.clone(), 1)
        .set(date, period, window, meal_id, MEAL_SLOT_TTL)
        .await
}

/// Everything an engine test needs to arrange and inspect a swipe.
pub struct EngineFixture {
    /// Database shared with the engine
    pub db: Arc<DatabaseConnection>,
    /// Cache shared with the engine
    pub store: MemoryStore,
    /// Clock driving the engine
    pub clock: FixedClock,
    /// Engine under test
    pub engine: Arc<ConsumeEngine<MemoryStore>>,
}

/// Sets up a database, an empty cache and an engine whose clock reads `now`.
pub async fn setup_engine(now: NaiveDateTime) -> Result<EngineFixture> {
    let db = Arc::new(setup_test_db().await?);
    let store = MemoryStore::new();
    let clock = FixedClock::new(now);
    let engine = ConsumeEngine::new(
        Arc::clone(&db),
        store.clone(),
        Arc::new(clock.clone()),
        Arc::new(test_config()),
    );

    Ok(EngineFixture {
        db,
        store,
        clock,
        engine: Arc::new(engine),
    })
}
