//! Daily meal-slot cache refresh.
//!
//! Every slot row of the day is written under its window's key with the slot
//! row id as value. Afterwards each of the five served (period, window) pairs
//! that received no value gets the default meal id, so lookups for the day
//! never miss. Rows are read as raw columns and mapped one by one; a row with
//! a label outside the known sets is skipped without affecting the others.

use crate::{
    cache::{CacheStore, MEAL_SLOT_TTL, MealSlotCache, slot_key},
    core::ledger::week_bucket,
    entities::{Period, SERVED_SLOTS, Window, WeeklySetmeal, weekly_setmeal},
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::{QuerySelect, prelude::*};
use std::collections::HashSet;
use tracing::{debug, error, info, instrument, warn};

/// Represents the result of one cache refresh.
#[derive(Debug, Clone, Default)]
pub struct CacheRefreshResult {
    /// Keys written from slot rows
    pub written: Vec<String>,
    /// Keys filled with the default meal id
    pub defaulted: Vec<String>,
    /// Slot rows whose period or remark is not recognized
    pub skipped_rows: usize,
    /// Keys that could not be written at all
    pub failed: Vec<String>,
}

async fn load_slot_rows(
    db: &DatabaseConnection,
    today: NaiveDate,
) -> Result<Vec<(i64, String, String)>> {
    WeeklySetmeal::find()
        .select_only()
        .columns([
            weekly_setmeal::Column::Id,
            weekly_setmeal::Column::MealType,
            weekly_setmeal::Column::Remark,
        ])
        .filter(weekly_setmeal::Column::WeekNumber.eq(week_bucket(today)))
        .into_tuple::<(i64, String, String)>()
        .all(db)
        .await
        .map_err(Into::into)
}

async fn fill_defaults<S: CacheStore>(
    slots: &MealSlotCache<S>,
    today: NaiveDate,
    covered: &HashSet<(Period, Window)>,
    result: &mut CacheRefreshResult,
) {
    let default_meal_id = slots.default_meal_id();
    for (period, window) in SERVED_SLOTS {
        if covered.contains(&(period, window)) {
            continue;
        }
        let key = slot_key(today, period, window);
        match slots
            .set(today, period, window, default_meal_id, MEAL_SLOT_TTL)
            .await
        {
            Ok(()) => result.defaulted.push(key),
            Err(e) => {
                warn!("Failed to cache default for {}: {}", key, e);
                result.failed.push(key);
            }
        }
    }
}

/// Populates the meal-slot cache for `today`.
///
/// # Errors
/// Only a failure to read the slot rows is an error, and the defaults for
/// all five served slots are still written before it is returned. Individual
/// cache write failures are logged and reported in the result.
#[instrument(skip(db, slots))]
pub async fn refresh_meal_cache<S: CacheStore>(
    db: &DatabaseConnection,
    slots: &MealSlotCache<S>,
    today: NaiveDate,
) -> Result<CacheRefreshResult> {
    let mut result = CacheRefreshResult::default();
    let mut covered: HashSet<(Period, Window)> = HashSet::new();

    let rows = match load_slot_rows(db, today).await {
        Ok(rows) => rows,
        Err(e) => {
            error!("Reading slot rows for {} failed, writing defaults: {}", today, e);
            fill_defaults(slots, today, &covered, &mut result).await;
            return Err(e);
        }
    };

    for (id, meal_type, remark) in rows {
        let (Ok(period), Ok(window)) = (meal_type.parse::<Period>(), Window::from_remark(&remark))
        else {
            warn!(
                "Slot row {} has unrecognized period {:?} or remark {:?}, skipping",
                id, meal_type, remark
            );
            result.skipped_rows += 1;
            continue;
        };

        let key = slot_key(today, period, window);
        match slots.set(today, period, window, id, MEAL_SLOT_TTL).await {
            Ok(()) => {
                debug!("Cached {} => {}", key, id);
                covered.insert((period, window));
                result.written.push(key);
            }
            Err(e) => warn!("Failed to cache {}: {}", key, e),
        }
    }

    fill_defaults(slots, today, &covered, &mut result).await;

    info!(
        "Meal cache refreshed for {}: {} written, {} defaulted, {} skipped, {} failed",
        today,
        result.written.len(),
        result.defaulted.len(),
        result.skipped_rows,
        result.failed.len()
    );
    Ok(result)
}
