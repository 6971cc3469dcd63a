//! Weekly generation of next week's meal-slot skeleton.

use crate::{
    core::ledger::week_bucket,
    entities::{SERVED_SLOTS, WeekdayLabel, WeeklySetmeal, weekly_setmeal},
    errors::Result,
};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use sea_orm::{QuerySelect, Set, TransactionTrait, prelude::*};
use tracing::{info, instrument};

/// Serving days per week, Monday through Saturday.
pub const SERVING_DAYS: u64 = 6;

/// Represents the result of generating one week of slots.
#[derive(Debug, Clone)]
pub struct WeeklyGenerationResult {
    /// First generated day (a Monday)
    pub start: NaiveDate,
    /// Last generated day (a Saturday)
    pub end: NaiveDate,
    /// Rows removed from a previous generation of the same week
    pub deleted: u64,
    /// Rows inserted
    pub inserted: usize,
}

/// The Monday strictly after `today`.
#[must_use]
pub fn next_monday(today: NaiveDate) -> NaiveDate {
    let days_ahead = 7 - u64::from(today.weekday().num_days_from_monday());
    today + Days::new(days_ahead)
}

/// Next week's serving days.
#[must_use]
pub fn next_week_dates(today: NaiveDate) -> Vec<NaiveDate> {
    let monday = next_monday(today);
    (0..SERVING_DAYS).map(|offset| monday + Days::new(offset)).collect()
}

/// Replaces next week's slot rows with an unresolved skeleton: three lunch
/// windows and two dinner windows per day.
#[instrument(skip(db))]
pub async fn generate_next_week(
    db: &DatabaseConnection,
    now: NaiveDateTime,
    creator_id: i64,
) -> Result<WeeklyGenerationResult> {
    let dates = next_week_dates(now.date());
    let buckets: Vec<String> = dates.iter().copied().map(week_bucket).collect();

    let rows: Vec<weekly_setmeal::ActiveModel> = dates
        .iter()
        .flat_map(|date| {
            SERVED_SLOTS
                .into_iter()
                .map(move |(period, window)| weekly_setmeal::ActiveModel {
                    week_number: Set(week_bucket(*date)),
                    weekday: Set(WeekdayLabel::of(*date)),
                    meal_type: Set(period),
                    setmeal_id: Set(None),
                    create_time: Set(now),
                    create_user: Set(creator_id),
                    remark: Set(window.remark().to_string()),
                    ..Default::default()
                })
        })
        .collect();
    let inserted = rows.len();

    let txn = db.begin().await?;
    let deleted = WeeklySetmeal::delete_many()
        .filter(weekly_setmeal::Column::WeekNumber.is_in(buckets))
        .exec(&txn)
        .await?;
    WeeklySetmeal::insert_many(rows).exec(&txn).await?;
    txn.commit().await?;

    let (start, end) = (dates[0], dates[dates.len() - 1]);
    info!(
        "Generated {} slots for {} ~ {} (replaced {})",
        inserted, start, end, deleted.rows_affected
    );

    Ok(WeeklyGenerationResult {
        start,
        end,
        deleted: deleted.rows_affected,
        inserted,
    })
}

/// Whether every serving day of next week already has slot rows.
pub async fn is_next_week_generated(db: &DatabaseConnection, today: NaiveDate) -> Result<bool> {
    let buckets: Vec<String> = next_week_dates(today).into_iter().map(week_bucket).collect();

    let present: Vec<String> = WeeklySetmeal::find()
        .select_only()
        .column(weekly_setmeal::Column::WeekNumber)
        .distinct()
        .filter(weekly_setmeal::Column::WeekNumber.is_in(buckets.clone()))
        .into_tuple()
        .all(db)
        .await?;

    Ok(present.len() == buckets.len())
}
