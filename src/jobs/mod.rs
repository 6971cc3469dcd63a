//! Scheduled maintainers.
//!
//! Four independent loops keep the engine's inputs consistent: nightly
//! expiration of unclaimed reservations, weekly generation of next week's
//! slots, the daily meal-slot cache refresh and the daily license check.

/// Nightly reservation expiration
pub mod expire;
/// License artifact verification
pub mod license;
/// Meal-slot cache population
pub mod refresh;
/// Cron rules and the job loop
pub mod schedule;
/// Weekly slot skeleton generation
pub mod weekly;

pub use expire::{ExpirationResult, expire_reserved_orders};
pub use license::{License, validate_license};
pub use refresh::{CacheRefreshResult, refresh_meal_cache};
pub use schedule::{FireSchedule, run_schedule};
pub use weekly::{WeeklyGenerationResult, generate_next_week, is_next_week_generated};

use crate::{
    cache::{CacheStore, MealSlotCache},
    config::AppConfig,
    core::Clock,
    errors::Result,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use std::path::Path;
use std::sync::Arc;

/// Runs every maintainer until one of them fails fatally.
///
/// # Errors
/// An invalid cron rule in the configuration, or the first fatal job error.
pub async fn run_maintainers<S: CacheStore>(
    db: Arc<DatabaseConnection>,
    slots: MealSlotCache<S>,
    clock: Arc<dyn Clock>,
    config: Arc<AppConfig>,
) -> Result<()> {
    let rules = &config.schedule;
    let expire = FireSchedule::parse("expire_orders", &rules.expire_orders)?;
    let weekly = FireSchedule::parse("generate_week", &rules.generate_week)?;
    let refresh = FireSchedule::parse("refresh_meal_cache", &rules.refresh_meal_cache)?;
    let license = FireSchedule::parse("license_check", &rules.license_check)?;

    let db = db.as_ref();
    let slots = &slots;
    let config = &config;

    tokio::try_join!(
        run_schedule(expire, Arc::clone(&clock), move |fire| async move {
            expire_reserved_orders(db, fire).await.map(|_| ())
        }),
        run_schedule(weekly, Arc::clone(&clock), move |fire| async move {
            generate_next_week(db, fire, config.setmeal_creator_id)
                .await
                .map(|_| ())
        }),
        run_schedule(refresh, Arc::clone(&clock), move |fire| async move {
            refresh_meal_cache(db, slots, fire.date()).await.map(|_| ())
        }),
        run_schedule(license, Arc::clone(&clock), move |_| async move {
            validate_license(
                Path::new(&config.license.path),
                &config.license.public_key,
                Utc::now(),
            )
            .map(|_| ())
        }),
    )?;
    Ok(())
}
