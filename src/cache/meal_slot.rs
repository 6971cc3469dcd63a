//! Meal-slot cache - which meal each serving window hands out today.
//!
//! Keys look like `20250108-lunch-B`; values are decimal slot ids. Two read
//! paths exist on purpose. [`MealSlotCache::get`] never fails: a miss, an
//! unreadable value or an unreachable store all yield the default meal id,
//! because the worst outcome is a default meal shown on a walk-in order.
//! [`MealSlotCache::get_authoritative`] is used when honouring a reservation
//! and turns every one of those cases into an error instead.

use super::CacheStore;
use crate::entities::{Period, Window};
use crate::errors::{Error, Result};
use chrono::NaiveDate;
use std::time::Duration;
use tracing::{debug, warn};

/// Lifetime of a slot entry: one calendar day.
pub const MEAL_SLOT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache key for a (date, period, window) triple.
#[must_use]
pub fn slot_key(date: NaiveDate, period: Period, window: Window) -> String {
    format!(
        "{}-{}-{}",
        date.format("%Y%m%d"),
        period.cache_label(),
        window.code()
    )
}

/// Typed access to the slot entries of a [`CacheStore`].
#[derive(Debug, Clone)]
pub struct MealSlotCache<S> {
    store: S,
    default_meal_id: i64,
}

impl<S: CacheStore> MealSlotCache<S> {
    /// Wraps a store; `default_meal_id` stands in for unknown assignments.
    #[must_use]
    pub const fn new(store: S, default_meal_id: i64) -> Self {
        Self {
            store,
            default_meal_id,
        }
    }

    /// Meal id reported when no assignment is known.
    #[must_use]
    pub const fn default_meal_id(&self) -> i64 {
        self.default_meal_id
    }

    /// Reads the window's meal, falling back to the default on any failure.
    pub async fn get(&self, date: NaiveDate, period: Period, window: Window) -> i64 {
        let key = slot_key(date, period, window);
        match self.store.get(&key).await {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or_else(|e| {
                warn!("Unparsable meal id {:?} under {}: {}", raw, key, e);
                self.default_meal_id
            }),
            Ok(None) => {
                debug!("Meal slot {} not cached, using default", key);
                self.default_meal_id
            }
            Err(e) => {
                warn!("Meal slot lookup for {} failed, using default: {}", key, e);
                self.default_meal_id
            }
        }
    }

    /// Reads the window's meal; a miss or a store failure is an error.
    pub async fn get_authoritative(
        &self,
        date: NaiveDate,
        period: Period,
        window: Window,
    ) -> Result<i64> {
        let key = slot_key(date, period, window);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                warn!("Meal slot {} missing while checking a reservation", key);
                return Err(Error::WindowConfigUnavailable);
            }
            Err(e) => {
                warn!("Meal slot lookup for {} failed: {}", key, e);
                return Err(Error::WindowConfigUnavailable);
            }
        };

        raw.trim().parse().map_err(|e| Error::SystemConfig {
            detail: format!("meal id {raw:?} under {key} is not a number: {e}"),
        })
    }

    /// Overwrites the window's meal for the day.
    pub async fn set(
        &self,
        date: NaiveDate,
        period: Period,
        window: Window,
        meal_id: i64,
        ttl: Duration,
    ) -> Result<()> {
        let key = slot_key(date, period, window);
        self.store.set_ex(&key, &meal_id.to_string(), ttl).await
    }
}
