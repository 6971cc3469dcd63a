//! Per-(card-holder, period, date) mutual exclusion for swipes.
//!
//! The order lookup and the status/counter writes that follow it must not
//! interleave for the same key, or two near-simultaneous swipes of one card
//! can both pass the duplicate check. Swipes for different keys never wait on
//! each other.

use crate::entities::Period;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Identity of the order a swipe may create or consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwipeKey {
    /// Card-holder
    pub user_id: i64,
    /// Meal period
    pub period: Period,
    /// Calendar day
    pub date: NaiveDate,
}

/// Held for the duration of a swipe; releases the key on drop.
#[derive(Debug)]
pub struct SwipeGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Table of per-key async mutexes. Idle entries are pruned on acquire.
#[derive(Debug, Default)]
pub struct SwipeLocks {
    slots: Mutex<HashMap<SwipeKey, Arc<AsyncMutex<()>>>>,
}

impl SwipeLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other swipe holds `key`.
    pub async fn acquire(&self, key: SwipeKey) -> SwipeGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Only the table itself references an idle slot
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry(key).or_default())
        };
        SwipeGuard {
            _guard: slot.lock_owned().await,
        }
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
