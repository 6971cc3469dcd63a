//! Swipe authorization.
//!
//! [`ConsumeEngine::consume`] decides whether a card may collect a meal at a
//! window and records the outcome. The decision runs in this order:
//!
//! 1. resolve the card to its card-holder;
//! 2. classify the period from the local hour;
//! 3. privileged departments dine as walk-ins without any further check;
//! 4. dinner is gated by the department's dining policy;
//! 5. look up the day's order for the card-holder and period;
//! 6. no usable reservation means a walk-in;
//! 7. an order already consumed is a duplicate swipe;
//! 8. a reservation must be collected at the window serving its meal,
//!    except on Saturday;
//! 9. the order is marked collected and the entitlement decremented.
//!
//! Steps 5 to 9 hold the per-key swipe lock and run in one database
//! transaction. The privileged path also commits its insert and decrement
//! together. A response is only built from committed state.

use crate::{
    cache::{CacheStore, DiningPolicyCache, MealSlotCache},
    config::AppConfig,
    core::{
        clock::Clock,
        ledger,
        lock::{SwipeKey, SwipeLocks},
    },
    entities::{OrderStatus, Period, Window, order_record, sys_user},
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Voice prompt the terminals play on success.
pub const SUCCESS_VOICE_ID: &str = "核销成功";

/// A swipe as reported by a terminal.
#[derive(Debug, Clone, Default)]
pub struct SwipeRequest {
    /// Card number read by the terminal
    pub card_no: String,
    /// Amount shown on the terminal, echoed back untouched
    pub amount: String,
}

/// How a successful swipe was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Privileged department, walk-in without checks
    Privileged,
    /// No reservation, walk-in order recorded
    WalkIn,
    /// Reservation collected
    Collected,
}

/// Committed result of a successful swipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeOutcome {
    /// Short status line for the terminal
    pub message: String,
    /// Card-holder display name
    pub name: String,
    /// Card number as swiped
    pub card_no: String,
    /// Entitlement left after this swipe
    pub remaining: i32,
    /// Echoed amount
    pub amount: String,
    /// Voice prompt id
    pub voice_id: String,
    /// Text the terminal speaks
    pub text: String,
    /// Period the meal was counted against
    pub period: Period,
    /// Order row written by the swipe
    pub order_id: i64,
    /// Which branch recorded it
    pub kind: OutcomeKind,
}

/// Authorizes swipes against the ledger, the counter and both caches.
pub struct ConsumeEngine<S> {
    db: Arc<DatabaseConnection>,
    slots: MealSlotCache<S>,
    policy: DiningPolicyCache<S>,
    clock: Arc<dyn Clock>,
    locks: SwipeLocks,
    config: Arc<AppConfig>,
}

impl<S: CacheStore + Clone> ConsumeEngine<S> {
    /// Builds an engine over long-lived store handles.
    pub fn new(
        db: Arc<DatabaseConnection>,
        store: S,
        clock: Arc<dyn Clock>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            slots: MealSlotCache::new(store.clone(), config.default_meal_id),
            policy: DiningPolicyCache::new(store, Arc::clone(&db)),
            db,
            clock,
            locks: SwipeLocks::new(),
            config,
        }
    }
}

impl<S: CacheStore> ConsumeEngine<S> {
    /// Current local time as seen by the engine.
    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Authorizes one swipe from `device_id`.
    ///
    /// # Errors
    /// A rejection (see [`Error::is_rejection`]) when the swipe is not
    /// allowed, `Error::Timeout` when the request deadline passes, or a storage
    /// error. In every error case nothing has been committed.
    #[instrument(skip(self, request), fields(card_no = %request.card_no))]
    pub async fn consume(&self, request: &SwipeRequest, device_id: &str) -> Result<ConsumeOutcome> {
        let deadline = self.config.request_timeout();
        match tokio::time::timeout(deadline, self.authorize(request, device_id)).await {
            Ok(Ok(outcome)) => {
                info!(
                    "{} collected {} ({:?}), {} left",
                    outcome.name, outcome.period, outcome.kind, outcome.remaining
                );
                Ok(outcome)
            }
            Ok(Err(e)) => {
                if e.is_rejection() {
                    info!("Swipe rejected: {}", e);
                } else {
                    warn!("Swipe failed: {}", e);
                }
                Err(e)
            }
            Err(_) => {
                warn!("Swipe abandoned after {:?}", deadline);
                Err(Error::Timeout)
            }
        }
    }

    async fn authorize(&self, request: &SwipeRequest, device_id: &str) -> Result<ConsumeOutcome> {
        let now = self.clock.now();
        let today = now.date();

        let user = ledger::find_user_by_card(self.db.as_ref(), &request.card_no)
            .await?
            .ok_or_else(|| Error::CardNotFound {
                card_no: request.card_no.clone(),
            })?;
        let period = Period::at(now.time());
        debug!(
            "Card-holder {} (dept {}) swiping for {}",
            user.user_id, user.dept_id, period
        );

        if self.config.is_privileged(user.dept_id) {
            let meal_id = self.walk_in_meal(today, period, device_id).await;
            let txn = self.db.begin().await?;
            let order = ledger::create_walk_in(&txn, user.user_id, period, now, meal_id).await?;
            let remaining = ledger::decrement_entitlement(&txn, user.user_id).await?;
            txn.commit().await?;
            return Ok(outcome(&user, request, period, order.id, remaining, OutcomeKind::Privileged));
        }

        if period == Period::Dinner {
            self.policy.check_dinner_allowed(user.dept_id, now).await?;
        }

        let _guard = self
            .locks
            .acquire(SwipeKey {
                user_id: user.user_id,
                period,
                date: today,
            })
            .await;
        let txn = self.db.begin().await?;

        let (order_id, kind) = match ledger::find_order(&txn, user.user_id, period, today).await? {
            Some(order) if order.status.is_consumed() => {
                return Err(Error::DuplicateSwipe {
                    period: period.to_string(),
                });
            }
            Some(order) if has_reservation(&order) => {
                self.check_window(&order, device_id, period, today).await?;
                ledger::mark_collected(&txn, order.id, period, now).await?;
                (order.id, OutcomeKind::Collected)
            }
            existing => {
                let order_id = self
                    .record_walk_in(&txn, &user, existing, period, now, device_id)
                    .await?;
                (order_id, OutcomeKind::WalkIn)
            }
        };

        let remaining = ledger::decrement_entitlement(&txn, user.user_id).await?;
        txn.commit().await?;

        Ok(outcome(&user, request, period, order_id, remaining, kind))
    }

    async fn record_walk_in(
        &self,
        txn: &DatabaseTransaction,
        user: &sys_user::Model,
        existing: Option<order_record::Model>,
        period: Period,
        now: NaiveDateTime,
        device_id: &str,
    ) -> Result<i64> {
        let meal_id = self.walk_in_meal(now.date(), period, device_id).await;
        match existing {
            Some(order) => {
                debug!("Order {} has no usable reservation, claiming it as walk-in", order.id);
                ledger::claim_as_walk_in(txn, order.id, period, meal_id, now).await?;
                Ok(order.id)
            }
            None => {
                let order = ledger::create_walk_in(txn, user.user_id, period, now, meal_id).await?;
                Ok(order.id)
            }
        }
    }

    /// Meal shown on a walk-in order; unmapped devices count as window A.
    async fn walk_in_meal(&self, date: NaiveDate, period: Period, device_id: &str) -> i64 {
        let window = self.config.window_for_device(device_id).unwrap_or(Window::A);
        self.slots.get(date, period, window).await
    }

    async fn check_window(
        &self,
        order: &order_record::Model,
        device_id: &str,
        period: Period,
        today: NaiveDate,
    ) -> Result<()> {
        let window = self
            .config
            .window_for_device(device_id)
            .ok_or_else(|| Error::UnknownDevice {
                device_id: device_id.to_string(),
            })?;

        if today.weekday() == Weekday::Sat {
            debug!("Saturday, any window serves order {}", order.id);
            return Ok(());
        }

        let served = self.slots.get_authoritative(today, period, window).await?;
        let reserved = order.setmeal_id.unwrap_or_default();
        if served != reserved {
            return Err(Error::WrongWindow { reserved, served });
        }
        Ok(())
    }
}

fn has_reservation(order: &order_record::Model) -> bool {
    order.status != OrderStatus::Unset && order.setmeal_id.is_some_and(|id| id != 0)
}

fn outcome(
    user: &sys_user::Model,
    request: &SwipeRequest,
    period: Period,
    order_id: i64,
    remaining: i32,
    kind: OutcomeKind,
) -> ConsumeOutcome {
    ConsumeOutcome {
        message: format!("consumed: {period}"),
        name: user.nick_name.clone(),
        card_no: request.card_no.clone(),
        remaining,
        amount: request.amount.clone(),
        voice_id: SUCCESS_VOICE_ID.to_string(),
        text: format!("{}: {period} consumed", user.nick_name),
        period,
        order_id,
        kind,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::cache::{MEAL_SLOT_TTL, MemoryStore};
    use crate::core::clock::FixedClock;
    use crate::entities::{OrderRecord, WeekdayLabel};
    use crate::test_utils::*;
    use sea_orm::{EntityTrait, PaginatorTrait};
    use std::collections::HashMap;
    use std::time::Duration;

    fn wednesday_at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 8)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn saturday_at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 11)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn swipe(card_no: &str) -> SwipeRequest {
        SwipeRequest {
            card_no: card_no.to_string(),
            amount: "0.00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unknown_card_is_rejected() -> Result<()> {
        let fx = setup_engine(wednesday_at(12, 0)).await?;

        let result = fx.engine.consume(&swipe("9999"), DEVICE_A).await;
        assert!(matches!(result, Err(Error::CardNotFound { .. })));
        assert_eq!(OrderRecord::find().count(fx.db.as_ref()).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_first_swipe_without_order_is_walk_in() -> Result<()> {
        init_test_tracing();
        let fx = setup_engine(wednesday_at(12, 0)).await?;
        create_test_user(&fx.db, 1, "2001", 10, 5).await?;
        set_slot(&fx.store, wednesday_at(12, 0).date(), Period::Lunch, Window::C, 31).await?;

        let outcome = fx.engine.consume(&swipe("2001"), DEVICE_C).await?;

        assert_eq!(outcome.kind, OutcomeKind::WalkIn);
        assert_eq!(outcome.remaining, 4);
        assert_eq!(outcome.message, "consumed: lunch");
        assert_eq!(outcome.text, "User 1: lunch consumed");
        assert_eq!(user_count(&fx.db, 1).await?, 4);

        let order = OrderRecord::find_by_id(outcome.order_id)
            .one(fx.db.as_ref())
            .await?
            .unwrap();
        assert_eq!(order.status, OrderStatus::WalkIn);
        assert_eq!(order.setmeal_id, Some(31));
        Ok(())
    }

    #[tokio::test]
    async fn test_second_swipe_is_duplicate_and_leaves_counter() -> Result<()> {
        let fx = setup_engine(wednesday_at(12, 0)).await?;
        create_test_user(&fx.db, 1, "2001", 10, 5).await?;

        fx.engine.consume(&swipe("2001"), DEVICE_A).await?;
        let second = fx.engine.consume(&swipe("2001"), DEVICE_A).await;

        match second {
            Err(Error::DuplicateSwipe { period }) => assert_eq!(period, "lunch"),
            other => panic!("expected duplicate swipe, got {other:?}"),
        }
        assert_eq!(user_count(&fx.db, 1).await?, 4);
        assert_eq!(OrderRecord::find().count(fx.db.as_ref()).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_reserved_order_collected_at_correct_window() -> Result<()> {
        let now = wednesday_at(12, 30);
        let fx = setup_engine(now).await?;
        create_test_user(&fx.db, 1, "2001", 10, 5).await?;
        let order = create_reserved_order(&fx.db, 1, Period::Lunch, now.date(), 21).await?;
        set_slot(&fx.store, now.date(), Period::Lunch, Window::B, 21).await?;

        let outcome = fx.engine.consume(&swipe("2001"), DEVICE_B).await?;

        assert_eq!(outcome.kind, OutcomeKind::Collected);
        assert_eq!(outcome.order_id, order.id);
        assert_eq!(outcome.remaining, 4);
        let stored = OrderRecord::find_by_id(order.id).one(fx.db.as_ref()).await?.unwrap();
        assert_eq!(stored.status, OrderStatus::Collected);
        assert_eq!(stored.update_time, now);
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_window_rejected_on_weekdays() -> Result<()> {
        let now = wednesday_at(12, 30);
        let fx = setup_engine(now).await?;
        create_test_user(&fx.db, 1, "2001", 10, 5).await?;
        let order = create_reserved_order(&fx.db, 1, Period::Lunch, now.date(), 21).await?;
        set_slot(&fx.store, now.date(), Period::Lunch, Window::A, 22).await?;

        let result = fx.engine.consume(&swipe("2001"), DEVICE_A).await;

        assert!(matches!(
            result,
            Err(Error::WrongWindow {
                reserved: 21,
                served: 22
            })
        ));
        assert_eq!(user_count(&fx.db, 1).await?, 5);
        let stored = OrderRecord::find_by_id(order.id).one(fx.db.as_ref()).await?.unwrap();
        assert_eq!(stored.status, OrderStatus::Reserved);
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_window_allowed_on_saturday() -> Result<()> {
        let now = saturday_at(12, 30);
        let fx = setup_engine(now).await?;
        create_test_user(&fx.db, 1, "2001", 10, 5).await?;
        create_reserved_order(&fx.db, 1, Period::Lunch, now.date(), 21).await?;
        set_slot(&fx.store, now.date(), Period::Lunch, Window::A, 22).await?;

        let outcome = fx.engine.consume(&swipe("2001"), DEVICE_A).await?;
        assert_eq!(outcome.kind, OutcomeKind::Collected);
        assert_eq!(user_count(&fx.db, 1).await?, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_reservation_at_unknown_device_rejected_even_on_saturday() -> Result<()> {
        let now = saturday_at(12, 30);
        let fx = setup_engine(now).await?;
        create_test_user(&fx.db, 1, "2001", 10, 5).await?;
        create_reserved_order(&fx.db, 1, Period::Lunch, now.date(), 21).await?;

        let result = fx.engine.consume(&swipe("2001"), "no-such-device").await;
        assert!(matches!(result, Err(Error::UnknownDevice { .. })));
        assert_eq!(user_count(&fx.db, 1).await?, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_window_cache_failure_is_hard_failure() -> Result<()> {
        let now = wednesday_at(12, 30);
        let fx = setup_engine(now).await?;
        create_test_user(&fx.db, 1, "2001", 10, 5).await?;
        let order = create_reserved_order(&fx.db, 1, Period::Lunch, now.date(), 21).await?;
        set_slot(&fx.store, now.date(), Period::Lunch, Window::B, 21).await?;
        fx.store.set_unavailable(true).await;

        let result = fx.engine.consume(&swipe("2001"), DEVICE_B).await;
        assert!(matches!(result, Err(Error::WindowConfigUnavailable)));

        let stored = OrderRecord::find_by_id(order.id).one(fx.db.as_ref()).await?.unwrap();
        assert_eq!(stored.status, OrderStatus::Reserved);
        assert_eq!(user_count(&fx.db, 1).await?, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_window_assignment_is_hard_failure() -> Result<()> {
        let now = wednesday_at(12, 30);
        let fx = setup_engine(now).await?;
        create_test_user(&fx.db, 1, "2001", 10, 5).await?;
        create_reserved_order(&fx.db, 1, Period::Lunch, now.date(), 21).await?;

        let result = fx.engine.consume(&swipe("2001"), DEVICE_B).await;
        assert!(matches!(result, Err(Error::WindowConfigUnavailable)));
        Ok(())
    }

    #[tokio::test]
    async fn test_unreserved_row_is_claimed_not_duplicated() -> Result<()> {
        let now = wednesday_at(12, 0);
        let fx = setup_engine(now).await?;
        create_test_user(&fx.db, 1, "2001", 10, 5).await?;
        let blank = ledger::create_order(
            fx.db.as_ref(),
            ledger::NewOrder {
                user_id: 1,
                period: Period::Lunch,
                date: now.date(),
                setmeal_id: None,
                status: OrderStatus::Reserved,
            },
            now,
        )
        .await?;

        let outcome = fx.engine.consume(&swipe("2001"), DEVICE_A).await?;
        assert_eq!(outcome.kind, OutcomeKind::WalkIn);
        assert_eq!(outcome.order_id, blank.id);
        assert_eq!(OrderRecord::find().count(fx.db.as_ref()).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unconfigured_department_rejected_at_dinner() -> Result<()> {
        let fx = setup_engine(wednesday_at(18, 0)).await?;
        seed_dining_policy(&fx.db, "101", "201", "17:00", "18:00").await?;
        create_test_user(&fx.db, 1, "2001", 999, 5).await?;

        for (h, m) in [(6, 0), (18, 0), (20, 59), (23, 30)] {
            fx.clock.set(wednesday_at(h, m));
            let result = fx.engine.consume(&swipe("2001"), DEVICE_A).await;
            assert!(matches!(result, Err(Error::NoDiningPolicy { dept_id: 999 })));
        }
        assert_eq!(user_count(&fx.db, 1).await?, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_dinner_outside_window_rejected() -> Result<()> {
        let fx = setup_engine(wednesday_at(17, 30)).await?;
        seed_dining_policy(&fx.db, "101", "201", "17:00", "18:00").await?;
        create_test_user(&fx.db, 1, "2001", 201, 5).await?;

        let early = fx.engine.consume(&swipe("2001"), DEVICE_A).await;
        assert!(matches!(early, Err(Error::OutsideDiningHours)));

        fx.clock.set(wednesday_at(18, 15));
        let outcome = fx.engine.consume(&swipe("2001"), DEVICE_A).await?;
        assert_eq!(outcome.period, Period::Dinner);
        Ok(())
    }

    #[tokio::test]
    async fn test_lunch_is_not_policy_gated() -> Result<()> {
        // No dining policy seeded at all
        let fx = setup_engine(wednesday_at(11, 0)).await?;
        create_test_user(&fx.db, 1, "2001", 999, 5).await?;

        let outcome = fx.engine.consume(&swipe("2001"), DEVICE_A).await?;
        assert_eq!(outcome.period, Period::Lunch);
        Ok(())
    }

    #[tokio::test]
    async fn test_privileged_department_walk_in() -> Result<()> {
        let now = wednesday_at(12, 0);
        let fx = setup_engine(now).await?;
        create_test_user(&fx.db, 7, "1001", 219, 3).await?;
        set_slot(&fx.store, now.date(), Period::Lunch, Window::B, 17).await?;

        let outcome = fx.engine.consume(&swipe("1001"), DEVICE_B).await?;

        assert_eq!(outcome.kind, OutcomeKind::Privileged);
        assert_eq!(outcome.remaining, 2);
        assert_eq!(user_count(&fx.db, 7).await?, 2);

        let order = OrderRecord::find_by_id(outcome.order_id)
            .one(fx.db.as_ref())
            .await?
            .unwrap();
        assert_eq!(order.status, OrderStatus::WalkIn);
        assert_eq!(order.meal_type, Period::Lunch);
        assert_eq!(order.weekday, WeekdayLabel::Wednesday);
        assert_eq!(order.week_number, "20250108");
        assert_eq!(order.setmeal_id, Some(17));
        Ok(())
    }

    #[tokio::test]
    async fn test_privileged_department_uses_default_meal_on_miss() -> Result<()> {
        let fx = setup_engine(wednesday_at(12, 0)).await?;
        create_test_user(&fx.db, 7, "1001", 219, 3).await?;

        let outcome = fx.engine.consume(&swipe("1001"), DEVICE_B).await?;
        let order = OrderRecord::find_by_id(outcome.order_id)
            .one(fx.db.as_ref())
            .await?
            .unwrap();
        assert_eq!(order.setmeal_id, Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_exhausted_entitlement_stays_at_zero() -> Result<()> {
        let fx = setup_engine(wednesday_at(12, 0)).await?;
        create_test_user(&fx.db, 1, "2001", 10, 0).await?;

        let outcome = fx.engine.consume(&swipe("2001"), DEVICE_A).await?;
        assert_eq!(outcome.remaining, 0);
        assert_eq!(user_count(&fx.db, 1).await?, 0);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_swipes_decrement_once() -> Result<()> {
        init_test_tracing();
        let fx = setup_engine(wednesday_at(12, 0)).await?;
        create_test_user(&fx.db, 1, "2001", 10, 5).await?;

        let swipes: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&fx.engine);
                tokio::spawn(async move { engine.consume(&swipe("2001"), DEVICE_A).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in swipes {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(Error::DuplicateSwipe { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(succeeded, 1);
        assert_eq!(user_count(&fx.db, 1).await?, 4);
        assert_eq!(OrderRecord::find().count(fx.db.as_ref()).await?, 1);
        Ok(())
    }

    /// Store whose reads never return within a swipe deadline.
    #[derive(Clone)]
    struct StalledStore(MemoryStore);

    impl CacheStore for StalledStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            self.0.get(key).await
        }

        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
            self.0.set_ex(key, value, ttl).await
        }

        async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
            self.0.hash_get_all(key).await
        }

        async fn hash_set_all(
            &self,
            key: &str,
            fields: &[(&str, String)],
            ttl: Duration,
        ) -> Result<()> {
            self.0.hash_set_all(key, fields, ttl).await
        }
    }

    #[tokio::test]
    async fn test_timeout_leaves_no_partial_state() -> Result<()> {
        init_test_tracing();
        let now = wednesday_at(12, 30);
        let db = Arc::new(setup_test_db().await?);
        create_test_user(&db, 1, "2001", 10, 5).await?;
        let order = create_reserved_order(&db, 1, Period::Lunch, now.date(), 21).await?;

        let config = AppConfig {
            request_timeout_ms: 200,
            ..test_config()
        };
        let engine = ConsumeEngine::new(
            Arc::clone(&db),
            StalledStore(MemoryStore::new()),
            Arc::new(FixedClock::new(now)),
            Arc::new(config),
        );

        let result = engine.consume(&swipe("2001"), DEVICE_B).await;
        assert!(matches!(result, Err(Error::Timeout)));

        let stored = OrderRecord::find_by_id(order.id).one(db.as_ref()).await?.unwrap();
        assert_eq!(stored.status, OrderStatus::Reserved);
        assert_eq!(user_count(&db, 1).await?, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_privileged_order_rolled_back_when_decrement_fails() -> Result<()> {
        let now = wednesday_at(12, 0);
        let fx = setup_engine(now).await?;
        create_test_user(&fx.db, 7, "1001", 219, 3).await?;
        block_entitlement_updates(&fx.db).await?;

        let result = fx.engine.consume(&swipe("1001"), DEVICE_B).await;

        assert!(matches!(result, Err(Error::Database(_))));
        assert_eq!(OrderRecord::find().count(fx.db.as_ref()).await?, 0);
        assert_eq!(user_count(&fx.db, 7).await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_walk_in_order_rolled_back_when_decrement_fails() -> Result<()> {
        let now = wednesday_at(12, 0);
        let fx = setup_engine(now).await?;
        create_test_user(&fx.db, 1, "2001", 10, 5).await?;
        block_entitlement_updates(&fx.db).await?;

        let result = fx.engine.consume(&swipe("2001"), DEVICE_A).await;

        assert!(matches!(result, Err(Error::Database(_))));
        assert_eq!(OrderRecord::find().count(fx.db.as_ref()).await?, 0);
        assert_eq!(user_count(&fx.db, 1).await?, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_collection_rolled_back_when_decrement_fails() -> Result<()> {
        let now = wednesday_at(12, 30);
        let fx = setup_engine(now).await?;
        create_test_user(&fx.db, 1, "2001", 10, 5).await?;
        let order = create_reserved_order(&fx.db, 1, Period::Lunch, now.date(), 21).await?;
        set_slot(&fx.store, now.date(), Period::Lunch, Window::B, 21).await?;
        block_entitlement_updates(&fx.db).await?;

        let result = fx.engine.consume(&swipe("2001"), DEVICE_B).await;

        assert!(matches!(result, Err(Error::Database(_))));
        let stored = OrderRecord::find_by_id(order.id).one(fx.db.as_ref()).await?.unwrap();
        assert_eq!(stored.status, OrderStatus::Reserved);
        assert_eq!(stored.update_time, order.update_time);
        assert_eq!(OrderRecord::find().count(fx.db.as_ref()).await?, 1);
        assert_eq!(user_count(&fx.db, 1).await?, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_cache_entry_changed_mid_day_is_honoured() -> Result<()> {
        let now = wednesday_at(12, 30);
        let fx = setup_engine(now).await?;
        create_test_user(&fx.db, 1, "2001", 10, 5).await?;
        create_reserved_order(&fx.db, 1, Period::Lunch, now.date(), 21).await?;
        set_slot(&fx.store, now.date(), Period::Lunch, Window::B, 20).await?;

        assert!(fx.engine.consume(&swipe("2001"), DEVICE_B).await.is_err());

        MealSlotCache::new(fx.store.clone(), 1)
            .set(now.date(), Period::Lunch, Window::B, 21, MEAL_SLOT_TTL)
            .await?;
        fx.engine.consume(&swipe("2001"), DEVICE_B).await?;
        Ok(())
    }
}
