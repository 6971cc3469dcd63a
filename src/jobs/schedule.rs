//! Cron-driven job loop.
//!
//! Rules are evaluated on naive local time from the injected [`Clock`], so the
//! next fire time is a pure function that tests can call directly.

use crate::core::Clock;
use crate::errors::{Error, Result};
use chrono::{NaiveDateTime, TimeZone, Utc};
use cron::Schedule;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A named cron rule (`sec min hour day-of-month month day-of-week`).
#[derive(Debug, Clone)]
pub struct FireSchedule {
    name: String,
    schedule: Schedule,
}

impl FireSchedule {
    /// Parses a rule.
    ///
    /// # Errors
    /// `Error::Config` when the expression is not a valid cron rule.
    pub fn parse(name: &str, expression: &str) -> Result<Self> {
        let schedule = Schedule::from_str(expression).map_err(|e| Error::Config {
            message: format!("invalid cron rule {expression:?} for {name}: {e}"),
        })?;
        Ok(Self {
            name: name.to_string(),
            schedule,
        })
    }

    /// Job name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First fire time strictly after `now`.
    #[must_use]
    pub fn next_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        // Local wall-clock time is evaluated as if it were UTC; no offsets apply.
        let anchor = Utc.from_utc_datetime(&now);
        self.schedule
            .after(&anchor)
            .next()
            .map(|fire| fire.naive_utc())
    }
}

/// Runs `task` at every fire time of `schedule`, forever.
///
/// A failing run is logged and the loop waits for the next fire time. A fatal
/// error ends the loop and is returned.
pub async fn run_schedule<F, Fut>(
    schedule: FireSchedule,
    clock: Arc<dyn Clock>,
    mut task: F,
) -> Result<()>
where
    F: FnMut(NaiveDateTime) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut last_fire: Option<NaiveDateTime> = None;

    loop {
        let now = clock.now();
        let from = last_fire.map_or(now, |last| last.max(now));
        let Some(fire) = schedule.next_after(from) else {
            warn!("{} has no upcoming fire time, stopping", schedule.name());
            return Ok(());
        };

        info!("{} scheduled at {}", schedule.name(), fire);
        let wait = (fire - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        last_fire = Some(fire);

        match task(fire).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                error!("{} failed fatally: {}", schedule.name(), e);
                return Err(e);
            }
            Err(e) => error!("{} failed, retrying at the next fire time: {}", schedule.name(), e),
        }
    }
}
