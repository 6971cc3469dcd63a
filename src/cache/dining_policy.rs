//! Dining-policy cache - when each department may collect dinner.
//!
//! Departments dine either on the flexible or on the fixed schedule; each
//! schedule has its own dinner start time and every dinner window closes at
//! 21:00. The policy lives in `canteen_config` and is cached as one Redis hash
//! for five days. A miss (or an unreachable cache) reads the table and writes
//! the hash back before deciding.

use super::CacheStore;
use crate::entities::{CanteenConfig, canteen_config};
use crate::errors::{Error, Result};
use chrono::{NaiveDateTime, NaiveTime};
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hash key holding the cached policy.
pub const POLICY_KEY: &str = "canteen:dinner_config";
/// Lifetime of the cached policy.
pub const POLICY_TTL: Duration = Duration::from_secs(120 * 60 * 60);

const FLEXIBLE_DEPT_IDS: &str = "flexible_dept_id";
const FIXED_DEPT_IDS: &str = "fixed_dept_id";
const FLEXIBLE_DINNER_START: &str = "flexible_dinner_start_time";
const FIXED_DINNER_START: &str = "fixed_dinner_start_time";
const POLICY_FIELDS: [&str; 4] = [
    FLEXIBLE_DEPT_IDS,
    FIXED_DEPT_IDS,
    FLEXIBLE_DINNER_START,
    FIXED_DINNER_START,
];

fn dinner_end() -> NaiveTime {
    NaiveTime::from_hms_opt(21, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Parsed dinner policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiningPolicy {
    /// Departments on the flexible schedule
    pub flexible_dept_ids: Vec<i64>,
    /// Departments on the fixed schedule
    pub fixed_dept_ids: Vec<i64>,
    /// Dinner start for flexible departments
    pub flexible_dinner_start: NaiveTime,
    /// Dinner start for fixed departments
    pub fixed_dinner_start: NaiveTime,
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::SystemConfig {
            detail: format!("dining policy field {name} is missing"),
        })
}

fn parse_dept_ids(raw: &str, name: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse().map_err(|e| Error::SystemConfig {
                detail: format!("{name} contains {id:?}: {e}"),
            })
        })
        .collect()
}

fn parse_start(raw: &str, name: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|e| Error::SystemConfig {
            detail: format!("{name} {raw:?} is not a time of day: {e}"),
        })
}

impl DiningPolicy {
    /// Builds a policy from the four raw configuration values.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            flexible_dept_ids: parse_dept_ids(field(fields, FLEXIBLE_DEPT_IDS)?, FLEXIBLE_DEPT_IDS)?,
            fixed_dept_ids: parse_dept_ids(field(fields, FIXED_DEPT_IDS)?, FIXED_DEPT_IDS)?,
            flexible_dinner_start: parse_start(
                field(fields, FLEXIBLE_DINNER_START)?,
                FLEXIBLE_DINNER_START,
            )?,
            fixed_dinner_start: parse_start(field(fields, FIXED_DINNER_START)?, FIXED_DINNER_START)?,
        })
    }

    /// Dinner start for a department; the flexible list takes precedence.
    #[must_use]
    pub fn dinner_start_for(&self, dept_id: i64) -> Option<NaiveTime> {
        if self.flexible_dept_ids.contains(&dept_id) {
            Some(self.flexible_dinner_start)
        } else if self.fixed_dept_ids.contains(&dept_id) {
            Some(self.fixed_dinner_start)
        } else {
            None
        }
    }

    /// Whether `now` falls in the department's `[start, 21:00)` dinner window.
    pub fn check(&self, dept_id: i64, now: NaiveDateTime) -> Result<()> {
        let start = self
            .dinner_start_for(dept_id)
            .ok_or(Error::NoDiningPolicy { dept_id })?;

        let time = now.time();
        if time < start || time >= dinner_end() {
            debug!(
                "Dept {} outside dinner window {} ~ 21:00 at {}",
                dept_id, start, time
            );
            return Err(Error::OutsideDiningHours);
        }
        Ok(())
    }
}

/// Loads the raw policy values from `canteen_config`.
pub async fn load_policy_fields<C>(db: &C) -> Result<HashMap<String, String>>
where
    C: ConnectionTrait,
{
    let rows = CanteenConfig::find()
        .filter(canteen_config::Column::ConfigKey.is_in(POLICY_FIELDS))
        .all(db)
        .await?;

    let fields: HashMap<String, String> = rows
        .into_iter()
        .map(|row| (row.config_key, row.config_value))
        .collect();

    if let Some(missing) = POLICY_FIELDS.iter().find(|name| !fields.contains_key(**name)) {
        return Err(Error::SystemConfig {
            detail: format!("canteen_config has no {missing}"),
        });
    }
    Ok(fields)
}

/// Read-through cache in front of [`load_policy_fields`].
#[derive(Debug, Clone)]
pub struct DiningPolicyCache<S> {
    store: S,
    db: Arc<DatabaseConnection>,
}

impl<S: CacheStore> DiningPolicyCache<S> {
    /// Creates the cache over a store and the reference database.
    #[must_use]
    pub const fn new(store: S, db: Arc<DatabaseConnection>) -> Self {
        Self { store, db }
    }

    /// Decides whether a department may collect dinner at `now`.
    ///
    /// # Errors
    /// `NoDiningPolicy` for departments on neither list, `OutsideDiningHours`
    /// outside the window, `SystemConfig` when the policy cannot be loaded.
    pub async fn check_dinner_allowed(&self, dept_id: i64, now: NaiveDateTime) -> Result<()> {
        self.policy().await?.check(dept_id, now)
    }

    /// Current policy, from the cache or freshly loaded.
    pub async fn policy(&self) -> Result<DiningPolicy> {
        match self.store.hash_get_all(POLICY_KEY).await {
            Ok(fields) if !fields.is_empty() => {
                debug!("Dining policy served from cache");
                return DiningPolicy::from_fields(&fields);
            }
            Ok(_) => info!("Dining policy not cached, loading canteen_config"),
            Err(e) => warn!("Dining policy cache read failed, loading canteen_config: {}", e),
        }

        let fields = load_policy_fields(self.db.as_ref()).await.map_err(|e| match e {
            Error::SystemConfig { .. } => e,
            other => Error::SystemConfig {
                detail: format!("loading dining policy failed: {other}"),
            },
        })?;
        let policy = DiningPolicy::from_fields(&fields)?;

        let pairs: Vec<(&str, String)> = POLICY_FIELDS
            .iter()
            .filter_map(|name| fields.get(*name).map(|value| (*name, value.clone())))
            .collect();
        if let Err(e) = self.store.hash_set_all(POLICY_KEY, &pairs, POLICY_TTL).await {
            warn!("Failed to cache dining policy: {}", e);
        }

        Ok(policy)
    }
}
