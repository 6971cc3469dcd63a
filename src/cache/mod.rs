//! Key/value cache seam shared by the meal-slot and dining-policy caches.
//!
//! The service runs against Redis through a pooled `ConnectionManager`. Tests
//! use [`MemoryStore`], which honours TTLs and can be switched to an
//! unavailable state to exercise failure paths.

/// Department dining-policy cache (read-through from `canteen_config`)
pub mod dining_policy;
/// Day-scoped window to meal assignment cache
pub mod meal_slot;

pub use dining_policy::{DiningPolicy, DiningPolicyCache};
pub use meal_slot::{MEAL_SLOT_TTL, MealSlotCache, slot_key};

use crate::errors::{Error, Result};
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use std::{
    collections::HashMap,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::info;

/// Minimal string and hash operations the gate needs from its cache.
pub trait CacheStore: Send + Sync {
    /// Reads a string value; `Ok(None)` on a miss.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Writes a string value that expires after `ttl`, replacing any previous value.
    fn set_ex(&self, key: &str, value: &str, ttl: Duration)
    -> impl Future<Output = Result<()>> + Send;

    /// Reads every field of a hash; an empty map on a miss.
    fn hash_get_all(&self, key: &str)
    -> impl Future<Output = Result<HashMap<String, String>>> + Send;

    /// Writes hash fields and sets the expiry of the whole hash.
    fn hash_set_all(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Redis-backed store. Cloning is cheap and shares the pooled connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Opens the connection manager used for the lifetime of the process.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(500));

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;
        info!("Connected to Redis at {}", redis_url);

        Ok(Self { connection })
    }
}

fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut connection = self.connection.clone();
        let () = connection.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut connection = self.connection.clone();
        let fields: HashMap<String, String> = connection.hgetall(key).await?;
        Ok(fields)
    }

    async fn hash_set_all(&self, key: &str, fields: &[(&str, String)], ttl: Duration) -> Result<()> {
        let mut connection = self.connection.clone();
        let () = redis::pipe()
            .atomic()
            .hset_multiple(key, fields)
            .ignore()
            .expire(key, ttl_seconds(ttl))
            .ignore()
            .query_async(&mut connection)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    strings: HashMap<String, (String, Instant)>,
    hashes: HashMap<String, (HashMap<String, String>, Instant)>,
    unavailable: bool,
}

/// In-process store with the same semantics as the Redis subset above.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail (or succeed again) like a lost connection.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Remaining lifetime of a string key, if present.
    pub async fn expires_in(&self, key: &str) -> Option<Duration> {
        let state = self.state.read().await;
        state
            .strings
            .get(key)
            .and_then(|(_, deadline)| deadline.checked_duration_since(Instant::now()))
    }

    /// Drops a key of either kind.
    pub async fn remove(&self, key: &str) {
        let mut state = self.state.write().await;
        state.strings.remove(key);
        state.hashes.remove(key);
    }

    fn check(state: &MemoryState) -> Result<()> {
        if state.unavailable {
            Err(Error::Cache(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "cache store unavailable",
            ))))
        } else {
            Ok(())
        }
    }
}

impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let state = self.state.read().await;
        Self::check(&state)?;
        Ok(state
            .strings
            .get(key)
            .filter(|(_, deadline)| *deadline > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut state = self.state.write().await;
        Self::check(&state)?;
        state
            .strings
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let state = self.state.read().await;
        Self::check(&state)?;
        Ok(state
            .hashes
            .get(key)
            .filter(|(_, deadline)| *deadline > Instant::now())
            .map(|(fields, _)| fields.clone())
            .unwrap_or_default())
    }

    async fn hash_set_all(&self, key: &str, fields: &[(&str, String)], ttl: Duration) -> Result<()> {
        let mut state = self.state.write().await;
        Self::check(&state)?;
        let entry = state
            .hashes
            .entry(key.to_string())
            .or_insert_with(|| (HashMap::new(), Instant::now()));
        for (field, value) in fields {
            entry.0.insert((*field).to_string(), value.clone());
        }
        entry.1 = Instant::now() + ttl;
        Ok(())
    }
}
