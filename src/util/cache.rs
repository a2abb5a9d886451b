use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use moka::future::Cache as MokaCache;
use moka::notification::RemovalCause;
use moka::Expiry;
use serde::Serialize;

use crate::models::LeaderboardEntry;
use crate::util::api_util::ERROR_DB_CONNECTION;
use crate::DbPool;

use super::api_util::{log_server_error, APIError};
use super::ledger;

pub const LEADERBOARD_SIZE: i64 = 10;

/// How long a cached value stays valid.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Expiration {
    Short,
    Middle,
    Long,
}

impl Expiration {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Expiration::Short => Some(Duration::from_secs(5)),
            Expiration::Middle => Some(Duration::from_secs(60)),
            Expiration::Long => Some(Duration::from_secs(3600)),
        }
    }
}

pub struct ExpiryPolicy;

impl<K, V> Expiry<K, (Expiration, V)> for ExpiryPolicy
where
    K: Clone + std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn expire_after_create(
        &self,
        _key: &K,
        value: &(Expiration, V),
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        value.0.as_duration()
    }

    fn expire_after_update(
        &self,
        _key: &K,
        value: &(Expiration, V),
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.0.as_duration()
    }
}

fn eviction_listener<K: Debug, V>(key: Arc<K>, _value: V, cause: RemovalCause) {
    let value_type = std::any::type_name::<V>();
    debug!("Evicted key {key:?} -> {} Cause: {cause:?}", value_type);
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    pub users: i64,
    pub network_power: f64,
    pub installed_racks: i64,
    pub installed_machines: i64,
    #[serde(serialize_with = "serialize_millis")]
    pub time: DateTime<Utc>,
}

fn serialize_millis<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_i64(time.timestamp_millis())
}

type Aggregate<T> = MokaCache<(), (Expiration, Arc<T>)>;

fn aggregate_cache<T: Send + Sync + 'static>() -> Aggregate<T> {
    MokaCache::builder()
        .max_capacity(1)
        .expire_after(ExpiryPolicy)
        .eviction_listener(eviction_listener)
        .build()
}

/// Aggregate reads over every account, refreshed lazily.
pub struct Cache {
    leaderboard: Aggregate<Vec<LeaderboardEntry>>,
    stats: Aggregate<GlobalStats>,
    pool: Arc<DbPool>,
}

#[derive(Debug, serde::Serialize)]
pub struct CacheStatusResponse {
    leaderboard: u64,
    stats: u64,
}

impl Cache {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self {
            leaderboard: aggregate_cache(),
            stats: aggregate_cache(),
            pool,
        }
    }

    pub fn get_size(&self) -> CacheStatusResponse {
        CacheStatusResponse {
            leaderboard: self.leaderboard.entry_count(),
            stats: self.stats.entry_count(),
        }
    }

    pub async fn get_leaderboard(&self) -> Result<Arc<Vec<LeaderboardEntry>>, APIError> {
        if let Some((_, data)) = self.leaderboard.get(&()).await {
            return Ok(data);
        }
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| log_server_error(e, "cache", ERROR_DB_CONNECTION))?;
        let new_data = Arc::new(ledger::fetch_leaderboard(LEADERBOARD_SIZE, &mut conn).await?);
        info!("Refreshed leaderboard with {} entries", new_data.len());
        self.leaderboard
            .insert((), (Expiration::Short, new_data.clone()))
            .await;
        Ok(new_data)
    }

    pub async fn get_stats(&self) -> Result<Arc<GlobalStats>, APIError> {
        if let Some((_, data)) = self.stats.get(&()).await {
            return Ok(data);
        }
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| log_server_error(e, "cache", ERROR_DB_CONNECTION))?;
        let users = ledger::count_users(&mut conn).await?;
        let network_power = ledger::fetch_network_power(&mut conn).await?;
        let (installed_racks, installed_machines) = ledger::count_installed(&mut conn).await?;
        let new_data = Arc::new(GlobalStats {
            users,
            network_power,
            installed_racks,
            installed_machines,
            time: Utc::now(),
        });
        self.stats
            .insert((), (Expiration::Middle, new_data.clone()))
            .await;
        Ok(new_data)
    }

    /// Balances moved; the next leaderboard read goes to the database.
    pub async fn invalidate_leaderboard(&self) {
        self.leaderboard.invalidate(&()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expirations_are_ordered() {
        let durations: Vec<Duration> = [Expiration::Short, Expiration::Middle, Expiration::Long]
            .iter()
            .filter_map(Expiration::as_duration)
            .collect();
        assert_eq!(durations.len(), 3);
        assert!(durations.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn aggregate_cache_holds_and_invalidates() {
        let cache: Aggregate<u32> = aggregate_cache();
        cache.insert((), (Expiration::Long, Arc::new(2))).await;
        assert_eq!(cache.get(&()).await.map(|(_, v)| *v), Some(2));

        cache.invalidate(&()).await;
        assert!(cache.get(&()).await.is_none());
    }
}
