//! Tiered cache over the shared store: a short-lived live cache per data
//! kind plus a long-lived fallback cache written only on successful fetches.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::kv::KvStore;

/// Fallback copies outlive every live TTL so a provider outage can be bridged
/// for a day.
pub const FALLBACK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// The kinds of externally-sourced data the cache distinguishes, each with
/// its own live TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    SearchResults,
    ListingDetail,
    Reviews,
    CategoryListing,
    DashboardAggregate,
    DailyRanking,
}

impl DataKind {
    pub fn live_ttl(self) -> Duration {
        match self {
            Self::SearchResults => Duration::from_secs(15 * 60),
            Self::ListingDetail => Duration::from_secs(60 * 60),
            Self::Reviews => Duration::from_secs(60 * 60),
            Self::CategoryListing => Duration::from_secs(60 * 60),
            Self::DashboardAggregate => Duration::from_secs(5 * 60),
            Self::DailyRanking => Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SearchResults => "search",
            Self::ListingDetail => "detail",
            Self::Reviews => "reviews",
            Self::CategoryListing => "category",
            Self::DashboardAggregate => "dashboard",
            Self::DailyRanking => "ranking",
        }
    }
}

/// Payload wrapper persisted in both cache namespaces; `cached_at` is what
/// STALE responses surface as the original fetch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEnvelope<T> {
    payload: T,
    cached_at: DateTime<Utc>,
}

/// Best-effort cache: a store outage degrades every read to a miss and every
/// write to a no-op, never to incorrect data.
#[derive(Clone)]
pub struct TieredCache {
    store: Arc<dyn KvStore>,
}

impl TieredCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn live_key(kind: DataKind, key: &str) -> String {
        format!("cache:{}:{}", kind.as_str(), key)
    }

    fn fallback_key(kind: DataKind, key: &str) -> String {
        format!("fallback:{}:{}", kind.as_str(), key)
    }

    pub async fn get<T: DeserializeOwned>(&self, kind: DataKind, key: &str) -> Option<(T, DateTime<Utc>)> {
        self.read_envelope(&Self::live_key(kind, key)).await
    }

    pub async fn set<T: Serialize>(&self, kind: DataKind, key: &str, payload: &T) {
        self.write_envelope(&Self::live_key(kind, key), payload, kind.live_ttl())
            .await;
    }

    pub async fn delete(&self, kind: DataKind, key: &str) {
        if let Err(err) = self.store.delete(&Self::live_key(kind, key)).await {
            warn!(kind = kind.as_str(), key, %err, "cache delete failed");
        }
    }

    /// Read the long-lived fallback copy, returning the payload together with
    /// its original fetch time.
    pub async fn fallback_get<T: DeserializeOwned>(
        &self,
        kind: DataKind,
        key: &str,
    ) -> Option<(T, DateTime<Utc>)> {
        self.read_envelope(&Self::fallback_key(kind, key)).await
    }

    /// Written only on a successful live fetch.
    pub async fn fallback_set<T: Serialize>(&self, kind: DataKind, key: &str, payload: &T) {
        self.write_envelope(&Self::fallback_key(kind, key), payload, FALLBACK_TTL)
            .await;
    }

    async fn read_envelope<T: DeserializeOwned>(&self, key: &str) -> Option<(T, DateTime<Utc>)> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(key, %err, "cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_str::<CacheEnvelope<T>>(&raw) {
            Ok(envelope) => Some((envelope.payload, envelope.cached_at)),
            Err(err) => {
                warn!(key, %err, "cache entry undecodable, treating as miss");
                None
            }
        }
    }

    async fn write_envelope<T: Serialize>(&self, key: &str, payload: &T, ttl: Duration) {
        let envelope = CacheEnvelope {
            payload,
            cached_at: Utc::now(),
        };
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, %err, "cache entry not serializable, skipping write");
                return;
            }
        };
        if let Err(err) = self.store.set(key, &raw, Some(ttl)).await {
            warn!(key, %err, "cache write failed");
        }
    }
}
