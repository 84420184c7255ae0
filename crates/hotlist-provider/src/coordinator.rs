//! Fallback coordinator: the single path every externally-sourced read goes
//! through, turning provider failures into freshness-tagged degraded answers.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use hotlist_core::{DataFreshness, FallbackResult};
use hotlist_store::{DataKind, TieredCache, VolumeGovernor};

use crate::client::ProviderError;

/// Wraps a live provider call with the tiered cache and the volume governor.
///
/// The contract: a read never surfaces a provider outage as an error. It
/// answers `Fresh` (live call or live-cache hit), `Stale` (fallback-cache
/// bridge) or `Empty` (nothing anywhere). The one exception is caller
/// misuse, which propagates untouched so bugs stay visible.
#[derive(Clone)]
pub struct FallbackCoordinator {
    cache: TieredCache,
    governor: VolumeGovernor,
}

impl FallbackCoordinator {
    pub fn new(cache: TieredCache, governor: VolumeGovernor) -> Self {
        Self { cache, governor }
    }

    /// Callers whose payload has no natural empty value (single records)
    /// fetch through an `Option<T>`.
    pub async fn fetch<T, F, Fut>(
        &self,
        kind: DataKind,
        key: &str,
        operation: &str,
        live: F,
    ) -> Result<FallbackResult<T>, ProviderError>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        // A live-cache hit is free: no provider cost, so no governor count.
        if let Some((data, cached_at)) = self.cache.get::<T>(kind, key).await {
            return Ok(FallbackResult {
                data,
                freshness: DataFreshness::fresh_at(cached_at),
            });
        }

        self.governor.record_request(operation).await;

        match live().await {
            Ok(data) => {
                self.cache.set(kind, key, &data).await;
                self.cache.fallback_set(kind, key, &data).await;
                Ok(FallbackResult::fresh(data))
            }
            Err(err) if err.is_client_misuse() => Err(err),
            Err(err) => {
                warn!(
                    kind = kind.as_str(),
                    key, %err,
                    "live fetch failed, answering from fallback cache"
                );
                match self.cache.fallback_get::<T>(kind, key).await {
                    Some((data, cached_at)) => Ok(FallbackResult::stale(data, cached_at)),
                    None => Ok(FallbackResult::empty()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use hotlist_store::{GovernorConfig, LogNotifier, MemoryKvStore};

    fn failure() -> ProviderError {
        ProviderError::Http {
            status: 503,
            url: "https://www.amazon.com/s?k=frother".to_string(),
        }
    }

    fn coordinator() -> (FallbackCoordinator, VolumeGovernor) {
        let store: Arc<MemoryKvStore> = Arc::new(MemoryKvStore::new());
        let governor = VolumeGovernor::new(
            store.clone(),
            Arc::new(LogNotifier),
            GovernorConfig::default(),
        );
        (
            FallbackCoordinator::new(TieredCache::new(store), governor.clone()),
            governor,
        )
    }

    #[tokio::test]
    async fn success_is_fresh_and_served_from_cache_afterwards() {
        let (coordinator, governor) = coordinator();

        let first = coordinator
            .fetch(DataKind::SearchResults, "frother", "listing_search", || async {
                Ok::<_, ProviderError>(vec!["B0FROTHER1".to_string()])
            })
            .await
            .unwrap();
        assert!(first.freshness.is_fresh());
        assert_eq!(first.data, vec!["B0FROTHER1".to_string()]);

        // Second read hits the live cache; the provider closure must not run
        // and the governor must not count.
        let second: FallbackResult<Vec<String>> = coordinator
            .fetch(DataKind::SearchResults, "frother", "listing_search", || async {
                panic!("provider must not be called on a live-cache hit")
            })
            .await
            .unwrap();
        assert!(second.freshness.is_fresh());
        assert_eq!(second.data, first.data);
        assert_eq!(governor.daily_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn outage_after_expiry_bridges_with_stale_data() {
        let (coordinator, governor) = coordinator();

        coordinator
            .fetch(DataKind::SearchResults, "frother", "listing_search", || async {
                Ok::<_, ProviderError>(vec!["B0FROTHER1".to_string()])
            })
            .await
            .unwrap();

        // Live TTL for search results is 15 minutes; the fallback copy lives
        // a day.
        tokio::time::advance(Duration::from_secs(16 * 60)).await;

        let degraded = coordinator
            .fetch(DataKind::SearchResults, "frother", "listing_search", || async {
                Err::<Vec<String>, _>(failure())
            })
            .await
            .unwrap();
        assert!(degraded.freshness.is_stale());
        assert_eq!(degraded.data, vec!["B0FROTHER1".to_string()]);
        assert!(degraded.freshness.fetched_at().is_some());
        assert_eq!(governor.daily_count().await, 2);
    }

    #[tokio::test]
    async fn outage_with_no_history_is_empty() {
        let (coordinator, _) = coordinator();
        let result = coordinator
            .fetch(DataKind::Reviews, "B0FROTHER1", "listing_reviews", || async {
                Err::<Vec<String>, _>(failure())
            })
            .await
            .unwrap();
        assert!(result.freshness.is_empty());
        assert!(result.data.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn client_misuse_propagates_without_fallback() {
        let (coordinator, _) = coordinator();

        coordinator
            .fetch(DataKind::ListingDetail, "batch", "batch_listing_details", || async {
                Ok::<_, ProviderError>(vec!["B0FROTHER1".to_string()])
            })
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2 * 60 * 60)).await;

        // Even with stale data on hand, a validation error must reach the
        // caller.
        let err = coordinator
            .fetch(DataKind::ListingDetail, "batch", "batch_listing_details", || async {
                Err::<Vec<String>, _>(ProviderError::InvalidRequest(
                    "batch of 11 urls exceeds the limit of 10".to_string(),
                ))
            })
            .await
            .unwrap_err();
        assert!(err.is_client_misuse());
    }
}
