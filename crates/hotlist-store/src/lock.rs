//! Distributed job lock over the shared store: SET-if-absent acquire with a
//! per-holder token, check-and-delete release.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::kv::KvStore;

/// Lease long enough for a full analysis run; a crashed holder frees the job
/// for the next scheduled attempt without manual cleanup.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(300);

/// Mutual exclusion for scheduled jobs across service instances.
///
/// Contention is normal operation, not an error: a second instance finding
/// the lock taken skips its run. Store failures are treated the same way, so
/// an unreachable store never lets two holders in.
#[derive(Clone)]
pub struct JobLock {
    store: Arc<dyn KvStore>,
}

impl JobLock {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn key(job: &str) -> String {
        format!("lock:{job}")
    }

    /// Try to take the lock for `job`. Returns the holder token on success,
    /// `None` when another holder owns it or the store is unreachable.
    pub async fn try_acquire(&self, job: &str, lease: Duration) -> Option<String> {
        let token = Uuid::new_v4().to_string();
        match self.store.set_if_absent(&Self::key(job), &token, lease).await {
            Ok(true) => {
                debug!(job, "job lock acquired");
                Some(token)
            }
            Ok(false) => {
                debug!(job, "job lock held elsewhere");
                None
            }
            Err(err) => {
                warn!(job, %err, "job lock acquire failed, treating as held");
                None
            }
        }
    }

    /// Release only if we still hold it; a lock that expired and was re-taken
    /// by another instance is left alone.
    pub async fn release(&self, job: &str, token: &str) -> bool {
        match self.store.delete_if_equals(&Self::key(job), token).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(job, "job lock already expired or taken over, not released");
                false
            }
            Err(err) => {
                warn!(job, %err, "job lock release failed");
                false
            }
        }
    }

    pub async fn is_locked(&self, job: &str) -> bool {
        matches!(self.store.get(&Self::key(job)).await, Ok(Some(_)))
    }

    /// Run `task` under the lock. `Ok(None)` means the run was skipped because
    /// another instance holds the job. The lock is released even when the
    /// task errors.
    pub async fn with_lock<T, F, Fut>(
        &self,
        job: &str,
        lease: Duration,
        task: F,
    ) -> anyhow::Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let Some(token) = self.try_acquire(job, lease).await else {
            info!(job, "skipping run, job active elsewhere");
            return Ok(None);
        };
        let outcome = task().await;
        self.release(job, &token).await;
        outcome.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn lock() -> JobLock {
        JobLock::new(Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test]
    async fn second_acquire_is_refused_until_release() {
        let lock = lock();
        let token = lock
            .try_acquire("hot-product-analysis", DEFAULT_LEASE)
            .await
            .expect("first acquire");
        assert!(lock.try_acquire("hot-product-analysis", DEFAULT_LEASE).await.is_none());
        assert!(lock.is_locked("hot-product-analysis").await);

        assert!(lock.release("hot-product-analysis", &token).await);
        assert!(lock
            .try_acquire("hot-product-analysis", DEFAULT_LEASE)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn release_with_foreign_token_is_refused() {
        let lock = lock();
        let _token = lock.try_acquire("purge", DEFAULT_LEASE).await.unwrap();
        assert!(!lock.release("purge", "not-my-token").await);
        assert!(lock.is_locked("purge").await);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lease_frees_the_job() {
        let lock = lock();
        let stale = lock
            .try_acquire("analysis", Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        let fresh = lock.try_acquire("analysis", DEFAULT_LEASE).await;
        assert!(fresh.is_some());
        // The crashed holder's late release must not free the new holder.
        assert!(!lock.release("analysis", &stale).await);
        assert!(lock.is_locked("analysis").await);
    }

    #[tokio::test]
    async fn with_lock_skips_on_contention_and_releases_after() {
        let lock = lock();
        let runs = AtomicUsize::new(0);

        let held = lock.try_acquire("job", DEFAULT_LEASE).await.unwrap();
        let skipped = lock
            .with_lock("job", DEFAULT_LEASE, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await
            .unwrap();
        assert_eq!(skipped, None);
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        lock.release("job", &held).await;
        let ran = lock
            .with_lock("job", DEFAULT_LEASE, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await
            .unwrap();
        assert_eq!(ran, Some(42));
        assert!(!lock.is_locked("job").await);
    }

    #[tokio::test]
    async fn with_lock_releases_even_when_task_errors() {
        let lock = lock();
        let result: anyhow::Result<Option<()>> = lock
            .with_lock("job", DEFAULT_LEASE, || async {
                anyhow::bail!("analysis blew up")
            })
            .await;
        assert!(result.is_err());
        assert!(!lock.is_locked("job").await);
    }
}
