//! Shared-store primitives for hotlist: an atomic key-value abstraction, the
//! tiered cache, the request-volume governor and the distributed job lock.

pub const CRATE_NAME: &str = "hotlist-store";

mod cache;
mod governor;
mod kv;
mod lock;

pub use cache::{DataKind, TieredCache, FALLBACK_TTL};
pub use governor::{
    AlertScope, GovernorConfig, LogNotifier, Notifier, ThresholdAlert, VolumeGovernor,
};
pub use kv::{KvStore, MemoryKvStore, StoreError};
pub use lock::{JobLock, DEFAULT_LEASE};
