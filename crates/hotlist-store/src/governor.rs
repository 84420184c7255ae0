//! Request-volume governor: day/month counters over the shared store with
//! single-fire threshold alerting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::kv::KvStore;

/// Day counters stay readable for a day after rollover, month counters for a
/// few days, so yesterday's/last month's totals remain queryable.
const DAILY_COUNTER_TTL: Duration = Duration::from_secs(2 * 24 * 60 * 60);
const MONTHLY_COUNTER_TTL: Duration = Duration::from_secs(35 * 24 * 60 * 60);
const ALERT_HISTORY_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Percent-of-threshold levels that each fire exactly one alert.
const ALERT_LEVELS: [i64; 3] = [100, 110, 150];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertScope {
    Day,
    Month,
}

impl AlertScope {
    fn as_str(self) -> &'static str {
        match self {
            Self::Day => "daily",
            Self::Month => "monthly",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAlert {
    pub alert_type: String,
    pub scope: AlertScope,
    pub current_count: i64,
    pub threshold: i64,
    /// The provider operation whose request crossed the level.
    pub operation: String,
}

/// Out-of-band delivery of threshold alerts; fire-and-forget from the
/// governor's point of view.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn alert(&self, alert: &ThresholdAlert);
}

/// Default notifier: structured log only.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn alert(&self, alert: &ThresholdAlert) {
        warn!(
            alert_type = %alert.alert_type,
            current = alert.current_count,
            threshold = alert.threshold,
            operation = %alert.operation,
            "request volume threshold alert"
        );
    }
}

#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub enabled: bool,
    pub daily_warning_threshold: i64,
    pub monthly_warning_threshold: i64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_warning_threshold: 1_000,
            monthly_warning_threshold: 20_000,
        }
    }
}

impl GovernorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("HOTLIST_COST_MONITOR_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(defaults.enabled),
            daily_warning_threshold: std::env::var("HOTLIST_DAILY_REQUEST_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.daily_warning_threshold),
            monthly_warning_threshold: std::env::var("HOTLIST_MONTHLY_REQUEST_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.monthly_warning_threshold),
        }
    }
}

/// Tracks external-call volume per day and month across all instances and
/// alerts before the provider quota becomes a cost incident. Never errors or
/// blocks the calling request path.
#[derive(Clone)]
pub struct VolumeGovernor {
    store: Arc<dyn KvStore>,
    notifier: Arc<dyn Notifier>,
    config: GovernorConfig,
}

impl VolumeGovernor {
    pub fn new(store: Arc<dyn KvStore>, notifier: Arc<dyn Notifier>, config: GovernorConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    fn day_key(date: NaiveDate) -> String {
        format!("usage:day:{}", date.format("%Y-%m-%d"))
    }

    fn month_key(date: NaiveDate) -> String {
        format!("usage:month:{}", date.format("%Y-%m"))
    }

    /// Count one provider request, incrementing both period counters and
    /// checking the alert levels. Infallible by contract: store trouble is
    /// logged and swallowed.
    pub async fn record_request(&self, operation: &str) {
        if !self.config.enabled {
            return;
        }
        let today = Utc::now().date_naive();

        let daily = self
            .store
            .increment(&Self::day_key(today), Some(DAILY_COUNTER_TTL))
            .await;
        let monthly = self
            .store
            .increment(&Self::month_key(today), Some(MONTHLY_COUNTER_TTL))
            .await;

        match daily {
            Ok(count) => {
                self.check_level(AlertScope::Day, count, self.config.daily_warning_threshold, operation)
                    .await;
            }
            Err(err) => error!(%err, operation, "daily request counter increment failed"),
        }
        match monthly {
            Ok(count) => {
                self.check_level(
                    AlertScope::Month,
                    count,
                    self.config.monthly_warning_threshold,
                    operation,
                )
                .await;
            }
            Err(err) => error!(%err, operation, "monthly request counter increment failed"),
        }
    }

    pub async fn daily_count(&self) -> i64 {
        self.count_for_date(Utc::now().date_naive()).await
    }

    pub async fn monthly_count(&self) -> i64 {
        self.read_count(&Self::month_key(Utc::now().date_naive()))
            .await
    }

    pub async fn count_for_date(&self, date: NaiveDate) -> i64 {
        self.read_count(&Self::day_key(date)).await
    }

    /// `month` in `YYYY-MM` form; counters stay readable for ~5 days past the
    /// month boundary.
    pub async fn count_for_month(&self, month: &str) -> i64 {
        self.read_count(&format!("usage:month:{month}")).await
    }

    pub async fn is_daily_threshold_exceeded(&self) -> bool {
        self.daily_count().await >= self.config.daily_warning_threshold
    }

    pub async fn is_monthly_threshold_exceeded(&self) -> bool {
        self.monthly_count().await >= self.config.monthly_warning_threshold
    }

    pub fn daily_warning_threshold(&self) -> i64 {
        self.config.daily_warning_threshold
    }

    pub fn monthly_warning_threshold(&self) -> i64 {
        self.config.monthly_warning_threshold
    }

    pub async fn usage_summary(&self) -> String {
        let daily = self.daily_count().await;
        let monthly = self.monthly_count().await;
        let daily_pct = percent(daily, self.config.daily_warning_threshold);
        let monthly_pct = percent(monthly, self.config.monthly_warning_threshold);
        format!(
            "provider usage - today: {daily}/{} ({daily_pct:.1}%), month: {monthly}/{} ({monthly_pct:.1}%)",
            self.config.daily_warning_threshold, self.config.monthly_warning_threshold
        )
    }

    /// Alert records written for `date`, newest last.
    pub async fn recent_alerts(&self, date: NaiveDate) -> Vec<ThresholdAlert> {
        let key = format!("alerts:{}", date.format("%Y-%m-%d"));
        match self.store.list_range(&key).await {
            Ok(raw) => raw
                .iter()
                .filter_map(|item| serde_json::from_str(item).ok())
                .collect(),
            Err(err) => {
                warn!(%err, "alert history read failed");
                Vec::new()
            }
        }
    }

    async fn read_count(&self, key: &str) -> i64 {
        match self.store.get(key).await {
            Ok(Some(raw)) => raw.parse().unwrap_or(0),
            Ok(None) => 0,
            Err(err) => {
                warn!(key, %err, "usage counter read failed");
                0
            }
        }
    }

    /// Fire at most one alert per percent level per period. The post-increment
    /// count is bucketed into the highest reached level and compared against a
    /// persisted last-alerted level via compare-and-swap, so concurrent or
    /// batched increments that skip the exact threshold value still alert
    /// exactly once.
    async fn check_level(&self, scope: AlertScope, count: i64, threshold: i64, operation: &str) {
        if threshold <= 0 {
            return;
        }
        let Some(level) = reached_level(count, threshold) else {
            return;
        };

        let today = Utc::now().date_naive();
        let (period, ttl) = match scope {
            AlertScope::Day => (today.format("%Y-%m-%d").to_string(), DAILY_COUNTER_TTL),
            AlertScope::Month => (today.format("%Y-%m").to_string(), MONTHLY_COUNTER_TTL),
        };
        let level_key = format!("usage:alerted:{}:{}", scope.as_str(), period);

        let last: Option<i64> = match self.store.get(&level_key).await {
            Ok(Some(raw)) => raw.parse().ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(%err, "alert level read failed");
                return;
            }
        };
        if last.is_some_and(|last| last >= level) {
            return;
        }

        let expected = last.map(|l| l.to_string());
        let swapped = self
            .store
            .compare_and_swap(&level_key, expected.as_deref(), &level.to_string(), Some(ttl))
            .await;
        match swapped {
            // Lost the race: another instance is alerting for this level.
            Ok(false) => return,
            Ok(true) => {}
            Err(err) => {
                warn!(%err, "alert level swap failed");
                return;
            }
        }

        let alert = ThresholdAlert {
            alert_type: alert_type(scope, level),
            scope,
            current_count: count,
            threshold,
            operation: operation.to_string(),
        };
        self.record_alert(today, &alert).await;
        self.notifier.alert(&alert).await;
        info!(alert_type = %alert.alert_type, count, threshold, "threshold alert fired");
    }

    async fn record_alert(&self, date: NaiveDate, alert: &ThresholdAlert) {
        let key = format!("alerts:{}", date.format("%Y-%m-%d"));
        let raw = match serde_json::to_string(alert) {
            Ok(raw) => raw,
            Err(_) => return,
        };
        if let Err(err) = self.store.list_push(&key, &raw, ALERT_HISTORY_TTL).await {
            warn!(%err, "alert history write failed");
        }
    }

    /// First day of a month as a NaiveDate, for callers formatting month keys.
    pub fn month_of(date: NaiveDate) -> String {
        format!("{:04}-{:02}", date.year(), date.month())
    }
}

fn percent(count: i64, threshold: i64) -> f64 {
    if threshold > 0 {
        count as f64 * 100.0 / threshold as f64
    } else {
        0.0
    }
}

/// Highest alert level (percent of threshold) reached by `count`, if any.
fn reached_level(count: i64, threshold: i64) -> Option<i64> {
    ALERT_LEVELS
        .iter()
        .copied()
        .filter(|level| count * 100 >= threshold * level)
        .max()
}

fn alert_type(scope: AlertScope, level: i64) -> String {
    let prefix = match scope {
        AlertScope::Day => "DAILY",
        AlertScope::Month => "MONTHLY",
    };
    match level {
        100 => format!("{prefix}_THRESHOLD_REACHED"),
        110 => format!("{prefix}_THRESHOLD_EXCEEDED_10PCT"),
        150 => format!("{prefix}_THRESHOLD_EXCEEDED_50PCT"),
        other => format!("{prefix}_THRESHOLD_LEVEL_{other}"),
    }
}
