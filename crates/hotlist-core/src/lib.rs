//! Core domain model for hotlist: marketplace records, freshness tags and
//! category ranking types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "hotlist-core";

/// Maximum number of ranked products committed per category per day.
pub const TOP_N_PER_CATEGORY: usize = 20;

/// Ranked rows older than this many days are eligible for purge.
pub const SCORE_RETENTION_DAYS: i64 = 7;

/// Describes where a payload came from: a live provider call, the fallback
/// cache, or nowhere at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataFreshness {
    Fresh {
        fetched_at: DateTime<Utc>,
    },
    Stale {
        fetched_at: DateTime<Utc>,
        message: String,
    },
    Empty {
        message: String,
    },
}

impl DataFreshness {
    pub fn fresh() -> Self {
        Self::Fresh {
            fetched_at: Utc::now(),
        }
    }

    pub fn fresh_at(fetched_at: DateTime<Utc>) -> Self {
        Self::Fresh { fetched_at }
    }

    pub fn stale(cached_at: DateTime<Utc>) -> Self {
        Self::Stale {
            fetched_at: cached_at,
            message: "data served from cache, may be outdated".to_string(),
        }
    }

    pub fn empty() -> Self {
        Self::Empty {
            message: "no data available".to_string(),
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty { .. })
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Fresh { fetched_at } => Some(*fetched_at),
            Self::Stale { fetched_at, .. } => Some(*fetched_at),
            Self::Empty { .. } => None,
        }
    }
}

/// The shape every read of externally-sourced data exposes to consumers, so
/// responses can carry "data as of ..." banners instead of exceptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackResult<T> {
    pub data: T,
    pub freshness: DataFreshness,
}

impl<T> FallbackResult<T> {
    pub fn fresh(data: T) -> Self {
        Self {
            data,
            freshness: DataFreshness::fresh(),
        }
    }

    pub fn stale(data: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            data,
            freshness: DataFreshness::stale(cached_at),
        }
    }
}

impl<T: Default> FallbackResult<T> {
    pub fn empty() -> Self {
        Self {
            data: T::default(),
            freshness: DataFreshness::empty(),
        }
    }
}

/// One marketplace listing as returned by the scraping provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceListing {
    /// Stable natural key (e.g. the marketplace's item identifier).
    pub item_id: String,
    pub title: String,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    /// 1.0 - 5.0 star rating.
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    /// Best-sellers-style rank within the marketplace category; lower is
    /// better.
    pub bsr_rank: Option<u32>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub url: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl MarketplaceListing {
    /// A listing is usable only with a natural key and at least one numeric
    /// signal; anything else is discarded before caching.
    pub fn is_valid(&self) -> bool {
        !self.item_id.is_empty()
            && (self.price.is_some()
                || self.rating.is_some()
                || self.review_count.is_some()
                || self.bsr_rank.is_some())
    }

    pub fn has_discount(&self) -> bool {
        matches!((self.original_price, self.price), (Some(orig), Some(now)) if orig > now)
    }

    pub fn discount_percent(&self) -> f64 {
        match (self.original_price, self.price) {
            (Some(orig), Some(now)) if orig > now && orig > 0.0 => (orig - now) / orig * 100.0,
            _ => 0.0,
        }
    }
}

/// One customer review attached to a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceReview {
    pub review_id: String,
    pub item_id: String,
    pub rating: Option<f64>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub helpful_votes: Option<u32>,
    pub review_date: Option<NaiveDate>,
    pub fetched_at: DateTime<Utc>,
}

impl MarketplaceReview {
    pub fn is_valid(&self) -> bool {
        !self.review_id.is_empty() && (self.rating.is_some() || self.helpful_votes.is_some())
    }
}

/// One wholesale supplier offer from the sourcing marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierOffer {
    pub offer_id: String,
    pub title: String,
    pub unit_price: Option<f64>,
    pub min_order_quantity: Option<u32>,
    pub orders_count: Option<u32>,
    pub supplier: Option<String>,
    pub url: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl SupplierOffer {
    pub fn is_valid(&self) -> bool {
        !self.offer_id.is_empty()
            && (self.unit_price.is_some()
                || self.orders_count.is_some()
                || self.min_order_quantity.is_some())
    }
}

/// A product category the daily analysis iterates over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// Search keyword used against the provider; defaults to the name.
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Category {
    pub fn search_keyword(&self) -> &str {
        self.keyword.as_deref().unwrap_or(&self.name)
    }
}

/// One committed row of the daily per-category ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    /// Natural key of the scored product (marketplace item id).
    pub product_id: String,
    pub category_id: i64,
    /// Trending score in [0, 100].
    pub score: f64,
    /// Dense 1..=N rank within the category for `recommend_date`.
    pub rank_in_category: u32,
    pub recommend_date: NaiveDate,
    pub reasons: Vec<String>,
    pub recommendation: Option<String>,
}

impl CategoryScore {
    pub fn is_high_potential(&self) -> bool {
        self.score >= 80.0
    }

    pub fn is_top_n(&self) -> bool {
        self.rank_in_category as usize <= TOP_N_PER_CATEGORY
    }
}

/// Clamp a raw score into the contract range [0, 100].
pub fn clamp_score(raw: f64) -> f64 {
    raw.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn listing(item_id: &str) -> MarketplaceListing {
        MarketplaceListing {
            item_id: item_id.to_string(),
            title: "Stainless Milk Frother".to_string(),
            price: Some(19.99),
            original_price: Some(29.99),
            rating: Some(4.6),
            review_count: Some(1200),
            bsr_rank: Some(87),
            category: Some("Kitchen".to_string()),
            brand: None,
            url: None,
            fetched_at: Utc.with_ymd_and_hms(2026, 8, 20, 2, 0, 0).single().unwrap(),
        }
    }

    #[test]
    fn freshness_invariants_hold() {
        let fresh = DataFreshness::fresh();
        assert!(fresh.is_fresh());
        assert!(fresh.fetched_at().is_some());

        let cached_at = Utc.with_ymd_and_hms(2026, 8, 19, 2, 0, 0).single().unwrap();
        let stale = DataFreshness::stale(cached_at);
        assert!(stale.is_stale());
        assert_eq!(stale.fetched_at(), Some(cached_at));
        match &stale {
            DataFreshness::Stale { message, .. } => assert!(!message.is_empty()),
            other => panic!("expected stale, got {other:?}"),
        }

        let empty = DataFreshness::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.fetched_at(), None);
    }

    #[test]
    fn listing_validity_requires_key_and_signal() {
        assert!(listing("B0TEST00AA").is_valid());

        let mut no_key = listing("");
        no_key.item_id.clear();
        assert!(!no_key.is_valid());

        let mut no_signals = listing("B0TEST00AA");
        no_signals.price = None;
        no_signals.rating = None;
        no_signals.review_count = None;
        no_signals.bsr_rank = None;
        assert!(!no_signals.is_valid());
    }

    #[test]
    fn discount_math_uses_original_price() {
        let item = listing("B0TEST00AA");
        assert!(item.has_discount());
        assert!((item.discount_percent() - 33.344).abs() < 0.01);

        let mut full_price = item.clone();
        full_price.original_price = None;
        assert!(!full_price.has_discount());
        assert_eq!(full_price.discount_percent(), 0.0);
    }

    #[test]
    fn score_clamped_to_contract_range() {
        assert_eq!(clamp_score(135.0), 100.0);
        assert_eq!(clamp_score(-3.0), 0.0);
        assert_eq!(clamp_score(77.5), 77.5);
    }

    #[test]
    fn category_falls_back_to_name_as_keyword() {
        let cat = Category {
            id: 7,
            name: "Kitchen Gadgets".to_string(),
            keyword: None,
            enabled: true,
        };
        assert_eq!(cat.search_keyword(), "Kitchen Gadgets");
    }
}
