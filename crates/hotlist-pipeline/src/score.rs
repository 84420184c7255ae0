//! Product scoring: an external scoring collaborator with a deterministic
//! local heuristic standing in per product when it fails.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use hotlist_core::{clamp_score, MarketplaceListing};

/// Score and narrative produced for one listing within one category.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProduct {
    /// Always within [0, 100].
    pub score: f64,
    pub reasons: Vec<String>,
    pub recommendation: Option<String>,
}

#[async_trait]
pub trait ScoreGateway: Send + Sync {
    async fn score(
        &self,
        listing: &MarketplaceListing,
        category_name: &str,
    ) -> anyhow::Result<ScoredProduct>;
}

/// Posts the listing to the external scoring service.
pub struct HttpScoreGateway {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: f64,
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default)]
    recommendation: Option<String>,
}

impl HttpScoreGateway {
    pub fn new(endpoint: String, api_key: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("building scoring client")?;
        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl ScoreGateway for HttpScoreGateway {
    async fn score(
        &self,
        listing: &MarketplaceListing,
        category_name: &str,
    ) -> anyhow::Result<ScoredProduct> {
        let body = json!({
            "listing": listing,
            "category": category_name,
        });
        let response: ScoreResponse = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("calling scoring service")?
            .error_for_status()
            .context("scoring service status")?
            .json()
            .await
            .context("decoding scoring response")?;

        Ok(ScoredProduct {
            score: clamp_score(response.score),
            reasons: response.reasons,
            recommendation: response.recommendation,
        })
    }
}

/// A listing enters the daily analysis only when it carries the signals the
/// score is built from.
pub fn qualifies(listing: &MarketplaceListing) -> bool {
    listing.bsr_rank.is_some_and(|r| r > 0)
        && listing.review_count.is_some_and(|c| c > 0)
        && listing.rating.is_some_and(|r| r >= 3.0)
}

/// Deterministic local score used per product when the scoring collaborator
/// is unavailable. Base 50 with bonuses for rank, review volume and rating.
pub fn heuristic_score(listing: &MarketplaceListing) -> ScoredProduct {
    let mut score = 50.0;
    let mut reasons = Vec::new();

    match listing.bsr_rank {
        Some(rank) if rank <= 100 => {
            score += 30.0;
            reasons.push(format!("best-sellers rank #{rank} is inside the top 100"));
        }
        Some(rank) if rank <= 1_000 => {
            score += 20.0;
            reasons.push(format!("best-sellers rank #{rank} is inside the top 1,000"));
        }
        Some(rank) if rank <= 10_000 => {
            score += 10.0;
            reasons.push(format!("best-sellers rank #{rank} is inside the top 10,000"));
        }
        _ => {}
    }

    match listing.review_count {
        Some(count) if count >= 1_000 => {
            score += 15.0;
            reasons.push(format!("{count} reviews show sustained demand"));
        }
        Some(count) if count >= 100 => {
            score += 10.0;
            reasons.push(format!("{count} reviews show steady demand"));
        }
        _ => {}
    }

    match listing.rating {
        Some(rating) if rating >= 4.5 => {
            score += 10.0;
            reasons.push(format!("{rating:.1} star rating"));
        }
        Some(rating) if rating >= 4.0 => {
            score += 5.0;
            reasons.push(format!("{rating:.1} star rating"));
        }
        _ => {}
    }

    ScoredProduct {
        score: clamp_score(score),
        reasons,
        recommendation: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn listing(bsr: Option<u32>, reviews: Option<u32>, rating: Option<f64>) -> MarketplaceListing {
        MarketplaceListing {
            item_id: "B0TEST00AA".to_string(),
            title: "Test".to_string(),
            price: Some(19.99),
            original_price: None,
            rating,
            review_count: reviews,
            bsr_rank: bsr,
            category: None,
            brand: None,
            url: None,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn qualification_needs_rank_reviews_and_rating() {
        assert!(qualifies(&listing(Some(87), Some(100), Some(4.0))));
        assert!(!qualifies(&listing(None, Some(100), Some(4.0))));
        assert!(!qualifies(&listing(Some(87), Some(0), Some(4.0))));
        assert!(!qualifies(&listing(Some(87), Some(100), Some(2.9))));
        assert!(qualifies(&listing(Some(87), Some(100), Some(3.0))));
    }

    #[test]
    fn heuristic_adds_tiered_bonuses_and_caps() {
        // 50 + 30 + 15 + 10 caps at 100.
        let top = heuristic_score(&listing(Some(87), Some(1_200), Some(4.6)));
        assert_eq!(top.score, 100.0);
        assert_eq!(top.reasons.len(), 3);

        // 50 + 20 + 10 + 5.
        let mid = heuristic_score(&listing(Some(450), Some(150), Some(4.1)));
        assert_eq!(mid.score, 85.0);

        // 50 + 10.
        let low = heuristic_score(&listing(Some(9_000), Some(12), Some(3.4)));
        assert_eq!(low.score, 60.0);

        let bare = heuristic_score(&listing(None, None, None));
        assert_eq!(bare.score, 50.0);
        assert!(bare.reasons.is_empty());
    }
}
