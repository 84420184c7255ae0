//! Deterministic top-N ranking of scored listings within a category.

use std::cmp::Ordering;

use chrono::NaiveDate;

use hotlist_core::{CategoryScore, MarketplaceListing};

use crate::score::ScoredProduct;

/// Order by score descending; ties break on ascending best-sellers rank
/// (missing rank sorts last), then ascending item id, so a rerun over the
/// same input commits the identical ranking.
pub fn rank_top_n(
    category_id: i64,
    recommend_date: NaiveDate,
    mut scored: Vec<(MarketplaceListing, ScoredProduct)>,
    n: usize,
) -> Vec<CategoryScore> {
    scored.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| bsr_key(&a.0).cmp(&bsr_key(&b.0)))
            .then_with(|| a.0.item_id.cmp(&b.0.item_id))
    });
    scored.truncate(n);

    scored
        .into_iter()
        .enumerate()
        .map(|(index, (listing, product))| CategoryScore {
            product_id: listing.item_id,
            category_id,
            score: product.score,
            rank_in_category: index as u32 + 1,
            recommend_date,
            reasons: product.reasons,
            recommendation: product.recommendation,
        })
        .collect()
}

fn bsr_key(listing: &MarketplaceListing) -> u32 {
    listing.bsr_rank.unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hotlist_core::TOP_N_PER_CATEGORY;

    fn entry(item_id: &str, bsr: Option<u32>, score: f64) -> (MarketplaceListing, ScoredProduct) {
        (
            MarketplaceListing {
                item_id: item_id.to_string(),
                title: format!("Gadget {item_id}"),
                price: Some(24.99),
                original_price: None,
                rating: Some(4.2),
                review_count: Some(340),
                bsr_rank: bsr,
                category: Some("Kitchen Gadgets".to_string()),
                brand: None,
                url: None,
                fetched_at: Utc::now(),
            },
            ScoredProduct {
                score,
                reasons: vec![],
                recommendation: None,
            },
        )
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 20).unwrap()
    }

    #[test]
    fn twenty_five_candidates_commit_a_dense_top_twenty() {
        // Kitchen Gadgets, 25 qualifying products with distinct scores.
        let scored: Vec<_> = (0..25)
            .map(|i| entry(&format!("B0GADGET{i:03}"), Some(100 + i), 95.0 - i as f64))
            .collect();

        let ranked = rank_top_n(7, date(), scored, TOP_N_PER_CATEGORY);

        assert_eq!(ranked.len(), 20);
        for (index, row) in ranked.iter().enumerate() {
            assert_eq!(row.rank_in_category, index as u32 + 1);
            assert_eq!(row.category_id, 7);
            assert_eq!(row.recommend_date, date());
        }
        assert_eq!(ranked[0].product_id, "B0GADGET000");
        assert_eq!(ranked[0].score, 95.0);
        // The five weakest scores fell off the bottom.
        assert!(ranked.iter().all(|r| r.score >= 95.0 - 19.0));
    }

    #[test]
    fn ties_break_on_bsr_then_item_id() {
        let scored = vec![
            entry("B0GADGETZZ", Some(500), 90.0),
            entry("B0GADGETAA", Some(500), 90.0),
            entry("B0GADGETMM", Some(40), 90.0),
            entry("B0GADGETNN", None, 90.0),
        ];
        let ranked = rank_top_n(7, date(), scored, TOP_N_PER_CATEGORY);
        let order: Vec<_> = ranked.iter().map(|r| r.product_id.as_str()).collect();
        // Better (lower) rank first, equal ranks alphabetical, missing rank
        // last.
        assert_eq!(
            order,
            vec!["B0GADGETMM", "B0GADGETAA", "B0GADGETZZ", "B0GADGETNN"]
        );
    }

    #[test]
    fn reruns_over_the_same_input_are_identical() {
        let scored: Vec<_> = (0..25)
            .map(|i| entry(&format!("B0GADGET{i:03}"), Some(200), 80.0))
            .collect();
        let first = rank_top_n(7, date(), scored.clone(), TOP_N_PER_CATEGORY);
        let second = rank_top_n(7, date(), scored, TOP_N_PER_CATEGORY);
        assert_eq!(first, second);
    }
}
