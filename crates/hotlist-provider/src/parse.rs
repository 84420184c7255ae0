//! HTML extraction for marketplace pages fetched through the unlocker API.
//!
//! Selectors track the marketplace's rendered markup; parsing is lenient and
//! record-level: a field that will not parse becomes `None`, a record without
//! its natural key is dropped.

use chrono::{NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use hotlist_core::{MarketplaceListing, MarketplaceReview, SupplierOffer};

use crate::client::ProviderError;

fn sel(selector: &str) -> Result<Selector, ProviderError> {
    Selector::parse(selector).map_err(|e| ProviderError::Parse(e.to_string()))
}

/// The marketplace's stable item identifier: ten uppercase alphanumerics
/// after a `/dp/` path segment.
pub fn extract_item_id(url: &str) -> Option<String> {
    let start = url.find("/dp/")? + 4;
    let id: String = url[start..]
        .chars()
        .take_while(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .take(10)
        .collect();
    (id.len() == 10).then_some(id)
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

/// "$19.99" / "19,99 €" style price text. A two-digit group after the last
/// separator is the decimal part; every other separator groups thousands.
fn parse_money(text: &str) -> Option<f64> {
    let raw: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let (int_part, frac_part) = match raw.rfind(['.', ',']) {
        Some(idx) if raw.len() - idx - 1 == 2 => (&raw[..idx], &raw[idx + 1..]),
        _ => (raw.as_str(), ""),
    };
    let mut cleaned: String = int_part.chars().filter(char::is_ascii_digit).collect();
    if !frac_part.is_empty() {
        cleaned.push('.');
        cleaned.push_str(frac_part);
    }
    cleaned.parse().ok().filter(|p: &f64| *p > 0.0)
}

/// "1,234" style counts.
fn parse_count(text: &str) -> Option<u32> {
    let cleaned: String = text.chars().filter(char::is_ascii_digit).collect();
    cleaned.parse().ok().filter(|c: &u32| *c > 0)
}

/// "4.5 out of 5 stars" rating labels.
fn parse_rating(text: &str) -> Option<f64> {
    text.split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
        .filter(|r: &f64| (0.0..=5.0).contains(r))
}

fn is_challenge_page(html: &str) -> bool {
    html.contains("Type the characters you see in this image")
        || html.contains("enter the characters you see below")
        || html.contains("CAPTCHA")
}

pub(crate) fn search_listings(
    html: &str,
    host: &str,
) -> Result<Vec<MarketplaceListing>, ProviderError> {
    if is_challenge_page(html) {
        warn!("marketplace served a challenge page instead of search results");
        return Ok(Vec::new());
    }

    let doc = Html::parse_document(html);
    let result_sel = sel("[data-component-type='s-search-result']")?;
    let link_sel = sel("a[href*='/dp/']")?;
    let title_sel = sel("h2 a span, h2 span, span.a-size-base-plus")?;
    let price_sel = sel("span.a-price .a-offscreen")?;
    let rating_sel = sel("span.a-icon-alt")?;
    let reviews_sel = sel("span.a-size-base")?;

    let fetched_at = Utc::now();
    let mut listings = Vec::new();

    for element in doc.select(&result_sel).take(20) {
        let item_id = element
            .value()
            .attr("data-asin")
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .or_else(|| {
                element
                    .select(&link_sel)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .and_then(extract_item_id)
            });
        let Some(item_id) = item_id else {
            debug!("search result without an item id, skipping");
            continue;
        };

        let listing = MarketplaceListing {
            url: Some(format!("https://{host}/dp/{item_id}")),
            item_id,
            title: first_text(element, &title_sel).unwrap_or_default(),
            price: first_text(element, &price_sel).and_then(|t| parse_money(&t)),
            original_price: None,
            rating: first_text(element, &rating_sel).and_then(|t| parse_rating(&t)),
            review_count: first_text(element, &reviews_sel).and_then(|t| parse_count(&t)),
            bsr_rank: None,
            category: None,
            brand: None,
            fetched_at,
        };
        if listing.is_valid() {
            listings.push(listing);
        }
    }

    debug!(count = listings.len(), "parsed search results");
    Ok(listings)
}

pub(crate) fn listing_detail(
    html: &str,
    item_id: &str,
    url: &str,
) -> Result<MarketplaceListing, ProviderError> {
    let doc = Html::parse_document(html);
    let title_sel = sel("#productTitle, h1.product-title")?;
    let price_sel = sel(".a-price .a-offscreen, #priceblock_ourprice")?;
    let list_price_sel = sel("span.a-price.a-text-price .a-offscreen")?;
    let rating_sel = sel("[data-hook='average-star-rating'] span.a-icon-alt, span.a-icon-alt")?;
    let reviews_sel = sel("[data-hook='total-review-count'], #acrCustomerReviewText")?;
    let brand_sel = sel("#bylineInfo")?;

    let root = doc.root_element();
    let listing = MarketplaceListing {
        item_id: item_id.to_string(),
        title: first_text(root, &title_sel).unwrap_or_default(),
        price: first_text(root, &price_sel).and_then(|t| parse_money(&t)),
        original_price: first_text(root, &list_price_sel).and_then(|t| parse_money(&t)),
        rating: first_text(root, &rating_sel).and_then(|t| parse_rating(&t)),
        review_count: first_text(root, &reviews_sel).and_then(|t| parse_count(&t)),
        bsr_rank: best_sellers_rank(&root),
        category: None,
        brand: first_text(root, &brand_sel),
        url: Some(url.to_string()),
        fetched_at: Utc::now(),
    };

    if listing.is_valid() {
        Ok(listing)
    } else {
        Err(ProviderError::Parse(format!(
            "detail page for {item_id} yielded no usable fields"
        )))
    }
}

/// The rank lives in a free-text detail bullet ("Best Sellers Rank: #87 in
/// ..."), not in addressable markup, so it is pulled from the page text.
fn best_sellers_rank(root: &ElementRef<'_>) -> Option<u32> {
    let text: String = root.text().collect();
    let after = &text[text.find("Best Sellers Rank")? ..];
    let hash = after.find('#')?;
    parse_count(
        &after[hash + 1..]
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == ',')
            .collect::<String>(),
    )
}

pub(crate) fn listing_reviews(
    html: &str,
    item_id: &str,
) -> Result<Vec<MarketplaceReview>, ProviderError> {
    let doc = Html::parse_document(html);
    let review_sel = sel("[data-hook='review']")?;
    let star_sel = sel("[data-hook='review-star-rating'] i")?;
    let title_sel = sel("[data-hook='review-title'] span")?;
    let body_sel = sel("[data-hook='review-body'] span")?;
    let date_sel = sel("[data-hook='review-date']")?;
    let helpful_sel = sel("[data-hook='helpful-vote-statement']")?;

    let fetched_at = Utc::now();
    let mut reviews = Vec::new();

    for element in doc.select(&review_sel).take(20) {
        let Some(review_id) = element.value().attr("id").filter(|id| !id.is_empty()) else {
            continue;
        };
        let review = MarketplaceReview {
            review_id: review_id.to_string(),
            item_id: item_id.to_string(),
            rating: element
                .select(&star_sel)
                .next()
                .and_then(|i| i.value().attr("class"))
                .and_then(star_class_rating),
            title: first_text(element, &title_sel),
            body: first_text(element, &body_sel),
            helpful_votes: first_text(element, &helpful_sel).and_then(|t| parse_count(&t)),
            review_date: first_text(element, &date_sel).and_then(|t| parse_review_date(&t)),
            fetched_at,
        };
        if review.is_valid() {
            reviews.push(review);
        }
    }

    debug!(count = reviews.len(), item_id, "parsed reviews");
    Ok(reviews)
}

/// "a-icon a-icon-star a-star-4" class lists; "a-star-4-5" marks a half
/// star.
fn star_class_rating(class: &str) -> Option<f64> {
    let suffix = &class[class.find("a-star-")? + 7..];
    let mut groups = suffix
        .split(|c: char| !c.is_ascii_digit())
        .take_while(|g| !g.is_empty());
    let whole: f64 = groups.next()?.parse().ok()?;
    let rating = match groups.next() {
        Some("5") => whole + 0.5,
        _ => whole,
    };
    (1.0..=5.0).contains(&rating).then_some(rating)
}

/// "Reviewed in the United States on January 15, 2025".
fn parse_review_date(text: &str) -> Option<NaiveDate> {
    let date_part = text.rsplit(" on ").next()?.trim();
    NaiveDate::parse_from_str(date_part, "%B %d, %Y")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%B %e, %Y"))
        .ok()
}

pub(crate) fn supplier_offers(html: &str) -> Result<Vec<SupplierOffer>, ProviderError> {
    let doc = Html::parse_document(html);
    let offer_sel = sel(".offer-item, .offer-card, .sw-item")?;
    let link_sel = sel("a[href*='offer']")?;
    let title_sel = sel(".offer-title, .title-text")?;
    let price_sel = sel(".price-value, .price-text, .offer-price")?;
    let supplier_sel = sel(".company-name, .supplier-name")?;

    let fetched_at = Utc::now();
    let mut offers = Vec::new();

    for element in doc.select(&offer_sel).take(20) {
        let Some(link) = element.select(&link_sel).next() else {
            continue;
        };
        let url = link.value().attr("href").unwrap_or_default().to_string();
        let Some(offer_id) = offer_id_from_url(&url) else {
            continue;
        };
        let offer = SupplierOffer {
            offer_id,
            title: first_text(element, &title_sel)
                .or_else(|| link.value().attr("title").map(str::to_string))
                .unwrap_or_default(),
            unit_price: first_text(element, &price_sel).and_then(|t| parse_money(&t)),
            min_order_quantity: None,
            orders_count: None,
            supplier: first_text(element, &supplier_sel),
            url: Some(url),
            fetched_at,
        };
        if offer.is_valid() {
            offers.push(offer);
        }
    }

    Ok(offers)
}

/// "/offer/123456789.html" style sourcing-marketplace links.
fn offer_id_from_url(url: &str) -> Option<String> {
    let start = url.find("/offer/")? + 7;
    let id: String = url[start..].chars().take_while(char::is_ascii_digit).collect();
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_PAGE: &str = r#"
        <html><body>
          <div data-component-type="s-search-result" data-asin="B0FROTHER1">
            <h2><a href="/dp/B0FROTHER1"><span>Stainless Milk Frother</span></a></h2>
            <span class="a-price"><span class="a-offscreen">$19.99</span></span>
            <span class="a-icon-alt">4.6 out of 5 stars</span>
            <span class="a-size-base">1,234</span>
          </div>
          <div data-component-type="s-search-result" data-asin="">
            <a href="/dp/B0FROTHER2?ref=sr_1_2"><span class="a-size-base-plus">Budget Frother</span></a>
            <span class="a-price"><span class="a-offscreen">$9.99</span></span>
          </div>
          <div data-component-type="s-search-result" data-asin="B0NOSIGNAL">
            <h2><a href="/dp/B0NOSIGNAL"><span>Listing with no numeric data</span></a></h2>
          </div>
        </body></html>"#;

    #[test]
    fn search_page_yields_valid_listings_only() {
        let listings = search_listings(SEARCH_PAGE, "www.amazon.com").unwrap();
        assert_eq!(listings.len(), 2);

        assert_eq!(listings[0].item_id, "B0FROTHER1");
        assert_eq!(listings[0].title, "Stainless Milk Frother");
        assert_eq!(listings[0].price, Some(19.99));
        assert_eq!(listings[0].rating, Some(4.6));
        assert_eq!(listings[0].review_count, Some(1234));
        assert_eq!(
            listings[0].url.as_deref(),
            Some("https://www.amazon.com/dp/B0FROTHER1")
        );

        // Second record had no data-asin and falls back to the link href.
        assert_eq!(listings[1].item_id, "B0FROTHER2");
    }

    #[test]
    fn challenge_page_parses_to_nothing() {
        let html = "<html><body>Type the characters you see in this image</body></html>";
        assert!(search_listings(html, "www.amazon.com").unwrap().is_empty());
    }

    #[test]
    fn detail_page_extracts_rank_and_list_price() {
        let html = r#"
            <html><body>
              <span id="productTitle"> Stainless Milk Frother </span>
              <span class="a-price"><span class="a-offscreen">$19.99</span></span>
              <span class="a-price a-text-price"><span class="a-offscreen">$29.99</span></span>
              <span class="a-icon-alt">4.6 out of 5 stars</span>
              <span data-hook="total-review-count">1,234 ratings</span>
              <ul><li>Best Sellers Rank: #1,087 in Kitchen &amp; Dining</li></ul>
            </body></html>"#;
        let listing =
            listing_detail(html, "B0FROTHER1", "https://www.amazon.com/dp/B0FROTHER1").unwrap();
        assert_eq!(listing.title, "Stainless Milk Frother");
        assert_eq!(listing.price, Some(19.99));
        assert_eq!(listing.original_price, Some(29.99));
        assert_eq!(listing.bsr_rank, Some(1087));
        assert!(listing.has_discount());
    }

    #[test]
    fn unusable_detail_page_is_a_parse_error() {
        let err = listing_detail("<html></html>", "B0FROTHER1", "u").unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[test]
    fn reviews_parse_stars_date_and_votes() {
        let html = r#"
            <html><body>
              <div data-hook="review" id="R1ABCD">
                <span data-hook="review-star-rating"><i class="a-icon a-star-5"></i></span>
                <span data-hook="review-title"><span>Love it</span></span>
                <span data-hook="review-body"><span>Froths perfectly.</span></span>
                <span data-hook="review-date">Reviewed in the United States on January 15, 2025</span>
                <span data-hook="helpful-vote-statement">12 people found this helpful</span>
              </div>
              <div data-hook="review" id="R2EFGH">
                <span data-hook="review-star-rating"><i class="a-icon a-star-4-5"></i></span>
                <span data-hook="helpful-vote-statement">3 people found this helpful</span>
              </div>
              <div data-hook="review" id="R3IJKL">
                <span data-hook="review-star-rating"><i class="a-icon a-star-"></i></span>
                <span data-hook="helpful-vote-statement">1 person found this helpful</span>
              </div>
              <div data-hook="review">
                <span data-hook="review-body"><span>no id, dropped</span></span>
              </div>
            </body></html>"#;
        let reviews = listing_reviews(html, "B0FROTHER1").unwrap();
        assert_eq!(reviews.len(), 3);
        assert_eq!(reviews[0].review_id, "R1ABCD");
        assert_eq!(reviews[0].rating, Some(5.0));
        assert_eq!(reviews[0].helpful_votes, Some(12));
        assert_eq!(
            reviews[0].review_date,
            NaiveDate::from_ymd_opt(2025, 1, 15)
        );
        assert_eq!(reviews[1].rating, Some(4.5));
        // A truncated star class drops the rating, not the review.
        assert_eq!(reviews[2].rating, None);
        assert_eq!(reviews[2].helpful_votes, Some(1));
    }

    #[test]
    fn star_classes_parse_whole_and_half_stars() {
        assert_eq!(star_class_rating("a-icon a-icon-star a-star-5"), Some(5.0));
        assert_eq!(star_class_rating("a-icon a-star-4-5"), Some(4.5));
        assert_eq!(star_class_rating("a-icon a-star-"), None);
        assert_eq!(star_class_rating("a-icon a-star-9"), None);
        assert_eq!(star_class_rating("a-icon"), None);
    }

    #[test]
    fn money_parses_dot_and_comma_decimal_forms() {
        assert_eq!(parse_money("$19.99"), Some(19.99));
        assert_eq!(parse_money("19,99 €"), Some(19.99));
        assert_eq!(parse_money("1.234,56 €"), Some(1234.56));
        assert_eq!(parse_money("$1,234.56"), Some(1234.56));
        assert_eq!(parse_money("$1,234"), Some(1234.0));
        assert_eq!(parse_money("free"), None);
    }

    #[test]
    fn supplier_offers_need_an_offer_id_and_price() {
        let html = r#"
            <html><body>
              <div class="offer-item">
                <a href="https://detail.1688.com/offer/73301129.html" title="Frother wand"></a>
                <div class="offer-title">Frother wand bulk</div>
                <div class="offer-price">2.35</div>
                <div class="company-name">Yiwu Housewares</div>
              </div>
              <div class="offer-item">
                <a href="https://detail.1688.com/offer/999.html"></a>
              </div>
            </body></html>"#;
        let offers = supplier_offers(html).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].offer_id, "73301129");
        assert_eq!(offers[0].unit_price, Some(2.35));
        assert_eq!(offers[0].supplier.as_deref(), Some("Yiwu Housewares"));
    }

    #[test]
    fn item_id_extraction_requires_dp_segment() {
        assert_eq!(
            extract_item_id("https://www.amazon.com/dp/B0FROTHER1?ref=x"),
            Some("B0FROTHER1".to_string())
        );
        assert_eq!(extract_item_id("https://www.amazon.com/dp/short"), None);
        assert_eq!(extract_item_id("https://www.amazon.com/gp/foo"), None);
    }
}
