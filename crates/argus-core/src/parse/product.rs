//! Product detail page parser.

use super::{builtin, raw_text, ParseOutcome, ParseOutput, RawFields};
use crate::error::{CoreError, Result};
use crate::normalize::{
    clean_text, first_decimal, first_integer, normalize_bullets, normalize_images, DecimalMark,
};
use crate::signal::ProductSignal;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::OnceLock;
use tracing::debug;

/// Element whose presence means the product page finished rendering.
pub const READY_SELECTOR: &str = "#productTitle";

/// Title sources in order. `#title` is the wrapper around `#productTitle`
/// on most layouts, so it is only read when the span is missing or empty.
const TITLE_FALLBACKS: &[&str] = &["#productTitle", "#title"];

/// Tried in order; the first element with non-empty text wins.
const PRICE_FALLBACKS: &[&str] = &[
    "#corePrice_feature_div .a-price .a-offscreen",
    "#corePriceDisplay_desktop_feature_div .a-price .a-offscreen",
    "#priceblock_ourprice",
    "#priceblock_dealprice",
    "#price_inside_buybox",
    ".a-price .a-offscreen",
];

const RATING: &str = "#acrPopover .a-icon-alt, #averageCustomerReviews .a-icon-alt";
/// Element carrying the rating in its `title` attribute.
const RATING_ATTR_SOURCE: &str = "#acrPopover";
const REVIEW_COUNT: &str = "#acrCustomerReviewText";
const REVIEW_COUNT_FALLBACK: &str = "[data-hook=\"total-review-count\"]";
const BULLETS: &str = "#feature-bullets li";
const GALLERY: &str = "#altImages img, #imageBlock img, #landingImage, #main-image-container img";

struct ProductSelectors {
    titles: Vec<Selector>,
    prices: Vec<Selector>,
    rating: Selector,
    rating_attr_source: Selector,
    review_count: Selector,
    review_count_fallback: Selector,
    bullets: Selector,
    gallery: Selector,
}

fn selectors() -> &'static ProductSelectors {
    static SELECTORS: OnceLock<ProductSelectors> = OnceLock::new();
    SELECTORS.get_or_init(|| ProductSelectors {
        titles: TITLE_FALLBACKS.iter().copied().map(builtin).collect(),
        prices: PRICE_FALLBACKS.iter().copied().map(builtin).collect(),
        rating: builtin(RATING),
        rating_attr_source: builtin(RATING_ATTR_SOURCE),
        review_count: builtin(REVIEW_COUNT),
        review_count_fallback: builtin(REVIEW_COUNT_FALLBACK),
        bullets: builtin(BULLETS),
        gallery: builtin(GALLERY),
    })
}

/// Normalized product fields before the title requirement is applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u64>,
    pub bullets: Vec<String>,
    pub image_urls: Vec<String>,
}

impl ProductDraft {
    /// Promote to a signal. A page without a title is not a product page.
    pub fn into_signal(self) -> Result<ProductSignal> {
        let title = self.title.ok_or(CoreError::MissingField("title"))?;
        Ok(ProductSignal {
            title,
            price: self.price,
            rating: self.rating,
            review_count: self.review_count,
            bullets: self.bullets,
            image_urls: self.image_urls,
        })
    }
}

/// Options for [`parse_product`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductOptions {
    /// Number formatting of the storefront the page came from.
    pub decimal_mark: DecimalMark,
}

/// Parse a product detail page.
pub fn parse_product(html: &str, options: &ProductOptions) -> ParseOutput<ProductDraft> {
    let document = Html::parse_document(html);
    let sel = selectors();
    let mark = options.decimal_mark;
    let mut raw = RawFields::new();

    let title_raw = first_text(&document, &sel.titles);
    let title = title_raw.as_deref().and_then(clean_text);
    put(&mut raw, "title", title_raw);

    let price_raw = first_text(&document, &sel.prices);
    let price = price_raw.as_deref().and_then(|t| first_decimal(t, mark));
    put(&mut raw, "price", price_raw);

    let rating_raw = document.select(&sel.rating).next().map(raw_text);
    let rating_attr = document
        .select(&sel.rating_attr_source)
        .next()
        .and_then(|el| el.value().attr("title"))
        .map(str::to_string);
    let rating = rating_raw
        .as_deref()
        .and_then(|t| first_decimal(t, mark))
        .or_else(|| rating_attr.as_deref().and_then(|t| first_decimal(t, mark)));
    put(&mut raw, "rating", rating_raw);
    put(&mut raw, "ratingTitle", rating_attr);

    let reviews_raw = document.select(&sel.review_count).next().map(raw_text);
    let reviews_fallback = document.select(&sel.review_count_fallback).next().map(raw_text);
    let review_count = reviews_raw
        .as_deref()
        .and_then(|t| first_integer(t, mark))
        .or_else(|| reviews_fallback.as_deref().and_then(|t| first_integer(t, mark)));
    put(&mut raw, "reviewCount", reviews_raw);
    put(&mut raw, "reviewCountFallback", reviews_fallback);

    let bullets_raw: Vec<String> = document.select(&sel.bullets).map(raw_text).collect();
    let bullets = normalize_bullets(&bullets_raw);
    raw.insert("bullets".into(), json!(bullets_raw));

    let candidates: Vec<String> = document
        .select(&sel.gallery)
        .filter_map(image_candidate)
        .collect();
    let image_urls = normalize_images(&candidates);
    raw.insert("imageCandidates".into(), json!(candidates));

    ParseOutput {
        raw,
        normalized: ProductDraft {
            title,
            price,
            rating,
            review_count,
            bullets,
            image_urls,
        },
        anchors: Vec::new(),
    }
}

/// Text of the first element with non-empty text, trying selectors in order.
fn first_text(document: &Html, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .filter_map(|s| document.select(s).map(raw_text).find(|t| !t.trim().is_empty()))
        .next()
}

fn put(raw: &mut RawFields, key: &str, value: Option<String>) {
    if let Some(v) = value {
        raw.insert(key.to_string(), Value::String(v));
    }
}

/// Best source URL for one gallery element: the high-resolution override,
/// then the largest entry of the size map, then the plain source.
fn image_candidate(el: ElementRef<'_>) -> Option<String> {
    let attrs = el.value();

    if let Some(hires) = attrs.attr("data-old-hires").map(str::trim) {
        if !hires.is_empty() {
            return Some(hires.to_string());
        }
    }

    if let Some(dynamic) = attrs.attr("data-a-dynamic-image") {
        match largest_dynamic_image(dynamic) {
            ParseOutcome::Ok(Some(url)) => return Some(url),
            ParseOutcome::Ok(None) => {}
            ParseOutcome::Failed(reason) => debug!("unreadable dynamic image map: {reason}"),
        }
    }

    ["src", "data-src"]
        .iter()
        .filter_map(|name| attrs.attr(name))
        .map(str::trim)
        .find(|v| !v.is_empty() && !v.starts_with("data:"))
        .map(str::to_string)
}

/// Pick the URL with the largest width × height from a JSON map of
/// `url → [width, height]`. Entities are decoded first since the map is
/// often embedded with `&quot;` quoting.
fn largest_dynamic_image(encoded: &str) -> ParseOutcome<Option<String>> {
    let decoded = html_escape::decode_html_entities(encoded);
    let map: Map<String, Value> = match ParseOutcome::decode_json(&decoded) {
        ParseOutcome::Ok(map) => map,
        ParseOutcome::Failed(reason) => return ParseOutcome::Failed(reason),
    };

    let mut best: Option<(f64, &String)> = None;
    for (url, dims) in &map {
        let area = dims
            .as_array()
            .map(|d| d.iter().filter_map(Value::as_f64).take(2).product::<f64>())
            .unwrap_or(0.0);
        if best.map_or(true, |(a, _)| area > a) {
            best = Some((area, url));
        }
    }
    ParseOutcome::Ok(best.map(|(_, url)| url.clone()))
}
