//! Keyword search results parser.

use super::{builtin, css_string, raw_text, ParseOutput, RawFields};
use crate::normalize::{build_list_report, ListEntry};
use crate::signal::{normalize_tracked, SearchSignal};
use scraper::{Html, Selector};
use serde_json::json;
use std::sync::OnceLock;

/// Result card container; also the page-ready marker.
pub const READY_SELECTOR: &str = "[data-component-type=\"s-search-result\"]";

/// Default number of results kept from one page.
pub const DEFAULT_SEARCH_LIMIT: usize = 48;

const ID_ATTR: &str = "data-asin";
const SPONSORED_LABEL: &str = ".puis-sponsored-label-text, .s-sponsored-label-text";
const SPONSORED_MARKER: &str = "sponsored";

/// Options for [`parse_search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Identifiers to report on, case-insensitive.
    pub tracked: Vec<String>,
    /// Result cap, [`DEFAULT_SEARCH_LIMIT`] when unset.
    pub limit: Option<usize>,
}

struct SearchSelectors {
    card: Selector,
    sponsored_label: Selector,
}

fn selectors() -> &'static SearchSelectors {
    static SELECTORS: OnceLock<SearchSelectors> = OnceLock::new();
    SELECTORS.get_or_init(|| SearchSelectors {
        card: builtin(READY_SELECTOR),
        sponsored_label: builtin(SPONSORED_LABEL),
    })
}

/// Parse a search results page into the ordered, deduplicated list of
/// result identifiers plus the tracked report.
pub fn parse_search(html: &str, options: &SearchOptions) -> ParseOutput<SearchSignal> {
    let document = Html::parse_document(html);
    let sel = selectors();
    let tracked = normalize_tracked(&options.tracked);
    let limit = options.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

    let mut raw_ids = Vec::new();
    let mut entries = Vec::new();
    for card in document.select(&sel.card) {
        let source = card.value().attr(ID_ATTR).unwrap_or("").trim();
        raw_ids.push(source.to_string());
        if source.is_empty() {
            continue;
        }
        let sponsored = card.select(&sel.sponsored_label).next().is_some()
            || raw_text(card).to_lowercase().contains(SPONSORED_MARKER);
        entries.push(ListEntry {
            id: source.to_ascii_uppercase(),
            sponsored: Some(sponsored),
            selector: format!("{READY_SELECTOR}[{ID_ATTR}={}]", css_string(source)),
        });
    }

    let mut raw = RawFields::new();
    raw.insert("cardCount".into(), json!(raw_ids.len()));
    raw.insert("ids".into(), json!(raw_ids));

    let report = build_list_report(entries, &tracked, limit);
    ParseOutput {
        raw,
        normalized: SearchSignal {
            results: report.results,
            tracked: report.tracked,
        },
        anchors: report.anchors,
    }
}
