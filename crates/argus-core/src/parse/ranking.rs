//! Ranked list (best sellers) parser.

use super::{builtin, css_string, ParseOutput, RawFields};
use crate::normalize::{build_list_report, ListEntry};
use crate::signal::{normalize_tracked, RankingSignal};
use scraper::{Html, Selector};
use serde_json::json;
use std::sync::OnceLock;

/// Any of the ranking containers; used as the page-ready marker. Lists
/// exactly the selectors in `CONTAINERS`.
pub const READY_SELECTOR: &str =
    "div.p13n-desktop-grid, #zg-ordered-list, #zg-center-div, #gridItemRoot";

/// Default number of ranked entries kept.
pub const DEFAULT_RANKING_LIMIT: usize = 100;

/// Ranking containers in order of preference. Only the first selector
/// present on the page is read, across every element it matches: the
/// grid-item layout repeats `#gridItemRoot` once per entry.
const CONTAINERS: &[&str] = &[
    "div.p13n-desktop-grid",
    "#zg-ordered-list",
    "#zg-center-div",
    "#gridItemRoot",
];
const ID_ATTR: &str = "data-asin";
const ITEM: &str = "[data-asin]";

/// Options for [`parse_ranking`].
#[derive(Debug, Clone, Default)]
pub struct RankingOptions {
    /// Identifiers to report on, case-insensitive.
    pub tracked: Vec<String>,
    /// Entry cap, [`DEFAULT_RANKING_LIMIT`] when unset.
    pub limit: Option<usize>,
}

struct RankingSelectors {
    containers: Vec<(&'static str, Selector)>,
    item: Selector,
}

fn selectors() -> &'static RankingSelectors {
    static SELECTORS: OnceLock<RankingSelectors> = OnceLock::new();
    SELECTORS.get_or_init(|| RankingSelectors {
        containers: CONTAINERS.iter().map(|c| (*c, builtin(*c))).collect(),
        item: builtin(ITEM),
    })
}

/// Parse a ranked list page.
///
/// A tracked identifier that appears more than once is reported at its
/// first position.
pub fn parse_ranking(html: &str, options: &RankingOptions) -> ParseOutput<RankingSignal> {
    let document = Html::parse_document(html);
    let sel = selectors();
    let tracked = normalize_tracked(&options.tracked);
    let limit = options.limit.unwrap_or(DEFAULT_RANKING_LIMIT);

    let mut raw = RawFields::new();
    let mut raw_ids = Vec::new();
    let mut entries = Vec::new();

    let container = sel.containers.iter().find_map(|(css, s)| {
        let roots: Vec<_> = document.select(s).collect();
        (!roots.is_empty()).then_some((*css, roots))
    });

    if let Some((css, roots)) = container {
        raw.insert("container".into(), json!(css));
        for item in roots.iter().flat_map(|root| root.select(&sel.item)) {
            let source = item.value().attr(ID_ATTR).unwrap_or("").trim();
            raw_ids.push(source.to_string());
            if source.is_empty() {
                continue;
            }
            entries.push(ListEntry {
                id: source.to_ascii_uppercase(),
                sponsored: None,
                selector: format!("{css} [{ID_ATTR}={}]", css_string(source)),
            });
        }
    }

    raw.insert("itemCount".into(), json!(raw_ids.len()));
    raw.insert("ids".into(), json!(raw_ids));

    let report = build_list_report(entries, &tracked, limit);
    ParseOutput {
        raw,
        normalized: RankingSignal {
            results: report.results,
            tracked: report.tracked,
        },
        anchors: report.anchors,
    }
}
