//! Field normalization: text cleanup, numeric parsing, list shaping.

use crate::images::{canonical_image_url, dedupe_and_cap};
use crate::parse::Anchor;
use crate::signal::TrackedHit;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn decimal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("static regex"))
}

fn integer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("static regex"))
}

/// Trim and collapse internal whitespace. Empty text is absent.
pub fn clean_text(text: &str) -> Option<String> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Decimal separator used by a storefront's number formatting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimalMark {
    /// `1,299.00`
    #[default]
    Point,
    /// `1.299,00` and `1 299,00`
    Comma,
}

impl DecimalMark {
    /// Rewrite `text` so the only separator left is a `.` decimal point.
    fn canonical(self, text: &str) -> String {
        match self {
            Self::Point => text.replace(',', ""),
            Self::Comma => text
                .chars()
                .filter(|c| !matches!(c, '.' | '\u{a0}' | '\u{202f}'))
                .map(|c| if c == ',' { '.' } else { c })
                .collect(),
        }
    }
}

/// First decimal number in the text, thousands separators removed.
///
/// With [`DecimalMark::Point`], `"$1,299.00"` → `1299.0`; with
/// [`DecimalMark::Comma`], `"1.299,00 €"` → `1299.0`.
pub fn first_decimal(text: &str, mark: DecimalMark) -> Option<f64> {
    let canonical = mark.canonical(text);
    decimal_regex()
        .find(&canonical)
        .and_then(|m| m.as_str().parse().ok())
}

/// First integer in the text, thousands separators removed.
pub fn first_integer(text: &str, mark: DecimalMark) -> Option<u64> {
    let canonical = mark.canonical(text);
    integer_regex()
        .find(&canonical)
        .and_then(|m| m.as_str().parse().ok())
}

/// Canonicalize, deduplicate and cap gallery candidates.
pub fn normalize_images<S: AsRef<str>>(candidates: &[S]) -> Vec<String> {
    dedupe_and_cap(
        candidates
            .iter()
            .filter_map(|c| canonical_image_url(c.as_ref())),
    )
}

/// Non-empty cleaned bullet texts, in page order.
pub fn normalize_bullets<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    items.iter().filter_map(|b| clean_text(b.as_ref())).collect()
}

/// One entry of a result list as found in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Uppercased identifier.
    pub id: String,
    /// Sponsorship marker, `None` where the page kind has no such concept.
    pub sponsored: Option<bool>,
    /// Selector matching the entry's element.
    pub selector: String,
}

/// Shaped result list plus the tracked report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListReport {
    pub results: Vec<String>,
    pub tracked: Vec<TrackedHit>,
    pub anchors: Vec<Anchor>,
}

/// Deduplicate entries (first occurrence wins), cap at `limit`, and
/// report found/position for each tracked identifier.
///
/// The tracked set never filters the results; it only decides which
/// entries get a report line.
pub fn build_list_report(entries: Vec<ListEntry>, tracked: &[String], limit: usize) -> ListReport {
    let mut kept: Vec<ListEntry> = Vec::new();
    for entry in entries {
        if kept.len() >= limit {
            break;
        }
        if entry.id.is_empty() || kept.iter().any(|k| k.id == entry.id) {
            continue;
        }
        kept.push(entry);
    }

    let mut hits = Vec::with_capacity(tracked.len());
    let mut anchors = Vec::new();
    for id in tracked {
        match kept.iter().position(|e| &e.id == id) {
            Some(idx) => {
                let entry = &kept[idx];
                let position = (idx + 1) as u32;
                hits.push(TrackedHit {
                    id: id.clone(),
                    found: true,
                    position: Some(position),
                    sponsored: entry.sponsored,
                });
                anchors.push(Anchor {
                    id: id.clone(),
                    position,
                    selector: entry.selector.clone(),
                });
            }
            None => hits.push(TrackedHit::missing(id.clone())),
        }
    }

    ListReport {
        results: kept.into_iter().map(|e| e.id).collect(),
        tracked: hits,
        anchors,
    }
}
