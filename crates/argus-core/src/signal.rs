//! Normalized signal types.
//!
//! A signal is the canonical value extracted from one capture. Optional
//! fields are omitted from serialization when absent so "not observed"
//! never collides with an observed zero or empty string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What kind of page a target observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A single item detail page.
    Product,
    /// A keyword search results page.
    Search,
    /// A ranked list (best sellers and similar).
    Ranking,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Search => "search",
            Self::Ranking => "ranking",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "product" | "asin" | "item" => Ok(Self::Product),
            "search" | "keyword" => Ok(Self::Search),
            "ranking" | "bestsellers" | "list" => Ok(Self::Ranking),
            other => Err(format!("unknown target kind: {other}")),
        }
    }
}

/// Canonical view of a product detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSignal {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u64>,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

/// Whether and where a tracked identifier appeared in a result list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedHit {
    pub id: String,
    pub found: bool,
    /// 1-based position within the (deduplicated, capped) result list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    /// Only reported by search pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsored: Option<bool>,
}

impl TrackedHit {
    pub fn missing(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            found: false,
            position: None,
            sponsored: None,
        }
    }
}

/// Canonical view of a search results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSignal {
    pub results: Vec<String>,
    pub tracked: Vec<TrackedHit>,
}

/// Canonical view of a ranked list page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingSignal {
    pub results: Vec<String>,
    pub tracked: Vec<TrackedHit>,
}

/// The normalized extraction of a single capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NormalizedSignal {
    Product(ProductSignal),
    Search(SearchSignal),
    Ranking(RankingSignal),
}

impl NormalizedSignal {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Product(_) => TargetKind::Product,
            Self::Search(_) => TargetKind::Search,
            Self::Ranking(_) => TargetKind::Ranking,
        }
    }

    /// Tracked identifier report, empty for product pages.
    pub fn tracked(&self) -> &[TrackedHit] {
        match self {
            Self::Product(_) => &[],
            Self::Search(s) => &s.tracked,
            Self::Ranking(r) => &r.tracked,
        }
    }
}

/// Normalize a set of tracked identifiers: trimmed, uppercased,
/// deduplicated in first-seen order, empties dropped.
pub fn normalize_tracked<S: AsRef<str>>(ids: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.as_ref().trim().to_ascii_uppercase();
        if !id.is_empty() && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_optionals_are_omitted() {
        let signal = ProductSignal {
            title: "Widget".into(),
            price: None,
            rating: Some(0.0),
            review_count: None,
            bullets: vec![],
            image_urls: vec![],
        };
        let json = serde_json::to_value(&signal).unwrap();
        assert!(json.get("price").is_none());
        assert_eq!(json["rating"], serde_json::json!(0.0));
    }

    #[test]
    fn test_signal_tagged_by_kind() {
        let signal = NormalizedSignal::Search(SearchSignal {
            results: vec!["B0001".into()],
            tracked: vec![TrackedHit::missing("B0009")],
        });
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["kind"], "search");
        let back: NormalizedSignal = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), TargetKind::Search);
    }

    #[test]
    fn test_normalize_tracked() {
        let ids = normalize_tracked(&[" b0002", "B0003", "B0002", ""]);
        assert_eq!(ids, vec!["B0002", "B0003"]);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Search".parse::<TargetKind>().unwrap(), TargetKind::Search);
        assert!("video".parse::<TargetKind>().is_err());
    }
}
