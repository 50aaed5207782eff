//! HTML parsers for the three page kinds.
//!
//! Each parser returns a [`ParseOutput`]: a loose `raw` map of the text it
//! found (debugging only, never hashed or diffed), the typed normalized
//! value, and anchors pointing back at the markup for tracked results.
//!
//! Parsers never fail on missing fields. Deciding that a page without a
//! title or without results is unusable is the caller's job.

pub mod product;
pub mod ranking;
pub mod search;

pub use product::{parse_product, ProductDraft, ProductOptions};
pub use ranking::{parse_ranking, RankingOptions};
pub use search::{parse_search, SearchOptions};

use crate::error::{CoreError, Result};
use scraper::{ElementRef, Selector};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Loosely typed debug capture of the source fields.
pub type RawFields = BTreeMap<String, Value>;

/// Output of a parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseOutput<T> {
    pub raw: RawFields,
    pub normalized: T,
    #[serde(default)]
    pub anchors: Vec<Anchor>,
}

/// Where a found tracked identifier sits in the markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: String,
    /// 1-based position in the result list.
    pub position: u32,
    /// CSS selector matching the result element.
    pub selector: String,
}

/// Outcome of decoding a loosely typed blob embedded in the page.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    Ok(T),
    Failed(String),
}

impl<T> ParseOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Ok(v) => Some(v),
            Self::Failed(_) => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

impl<T: DeserializeOwned> ParseOutcome<T> {
    /// Decode a JSON document.
    pub fn decode_json(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(v) => Self::Ok(v),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

pub(crate) fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| CoreError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{e:?}"),
    })
}

/// Compile a selector that is a compile-time constant of this crate.
pub(crate) fn builtin(selector: &'static str) -> Selector {
    compile(selector).unwrap_or_else(|e| panic!("built-in selector is invalid: {e}"))
}

/// All text under an element, unmodified.
pub(crate) fn raw_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

/// Quote a value for use inside a CSS attribute selector.
pub(crate) fn css_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
