//! Offline parse of a saved HTML page.

use crate::cli::output::{self, Styled};
use crate::config::ArgusConfig;
use anyhow::{anyhow, bail, Context, Result};
use argus_core::parse::{ProductOptions, RankingOptions, SearchOptions};
use argus_core::{
    fingerprint, parse_product, parse_ranking, parse_search, DecimalMark, NormalizedSignal,
    TargetKind,
};
use serde_json::{json, Value};
use std::path::Path;

/// How to read a saved page.
#[derive(Debug, Clone, Default)]
pub struct ParseRequest {
    pub tracked: Vec<String>,
    pub limit: Option<usize>,
    pub decimal_mark: DecimalMark,
}

/// Parse `html` as a page of `kind` and report raw fields, the normalized
/// signal, anchors and the fingerprint.
pub fn parse_document(kind: TargetKind, html: &str, request: &ParseRequest) -> Result<Value> {
    let tracked = &request.tracked;
    let limit = request.limit;
    let (raw, signal, anchors) = match kind {
        TargetKind::Product => {
            let options = ProductOptions {
                decimal_mark: request.decimal_mark,
            };
            let out = parse_product(html, &options);
            let signal = out
                .normalized
                .into_signal()
                .context("page has no product title")?;
            (out.raw, NormalizedSignal::Product(signal), out.anchors)
        }
        TargetKind::Search => {
            let options = SearchOptions {
                tracked: tracked.to_vec(),
                limit,
            };
            let out = parse_search(html, &options);
            if out.normalized.results.is_empty() {
                bail!("page has no search results");
            }
            (out.raw, NormalizedSignal::Search(out.normalized), out.anchors)
        }
        TargetKind::Ranking => {
            let options = RankingOptions {
                tracked: tracked.to_vec(),
                limit,
            };
            let out = parse_ranking(html, &options);
            if out.normalized.results.is_empty() {
                bail!("page has no ranked results");
            }
            (out.raw, NormalizedSignal::Ranking(out.normalized), out.anchors)
        }
    };

    let hash = fingerprint(&signal)?;
    Ok(json!({
        "kind": kind,
        "raw": raw,
        "normalized": signal,
        "anchors": anchors,
        "contentHash": hash,
    }))
}

/// Parse a saved page using the number formatting of `marketplace`.
pub fn run(
    config: &ArgusConfig,
    kind: TargetKind,
    file: &Path,
    marketplace: &str,
    tracked: &[String],
    limit: Option<usize>,
) -> Result<()> {
    let storefront = config
        .marketplace(marketplace)
        .ok_or_else(|| anyhow!("unknown marketplace '{marketplace}'"))?;
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let request = ParseRequest {
        tracked: tracked.to_vec(),
        limit,
        decimal_mark: storefront.decimal_mark,
    };
    let report = parse_document(kind, &html, &request)?;

    if output::is_json() {
        output::print_json(&report);
        return Ok(());
    }

    let s = Styled::new();
    if !output::is_quiet() {
        eprintln!("  {} Parsed {} as {kind}", s.ok_sym(), file.display());
        eprintln!("    fingerprint: {}", report["contentHash"].as_str().unwrap_or("?"));
    }
    output::print_json(&report["normalized"]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_document() {
        let html = r#"
            <div data-component-type="s-search-result" data-asin="B0001"></div>
            <div data-component-type="s-search-result" data-asin="B0002"></div>
        "#;
        let request = ParseRequest {
            tracked: vec!["b0002".into()],
            ..ParseRequest::default()
        };
        let report = parse_document(TargetKind::Search, html, &request).unwrap();
        assert_eq!(report["kind"], "search");
        assert_eq!(report["normalized"]["results"], json!(["B0001", "B0002"]));
        assert_eq!(report["normalized"]["tracked"][0]["position"], 2);
        assert_eq!(report["anchors"].as_array().unwrap().len(), 1);
        assert_eq!(report["contentHash"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_product_without_title_is_an_error() {
        let err = parse_document(TargetKind::Product, "<html></html>", &ParseRequest::default())
            .unwrap_err();
        assert!(err.to_string().contains("no product title"));
    }

    #[test]
    fn test_product_document_uses_decimal_mark() {
        let html = "<span id=\"productTitle\">Bouilloire</span>\
                    <span id=\"priceblock_ourprice\">1\u{202f}049,50 €</span>";
        let request = ParseRequest {
            decimal_mark: DecimalMark::Comma,
            ..ParseRequest::default()
        };
        let report = parse_document(TargetKind::Product, html, &request).unwrap();
        assert_eq!(report["normalized"]["price"], json!(1049.5));
    }
}
