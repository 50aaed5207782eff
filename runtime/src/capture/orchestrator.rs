//! Capture state machine for one target.
//!
//! `loading → blocked | extraction failed | succeeded`. The render context
//! is released on every exit path; if the capture future itself is dropped
//! mid-flight the pool handle closes the context from `Drop`.

use super::artifacts::{Artifact, ArtifactKind};
use super::block::detect_block;
use super::urls::{ready_marker, target_url};
use super::CaptureError;
use crate::config::{ArgusConfig, CaptureConfig, Marketplace};
use crate::model::Target;
use crate::pool::PoolManager;
use crate::renderer::{ContextOptions, RenderContext};
use argus_core::parse::{ProductOptions, RankingOptions, SearchOptions};
use argus_core::{
    fingerprint, parse_product, parse_ranking, parse_search, Anchor, ContentHash, CoreError,
    NormalizedSignal, RawFields, TargetKind,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a capture that reached the page.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureOutcome {
    #[serde(rename_all = "camelCase")]
    Succeeded {
        final_url: String,
        content_hash: ContentHash,
        raw_extracted: RawFields,
        normalized_extracted: NormalizedSignal,
        artifacts: Vec<Artifact>,
        #[serde(skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Blocked {
        final_url: String,
        artifacts: Vec<Artifact>,
        #[serde(skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
}

impl CaptureOutcome {
    pub fn final_url(&self) -> &str {
        match self {
            Self::Succeeded { final_url, .. } | Self::Blocked { final_url, .. } => final_url,
        }
    }

    pub fn artifacts(&self) -> &[Artifact] {
        match self {
            Self::Succeeded { artifacts, .. } | Self::Blocked { artifacts, .. } => artifacts,
        }
    }

    pub fn notes(&self) -> Option<&str> {
        match self {
            Self::Succeeded { notes, .. } | Self::Blocked { notes, .. } => notes.as_deref(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// Parsed page, ready to fingerprint.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub raw: RawFields,
    pub signal: NormalizedSignal,
    pub anchors: Vec<Anchor>,
}

/// Run the parser for the target's kind and enforce its required field:
/// a title for products, a non-empty result list otherwise.
pub fn extract(
    target: &Target,
    html: &str,
    final_url: &str,
    capture: &CaptureConfig,
    marketplace: &Marketplace,
) -> Result<Extraction, CaptureError> {
    let missing = |field: &'static str| CaptureError::MissingField {
        field,
        final_url: final_url.to_string(),
    };

    match target.kind() {
        TargetKind::Product => {
            let options = ProductOptions {
                decimal_mark: marketplace.decimal_mark,
            };
            let out = parse_product(html, &options);
            let signal = match out.normalized.into_signal() {
                Ok(signal) => signal,
                Err(CoreError::MissingField(field)) => return Err(missing(field)),
                Err(e) => return Err(e.into()),
            };
            Ok(Extraction {
                raw: out.raw,
                signal: NormalizedSignal::Product(signal),
                anchors: out.anchors,
            })
        }
        TargetKind::Search => {
            let options = SearchOptions {
                tracked: target.tracked.clone(),
                limit: Some(capture.search_limit),
            };
            let out = parse_search(html, &options);
            if out.normalized.results.is_empty() {
                return Err(missing("results"));
            }
            Ok(Extraction {
                raw: out.raw,
                signal: NormalizedSignal::Search(out.normalized),
                anchors: out.anchors,
            })
        }
        TargetKind::Ranking => {
            let options = RankingOptions {
                tracked: target.tracked.clone(),
                limit: Some(capture.ranking_limit),
            };
            let out = parse_ranking(html, &options);
            if out.normalized.results.is_empty() {
                return Err(missing("results"));
            }
            Ok(Extraction {
                raw: out.raw,
                signal: NormalizedSignal::Ranking(out.normalized),
                anchors: out.anchors,
            })
        }
    }
}

fn page_artifact_kind(kind: TargetKind) -> ArtifactKind {
    match kind {
        TargetKind::Product => ArtifactKind::FullPage,
        TargetKind::Search => ArtifactKind::SearchTop,
        TargetKind::Ranking => ArtifactKind::RankingTop,
    }
}

/// Drives captures through the context pool.
pub struct CaptureOrchestrator {
    pool: Arc<PoolManager>,
    config: Arc<ArgusConfig>,
}

impl CaptureOrchestrator {
    pub fn new(pool: Arc<PoolManager>, config: Arc<ArgusConfig>) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &Arc<PoolManager> {
        &self.pool
    }

    /// Observe one target in a fresh context.
    pub async fn capture(&self, target: &Target) -> Result<CaptureOutcome, CaptureError> {
        let marketplace = self
            .config
            .marketplace(&target.marketplace)
            .ok_or_else(|| CaptureError::UnknownMarketplace(target.marketplace.clone()))?;
        let url = target_url(target, marketplace)?;
        let options = ContextOptions::for_marketplace(marketplace, &self.config.browser);

        let mut handle = self.pool.acquire(&options).await?;
        let result = match handle.context_mut() {
            Ok(context) => self.observe(context, target, marketplace, &url).await,
            Err(e) => Err(e.into()),
        };

        match self.pool.release(handle).await {
            Ok(()) => debug!(target_id = %target.id, "render context released"),
            Err(e) => warn!(target_id = %target.id, error = %e, "failed to release render context"),
        }
        result
    }

    async fn observe(
        &self,
        context: &mut dyn RenderContext,
        target: &Target,
        marketplace: &Marketplace,
        url: &str,
    ) -> Result<CaptureOutcome, CaptureError> {
        let capture = &self.config.capture;
        let timeout = capture.navigation_timeout();

        let navigation = match tokio::time::timeout(timeout, context.navigate(url, timeout)).await {
            Err(_) => {
                return Err(CaptureError::Timeout {
                    url: url.to_string(),
                    after_ms: capture.navigation_timeout_ms,
                })
            }
            Ok(Err(e)) => {
                return Err(CaptureError::Navigation {
                    url: url.to_string(),
                    reason: format!("{e:#}"),
                })
            }
            Ok(Ok(navigation)) => navigation,
        };
        debug!(target_id = %target.id, url, load_ms = navigation.load_time_ms, "page loaded");

        let marker = ready_marker(target.kind());
        let ready = context
            .wait_for_selector(marker, capture.ready_timeout())
            .await?;

        let mut snapshot = context.snapshot().await?;
        if snapshot.final_url.is_empty() {
            snapshot.final_url = navigation.final_url;
        }
        let page_shot = context.screenshot().await?;

        if let Some(reason) = detect_block(&snapshot) {
            warn!(target_id = %target.id, url = %snapshot.final_url, %reason, "capture blocked");
            return Ok(CaptureOutcome::Blocked {
                final_url: snapshot.final_url,
                artifacts: vec![Artifact {
                    kind: ArtifactKind::BlockedPage,
                    marketplace: target.marketplace.clone(),
                    item_id: None,
                    position: None,
                    bytes: page_shot,
                }],
                notes: Some(reason.to_string()),
            });
        }

        let extraction =
            extract(target, &snapshot.html, &snapshot.final_url, capture, marketplace)?;
        let content_hash = fingerprint(&extraction.signal)?;

        let mut artifacts = vec![Artifact {
            kind: page_artifact_kind(target.kind()),
            marketplace: target.marketplace.clone(),
            item_id: None,
            position: None,
            bytes: page_shot,
        }];
        for anchor in &extraction.anchors {
            match context.element_screenshot(&anchor.selector).await {
                Ok(Some(bytes)) => artifacts.push(Artifact {
                    kind: ArtifactKind::ResultCard,
                    marketplace: target.marketplace.clone(),
                    item_id: Some(anchor.id.clone()),
                    position: Some(anchor.position),
                    bytes,
                }),
                Ok(None) => debug!(id = %anchor.id, "tracked element not on page, no screenshot"),
                Err(e) => warn!(id = %anchor.id, error = %e, "element screenshot failed"),
            }
        }

        info!(
            target_id = %target.id,
            url = %snapshot.final_url,
            hash = %content_hash,
            artifacts = artifacts.len(),
            "capture succeeded"
        );
        Ok(CaptureOutcome::Succeeded {
            final_url: snapshot.final_url,
            content_hash,
            raw_extracted: extraction.raw,
            normalized_extracted: extraction.signal,
            artifacts,
            notes: (!ready).then(|| format!("ready marker {marker} not seen")),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::renderer::fake::{FakePage, FakeRenderer};
    use assert_json_diff::assert_json_include;
    use std::time::Duration;

    pub(crate) const PRODUCT_HTML: &str = r#"
        <html><head><title>Amazon.com: My Product</title></head><body>
          <span id="productTitle">  My Product  </span>
          <div id="corePrice_feature_div"><span class="a-price"><span class="a-offscreen">$19.99</span></span></div>
          <div id="feature-bullets"><ul><li>Durable</li><li>Light</li></ul></div>
        </body></html>
    "#;

    pub(crate) const SEARCH_HTML: &str = r#"
        <div data-component-type="s-search-result" data-asin="B0001"><h2>One</h2></div>
        <div data-component-type="s-search-result" data-asin="B0002"><h2>Two</h2></div>
    "#;

    pub(crate) fn orchestrator(renderer: Arc<FakeRenderer>, config: ArgusConfig) -> CaptureOrchestrator {
        let pool = Arc::new(PoolManager::new(renderer, 2));
        CaptureOrchestrator::new(pool, Arc::new(config))
    }

    #[tokio::test]
    async fn test_product_capture_succeeds() {
        let renderer = Arc::new(
            FakeRenderer::new().with_page(
                "https://www.amazon.com/dp/B0001",
                FakePage::html("Amazon.com: My Product", PRODUCT_HTML),
            ),
        );
        let orch = orchestrator(renderer.clone(), ArgusConfig::default());
        let target = Target::product("US", "B0001", 0);

        let outcome = orch.capture(&target).await.unwrap();
        let CaptureOutcome::Succeeded {
            content_hash,
            normalized_extracted,
            artifacts,
            notes,
            ..
        } = &outcome
        else {
            panic!("expected success, got {outcome:?}");
        };
        let NormalizedSignal::Product(product) = normalized_extracted else {
            panic!("expected product signal");
        };
        assert_eq!(product.title, "My Product");
        assert_eq!(product.price, Some(19.99));
        assert_eq!(*content_hash, fingerprint(normalized_extracted).unwrap());
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].kind, ArtifactKind::FullPage);
        assert!(notes.is_none());

        assert_eq!(renderer.open_contexts(), 0);
        let seen = renderer.options_seen.lock().unwrap();
        assert_eq!(seen[0].locale, "en-US");
        assert_eq!(seen[0].timezone, "America/New_York");
    }

    #[tokio::test]
    async fn test_outcome_serializes_tagged() {
        let renderer = Arc::new(FakeRenderer::new().with_page(
            "https://www.amazon.com/dp/B0001",
            FakePage::html("Amazon.com: My Product", PRODUCT_HTML),
        ));
        let outcome = orchestrator(renderer, ArgusConfig::default())
            .capture(&Target::product("US", "B0001", 0))
            .await
            .unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_json_include!(
            actual: &json,
            expected: serde_json::json!({
                "status": "SUCCEEDED",
                "finalUrl": "https://www.amazon.com/dp/B0001",
                "normalizedExtracted": {"kind": "product", "title": "My Product", "price": 19.99},
                "artifacts": [{"kind": "FULL_PAGE", "marketplace": "US"}],
            })
        );
        assert_eq!(json["contentHash"].as_str().unwrap().len(), 64);
        assert!(json.get("notes").is_none());
    }

    #[tokio::test]
    async fn test_blocked_page_skips_extraction() {
        let mut page = FakePage::html("Widget", PRODUCT_HTML);
        page.final_url = Some("https://www.amazon.com/errors/validateCaptcha".into());
        let renderer = Arc::new(FakeRenderer::new().with_page("https://www.amazon.com/dp/B0001", page));
        let orch = orchestrator(renderer.clone(), ArgusConfig::default());

        let outcome = orch.capture(&Target::product("US", "B0001", 0)).await.unwrap();
        assert!(outcome.is_blocked());
        assert_eq!(outcome.final_url(), "https://www.amazon.com/errors/validateCaptcha");
        assert_eq!(outcome.artifacts()[0].kind, ArtifactKind::BlockedPage);
        assert!(outcome.notes().unwrap().contains("challenge url"));
        assert_eq!(renderer.open_contexts(), 0);
    }

    #[tokio::test]
    async fn test_missing_title_is_fatal() {
        let renderer = Arc::new(FakeRenderer::new().with_page(
            "https://www.amazon.com/dp/B0001",
            FakePage::html("Amazon.com", "<html><body>nothing</body></html>"),
        ));
        let orch = orchestrator(renderer.clone(), ArgusConfig::default());

        let err = orch.capture(&Target::product("US", "B0001", 0)).await.unwrap_err();
        match err {
            CaptureError::MissingField { field, final_url } => {
                assert_eq!(field, "title");
                assert_eq!(final_url, "https://www.amazon.com/dp/B0001");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(renderer.open_contexts(), 0);
    }

    #[tokio::test]
    async fn test_navigation_failure_releases_context() {
        let mut page = FakePage::html("", "");
        page.fail_navigation = true;
        let renderer = Arc::new(FakeRenderer::new().with_page("https://www.amazon.com/dp/B0001", page));
        let orch = orchestrator(renderer.clone(), ArgusConfig::default());

        let err = orch.capture(&Target::product("US", "B0001", 0)).await.unwrap_err();
        assert!(matches!(err, CaptureError::Navigation { .. }));
        assert_eq!(renderer.open_contexts(), 0);
    }

    #[tokio::test]
    async fn test_navigation_timeout() {
        let mut page = FakePage::html("", PRODUCT_HTML);
        page.delay = Some(Duration::from_secs(30));
        let renderer = Arc::new(FakeRenderer::new().with_page("https://www.amazon.com/dp/B0001", page));
        let mut config = ArgusConfig::default();
        config.capture.navigation_timeout_ms = 20;
        let orch = orchestrator(renderer.clone(), config);

        let err = orch.capture(&Target::product("US", "B0001", 0)).await.unwrap_err();
        assert!(matches!(err, CaptureError::Timeout { after_ms: 20, .. }));
        assert_eq!(renderer.open_contexts(), 0);
    }

    #[tokio::test]
    async fn test_unknown_marketplace() {
        let orch = orchestrator(Arc::new(FakeRenderer::new()), ArgusConfig::default());
        let err = orch.capture(&Target::product("XX", "B0001", 0)).await.unwrap_err();
        assert!(matches!(err, CaptureError::UnknownMarketplace(code) if code == "XX"));
    }

    #[tokio::test]
    async fn test_search_capture_screenshots_tracked_results() {
        let mut page = FakePage::html("Amazon.com : usb hub", SEARCH_HTML);
        page.elements = vec![r#"[data-component-type="s-search-result"][data-asin="B0002"]"#.into()];
        let renderer = Arc::new(FakeRenderer::new().with_page("https://www.amazon.com/s?k=usb+hub", page));
        let orch = orchestrator(renderer.clone(), ArgusConfig::default());
        let target = Target::search("US", "usb hub", vec!["B0002".into(), "B0009".into()], 0);

        let outcome = orch.capture(&target).await.unwrap();
        let artifacts = outcome.artifacts();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].kind, ArtifactKind::SearchTop);
        assert_eq!(artifacts[1].kind, ArtifactKind::ResultCard);
        assert_eq!(artifacts[1].item_id.as_deref(), Some("B0002"));
        assert_eq!(artifacts[1].position, Some(2));
    }

    fn marketplace(code: &str) -> Marketplace {
        ArgusConfig::default().marketplace(code).unwrap().clone()
    }

    #[test]
    fn test_empty_result_list_is_fatal() {
        let target = Target::ranking("US", "https://www.amazon.com/gp/bestsellers", vec![], 0);
        let html = "<div id=\"zg-ordered-list\"></div>";
        let err = extract(&target, html, "u", &CaptureConfig::default(), &marketplace("US"))
            .unwrap_err();
        assert!(matches!(err, CaptureError::MissingField { field: "results", .. }));
    }

    #[test]
    fn test_grid_item_layout_extracts_results() {
        let target = Target::ranking("US", "https://www.amazon.com/gp/bestsellers", vec![], 0);
        let html = r#"<div class="zg-grid">
            <div id="gridItemRoot"><div data-asin="B01">one</div></div>
            <div id="gridItemRoot"><div data-asin="B02">two</div></div>
        </div>"#;
        let extraction =
            extract(&target, html, "u", &CaptureConfig::default(), &marketplace("US")).unwrap();
        let NormalizedSignal::Ranking(ranking) = extraction.signal else {
            panic!("expected a ranking signal");
        };
        assert_eq!(ranking.results, vec!["B01", "B02"]);
    }

    #[tokio::test]
    async fn test_decimal_comma_marketplace_prices() {
        let html = r#"<html><body>
            <span id="productTitle">Wasserkocher</span>
            <div id="corePrice_feature_div"><span class="a-price"><span class="a-offscreen">19,99 €</span></span></div>
            <span id="acrPopover"><span class="a-icon-alt">4,5 von 5 Sternen</span></span>
        </body></html>"#;
        let renderer = Arc::new(FakeRenderer::new().with_page(
            "https://www.amazon.de/dp/B0001",
            FakePage::html("Amazon.de: Wasserkocher", html),
        ));
        let orch = orchestrator(renderer, ArgusConfig::default());
        let target = Target::product("DE", "B0001", 0);

        let outcome = orch.capture(&target).await.unwrap();
        let CaptureOutcome::Succeeded {
            normalized_extracted: NormalizedSignal::Product(product),
            ..
        } = outcome
        else {
            panic!("expected a product capture");
        };
        assert_eq!(product.price, Some(19.99));
        assert_eq!(product.rating, Some(4.5));
    }
}
