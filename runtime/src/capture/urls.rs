//! Target URLs and page-ready markers.

use super::CaptureError;
use crate::config::Marketplace;
use crate::model::{Subject, Target};
use argus_core::parse::{product, ranking, search};
use argus_core::TargetKind;
use url::Url;

/// URL to load for a target on its marketplace.
///
/// Products resolve to `https://{host}/dp/{ID}`, searches to
/// `https://{host}/s?k={keyword}`; ranking targets use their source URL.
pub fn target_url(target: &Target, marketplace: &Marketplace) -> Result<String, CaptureError> {
    match &target.subject {
        Subject::Product { item_id } => {
            if item_id.is_empty() || !item_id.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(CaptureError::InvalidTarget(format!("bad item id '{item_id}'")));
            }
            Ok(format!("https://{}/dp/{item_id}", marketplace.host))
        }
        Subject::Search { keyword } => {
            if keyword.trim().is_empty() {
                return Err(CaptureError::InvalidTarget("empty search keyword".into()));
            }
            let mut url = Url::parse(&format!("https://{}/s", marketplace.host))
                .map_err(|e| CaptureError::InvalidTarget(format!("bad host '{}': {e}", marketplace.host)))?;
            url.query_pairs_mut().append_pair("k", keyword);
            Ok(url.into())
        }
        Subject::Ranking { source_url } => {
            let url = Url::parse(source_url)
                .map_err(|e| CaptureError::InvalidTarget(format!("bad ranking url '{source_url}': {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(CaptureError::InvalidTarget(format!(
                    "ranking url must be http(s): {source_url}"
                )));
            }
            Ok(url.into())
        }
    }
}

/// Selector whose presence means the page has rendered its content.
pub fn ready_marker(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Product => product::READY_SELECTOR,
        TargetKind::Search => search::READY_SELECTOR,
        TargetKind::Ranking => ranking::READY_SELECTOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_marketplaces;

    fn us() -> Marketplace {
        default_marketplaces().remove("US").unwrap()
    }

    #[test]
    fn test_product_url() {
        let t = Target::product("US", "b0001abcd", 0);
        assert_eq!(target_url(&t, &us()).unwrap(), "https://www.amazon.com/dp/B0001ABCD");

        let bad = Target::product("US", "B00/../x", 0);
        assert!(matches!(target_url(&bad, &us()), Err(CaptureError::InvalidTarget(_))));
    }

    #[test]
    fn test_search_url_is_encoded() {
        let t = Target::search("US", "usb c & hdmi", vec![], 0);
        assert_eq!(
            target_url(&t, &us()).unwrap(),
            "https://www.amazon.com/s?k=usb+c+%26+hdmi"
        );
    }

    #[test]
    fn test_ranking_url_passthrough() {
        let url = "https://www.amazon.com/gp/bestsellers/electronics/172282";
        let t = Target::ranking("US", url, vec![], 0);
        assert_eq!(target_url(&t, &us()).unwrap(), url);

        let ftp = Target::ranking("US", "ftp://example.com/list", vec![], 0);
        assert!(target_url(&ftp, &us()).is_err());
    }

    #[test]
    fn test_ready_markers() {
        assert_eq!(ready_marker(TargetKind::Product), "#productTitle");
        assert!(ready_marker(TargetKind::Ranking).contains("#gridItemRoot"));
    }
}
