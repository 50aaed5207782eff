//! Image URL canonicalization for product galleries.
//!
//! Gallery thumbnails come in many size variants of the same CDN object.
//! Every candidate is rewritten to one high-resolution variant so the
//! same picture always yields the same URL, and video placeholders are
//! dropped since they are not part of the gallery.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Maximum number of gallery images kept in a signal.
pub const MAX_IMAGES: usize = 9;

/// Size modifier requested for every canonical CDN image.
const HIRES_MODIFIER: &str = "._AC_SL1500_";

/// Substrings that mark a thumbnail as a video or 360° placeholder.
const VIDEO_PLACEHOLDER_PATTERNS: &[&str] = &[
    "play-button",
    "play-icon",
    "pkplay",
    "video-thumb",
    "/vse-vms-",
    "360_icon",
];

fn cdn_image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // <prefix>/images/I/<id>[.<modifiers>].<ext>[?query][#fragment]
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(https?://[^/?#]+/images/I/)([A-Za-z0-9+%_-]+)(?:\.[^/?#]*?)?\.(jpe?g|png|webp)(?:[?#].*)?$",
        )
        .expect("static regex")
    })
}

/// Whether a URL points at a video or 360° placeholder rather than a photo.
pub fn is_video_placeholder(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    VIDEO_PLACEHOLDER_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Canonical form of a gallery image URL, or `None` when it must be
/// skipped (empty, inline `data:` URI, video placeholder).
pub fn canonical_image_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() || url.starts_with("data:") || is_video_placeholder(url) {
        return None;
    }

    if let Some(caps) = cdn_image_regex().captures(url) {
        let ext = match caps[3].to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => "jpg",
            "png" => "png",
            _ => "webp",
        };
        return Some(format!("{}{}{HIRES_MODIFIER}.{ext}", &caps[1], &caps[2]));
    }

    Some(url.to_string())
}

/// Identity of an image for gallery comparison: the CDN image id when the
/// URL has one, the URL itself otherwise.
pub fn image_key(url: &str) -> String {
    cdn_image_regex()
        .captures(url.trim())
        .map(|caps| caps[2].to_string())
        .unwrap_or_else(|| url.to_string())
}

/// Deduplicate preserving first-seen order, then cap at [`MAX_IMAGES`].
pub fn dedupe_and_cap(urls: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|u| seen.insert(u.clone()))
        .take(MAX_IMAGES)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_cdn_variants_to_hires() {
        let thumb = "https://m.media-amazon.com/images/I/41abcXYZ12L._AC_US40_.jpg?x=1#frag";
        assert_eq!(
            canonical_image_url(thumb).unwrap(),
            "https://m.media-amazon.com/images/I/41abcXYZ12L._AC_SL1500_.jpg"
        );

        let jpeg = "https://m.media-amazon.com/images/I/71zz+Q.JPEG";
        assert_eq!(
            canonical_image_url(jpeg).unwrap(),
            "https://m.media-amazon.com/images/I/71zz+Q._AC_SL1500_.jpg"
        );
    }

    #[test]
    fn test_variants_share_a_key() {
        let a = "https://m.media-amazon.com/images/I/41abc._AC_US40_.jpg";
        let b = "https://m.media-amazon.com/images/I/41abc._AC_SL1500_.jpg";
        assert_eq!(image_key(a), "41abc");
        assert_eq!(image_key(a), image_key(b));
        assert_eq!(image_key("https://cdn.example.com/p.png"), "https://cdn.example.com/p.png");
    }

    #[test]
    fn test_rejects_placeholders() {
        assert!(canonical_image_url("").is_none());
        assert!(canonical_image_url("data:image/gif;base64,R0lGOD").is_none());
        assert!(canonical_image_url(
            "https://m.media-amazon.com/images/I/31PKplay-button-overlay._SS40_.png"
        )
        .is_none());
    }

    #[test]
    fn test_non_cdn_urls_pass_through() {
        let url = "https://cdn.example.com/img/p.png?w=200";
        assert_eq!(canonical_image_url(url).unwrap(), url);
    }

    #[test]
    fn test_dedupe_and_cap() {
        let urls: Vec<String> = (0..12).map(|i| format!("u{}", i % 10)).collect();
        let out = dedupe_and_cap(urls);
        assert_eq!(out.len(), MAX_IMAGES);
        assert_eq!(out[0], "u0");
        assert_eq!(out[8], "u8");
    }
}
