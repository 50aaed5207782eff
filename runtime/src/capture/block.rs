//! Block and CAPTCHA page detection.
//!
//! Layered heuristics over a page snapshot, checked in order: the resolved
//! URL, the document title, then the body text. The first hit wins.

use crate::renderer::PageSnapshot;
use std::fmt;

/// URL path fragments of challenge pages.
const CHALLENGE_PATHS: &[&str] = &["/errors/validatecaptcha", "/errors/captcha", "/ap/cvf/"];

/// Titles served in place of real content.
const BLOCK_TITLES: &[&str] = &[
    "robot check",
    "sorry! something went wrong",
    "service unavailable error",
    "access denied",
];

/// Body phrases of challenge interstitials, matched case-insensitively.
const CHALLENGE_PHRASES: &[&str] = &[
    "enter the characters you see below",
    "type the characters you see in this image",
    "sorry, we just need to make sure you're not a robot",
    "to discuss automated access to amazon data",
    "api-services-support@amazon.com",
];

/// What gave the block away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    ChallengeUrl(&'static str),
    BlockTitle(&'static str),
    ChallengeText(&'static str),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChallengeUrl(p) => write!(f, "blocked: challenge url ({p})"),
            Self::BlockTitle(t) => write!(f, "blocked: page title matches \"{t}\""),
            Self::ChallengeText(t) => write!(f, "blocked: page text contains \"{t}\""),
        }
    }
}

/// Classify a snapshot as a block page. `None` means real content.
pub fn detect_block(snapshot: &PageSnapshot) -> Option<BlockReason> {
    let url = snapshot.final_url.to_ascii_lowercase();
    if let Some(path) = CHALLENGE_PATHS.iter().copied().find(|p| url.contains(p)) {
        return Some(BlockReason::ChallengeUrl(path));
    }

    let title = snapshot.title.to_lowercase();
    if let Some(t) = BLOCK_TITLES.iter().copied().find(|t| title.contains(t)) {
        return Some(BlockReason::BlockTitle(t));
    }

    let body = snapshot.html.to_lowercase();
    CHALLENGE_PHRASES
        .iter()
        .copied()
        .find(|p| body.contains(p))
        .map(BlockReason::ChallengeText)
}
