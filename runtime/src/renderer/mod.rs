//! Browser rendering abstraction.
//!
//! A [`Renderer`] hands out isolated [`RenderContext`]s; each capture runs
//! in its own context so cookies and storage never leak between captures.

pub mod chromium;
#[cfg(test)]
pub(crate) mod fake;

pub use chromium::ChromiumRenderer;

use crate::config::{BrowserConfig, Marketplace};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Per-context emulation settings, derived from a marketplace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    pub locale: String,
    pub timezone: String,
    pub accept_language: String,
    pub viewport: (u32, u32),
}

impl ContextOptions {
    pub fn for_marketplace(marketplace: &Marketplace, browser: &BrowserConfig) -> Self {
        Self {
            locale: marketplace.locale.clone(),
            timezone: marketplace.timezone.clone(),
            accept_language: marketplace.accept_language.clone(),
            viewport: (browser.window_width, browser.window_height),
        }
    }
}

/// Result of a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResult {
    pub final_url: String,
    pub load_time_ms: u64,
}

/// What the parsers and block detection look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub final_url: String,
    pub title: String,
    pub html: String,
}

/// Factory for isolated browsing contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn new_context(&self, options: &ContextOptions) -> Result<Box<dyn RenderContext>>;

    /// Stop the underlying browser.
    async fn shutdown(&self) -> Result<()>;
}

/// One isolated browsing session holding a single page.
#[async_trait]
pub trait RenderContext: Send + Sync {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationResult>;

    /// Wait until `selector` matches. Returns false on timeout.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool>;

    async fn snapshot(&mut self) -> Result<PageSnapshot>;

    /// Full-page PNG screenshot.
    async fn screenshot(&mut self) -> Result<Vec<u8>>;

    /// PNG of the first element matching `selector`, `None` when absent.
    async fn element_screenshot(&mut self, selector: &str) -> Result<Option<Vec<u8>>>;

    /// Close the page and dispose of the context. Idempotent.
    async fn close(&mut self) -> Result<()>;
}
