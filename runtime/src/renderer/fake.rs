//! Scripted renderer for tests.

use super::{ContextOptions, NavigationResult, PageSnapshot, RenderContext, Renderer};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Canned response for one URL.
#[derive(Debug, Clone)]
pub struct FakePage {
    pub final_url: Option<String>,
    pub title: String,
    pub html: String,
    /// Selectors that yield an element screenshot.
    pub elements: Vec<String>,
    pub fail_navigation: bool,
    /// Sleep this long on navigation before answering.
    pub delay: Option<Duration>,
}

impl FakePage {
    pub fn html(title: &str, html: &str) -> Self {
        Self {
            final_url: None,
            title: title.to_string(),
            html: html.to_string(),
            elements: Vec::new(),
            fail_navigation: false,
            delay: None,
        }
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    pages: Mutex<HashMap<String, FakePage>>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub options_seen: Mutex<Vec<ContextOptions>>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, page: FakePage) -> Self {
        self.set_page(url, page);
        self
    }

    pub fn set_page(&self, url: &str, page: FakePage) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), page);
    }

    pub fn open_contexts(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self, options: &ContextOptions) -> Result<Box<dyn RenderContext>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.options_seen.lock().unwrap().push(options.clone());
        Ok(Box::new(FakeContext {
            pages: self.pages.lock().unwrap().clone(),
            current: None,
            closed: Arc::clone(&self.closed),
            is_closed: false,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

struct FakeContext {
    pages: HashMap<String, FakePage>,
    current: Option<(String, FakePage)>,
    closed: Arc<AtomicUsize>,
    is_closed: bool,
}

impl FakeContext {
    fn current(&self) -> Result<&(String, FakePage)> {
        self.current.as_ref().ok_or_else(|| anyhow!("no page loaded"))
    }
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<NavigationResult> {
        let page = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("net::ERR_NAME_NOT_RESOLVED at {url}"))?;
        if let Some(delay) = page.delay {
            tokio::time::sleep(delay).await;
        }
        if page.fail_navigation {
            bail!("net::ERR_CONNECTION_RESET at {url}");
        }
        let final_url = page.final_url.clone().unwrap_or_else(|| url.to_string());
        self.current = Some((final_url.clone(), page));
        Ok(NavigationResult {
            final_url,
            load_time_ms: 5,
        })
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> Result<bool> {
        let (_, page) = self.current()?;
        Ok(markup_mentions(&page.html, selector))
    }

    async fn snapshot(&mut self) -> Result<PageSnapshot> {
        let (final_url, page) = self.current()?;
        Ok(PageSnapshot {
            final_url: final_url.clone(),
            title: page.title.clone(),
            html: page.html.clone(),
        })
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.current()?;
        Ok(b"\x89PNG full".to_vec())
    }

    async fn element_screenshot(&mut self, selector: &str) -> Result<Option<Vec<u8>>> {
        let (_, page) = self.current()?;
        Ok(page
            .elements
            .iter()
            .any(|s| s == selector)
            .then(|| [&b"\x89"[..], format!("PNG {selector}").as_bytes()].concat()))
    }

    async fn close(&mut self) -> Result<()> {
        if !self.is_closed {
            self.is_closed = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Rough readiness check: any id or attribute fragment of the selector
/// appears in the markup.
fn markup_mentions(html: &str, selector: &str) -> bool {
    selector.split(',').any(|part| {
        let part = part.trim();
        let needle = part
            .rsplit(['.', '#'])
            .next()
            .unwrap_or(part)
            .trim_start_matches('[')
            .trim_end_matches(']');
        !needle.is_empty() && html.contains(needle)
    })
}
