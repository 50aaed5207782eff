//! Pool of isolated rendering contexts.
//!
//! Bounds how many contexts exist at once and guarantees each one is
//! closed: explicitly through [`PoolManager::release`], or from `Drop` when
//! a capture is cancelled or panics with a handle still alive.

use crate::renderer::{ContextOptions, RenderContext, Renderer};
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Handle to a context borrowed from the pool.
pub struct ContextHandle {
    context: Option<Box<dyn RenderContext>>,
    permit: Option<OwnedSemaphorePermit>,
    active_count: Arc<AtomicUsize>,
    runtime: Handle,
}

impl ContextHandle {
    /// Mutable access to the render context.
    pub fn context_mut(&mut self) -> Result<&mut dyn RenderContext> {
        match self.context.as_mut() {
            Some(context) => Ok(context.as_mut()),
            None => Err(anyhow!("context already released")),
        }
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        let Some(mut context) = self.context.take() else {
            return;
        };
        // Keep the slot occupied until the context is really gone.
        let permit = self.permit.take();
        warn!("render context dropped without release, closing in background");
        self.runtime.spawn(async move {
            if let Err(e) = context.close().await {
                warn!(error = %e, "background context close failed");
            }
            drop(permit);
        });
    }
}

/// Hands out render contexts under a concurrency limit.
pub struct PoolManager {
    renderer: Arc<dyn Renderer>,
    semaphore: Arc<Semaphore>,
    max_contexts: usize,
    active_count: Arc<AtomicUsize>,
}

impl PoolManager {
    pub fn new(renderer: Arc<dyn Renderer>, max_contexts: usize) -> Self {
        let max_contexts = max_contexts.max(1);
        Self {
            renderer,
            semaphore: Arc::new(Semaphore::new(max_contexts)),
            max_contexts,
            active_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Open a fresh context. Waits while the pool is full.
    pub async fn acquire(&self, options: &ContextOptions) -> Result<ContextHandle> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| anyhow!("context pool closed: {e}"))?;

        let context = self.renderer.new_context(options).await?;
        self.active_count.fetch_add(1, Ordering::SeqCst);
        debug!(active = self.active(), "render context opened");

        Ok(ContextHandle {
            context: Some(context),
            permit: Some(permit),
            active_count: Arc::clone(&self.active_count),
            runtime: Handle::current(),
        })
    }

    /// Close the context and free its slot.
    pub async fn release(&self, mut handle: ContextHandle) -> Result<()> {
        let result = match handle.context.take() {
            Some(mut context) => context.close().await,
            None => Ok(()),
        };
        drop(handle);
        debug!(active = self.active(), "render context released");
        result
    }

    /// Contexts currently open.
    pub fn active(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    pub fn max_contexts(&self) -> usize {
        self.max_contexts
    }

    /// Free slots.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }
}
