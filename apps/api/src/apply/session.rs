//! Scoped browser sessions: acquire a page, use it, always release it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tracing::error;

use crate::apply::page::FormPage;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("browser context creation failed: {0}")]
    Context(String),

    #[error("session work panicked: {0}")]
    Panicked(String),
}

/// Source of isolated pages, one per task.
///
/// Carried by the queue consumer as `Arc<SessionManager<impl SessionProvider>>`.
#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    type Page: FormPage + 'static;

    async fn acquire(&self) -> Result<Self::Page, SessionError>;

    /// Tears down a page and its context. Must not fail; problems are logged.
    async fn release(&self, page: Self::Page);
}

pub struct SessionManager<S> {
    provider: Arc<S>,
}

impl<S: SessionProvider> SessionManager<S> {
    pub fn new(provider: Arc<S>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &S {
        &self.provider
    }

    /// Runs `work` against a fresh page and releases the page afterwards,
    /// whether `work` returns normally, returns an error value, or panics.
    pub async fn with_session<T, F>(&self, work: F) -> Result<T, SessionError>
    where
        F: for<'p> FnOnce(&'p S::Page) -> BoxFuture<'p, T> + Send,
        T: Send,
    {
        let page = self.provider.acquire().await?;
        let outcome = AssertUnwindSafe(work(&page)).catch_unwind().await;
        self.provider.release(page).await;

        outcome.map_err(|panic| {
            let message = panic_message(panic.as_ref());
            error!("Session work panicked: {message}");
            SessionError::Panicked(message)
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
