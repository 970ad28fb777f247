use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("navigation to {url} did not go idle within {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("element action failed: {0}")]
    Action(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),
}

/// The browser primitives the application pipeline needs from one page.
///
/// Implemented by `ChromePage` for real sessions and by in-crate fakes in tests.
#[async_trait]
pub trait FormPage: Send + Sync {
    type Element: Send + Sync;

    /// Loads `url` and waits until network activity settles, bounded by `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), PageError>;

    /// Single, non-waiting lookup of the first element matching `selector`.
    async fn query(&self, selector: &str) -> Result<Option<Self::Element>, PageError>;

    /// Replaces the element's value with `value`.
    async fn fill_text(&self, element: &Self::Element, value: &str) -> Result<(), PageError>;

    /// Sets a file input's selected file.
    async fn attach_file(&self, element: &Self::Element, path: &Path) -> Result<(), PageError>;

    async fn current_url(&self) -> Result<String, PageError>;
}

/// Pause before re-checking a document that replaced the one being checked.
const RESETTLE_PAUSE: Duration = Duration::from_millis(250);

/// Outcome of one in-page check for network quiet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleCheck {
    Idle,
    /// Still loading when the check's budget ran out.
    Busy,
    /// The document went away mid-check, e.g. a client-side redirect.
    Interrupted(String),
}

/// Waits after a successful load until the page is idle, within `budget`.
///
/// An interrupted check is not a failure: the next navigation is awaited and
/// the new document is checked with what is left of the budget. Only running
/// out of budget returns false.
pub async fn settle<C, CF, N, NF>(mut check: C, mut next_navigation: N, budget: Duration) -> bool
where
    C: FnMut(Duration) -> CF,
    CF: Future<Output = IdleCheck>,
    N: FnMut() -> NF,
    NF: Future<Output = ()>,
{
    let deadline = Instant::now() + budget;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match check(remaining).await {
            IdleCheck::Idle => return true,
            IdleCheck::Busy => return false,
            IdleCheck::Interrupted(reason) => {
                debug!("Idle check interrupted ({reason}); waiting for the next document");
                let remaining = deadline.saturating_duration_since(Instant::now());
                if tokio::time::timeout(remaining, next_navigation()).await.is_err() {
                    return false;
                }
                tokio::time::sleep(RESETTLE_PAUSE.min(remaining)).await;
            }
        }
    }
}
