//! In-memory stand-ins for the browser used by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::apply::page::{settle, FormPage, IdleCheck, PageError};
use crate::apply::session::{SessionError, SessionProvider};

#[derive(Debug, Clone, PartialEq)]
pub struct FakeElement {
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageCall {
    Navigate(String),
    Query(String),
    FillText { selector: String, value: String },
    AttachFile { selector: String, contents: Vec<u8> },
}

/// A page whose DOM is a set of selectors that "match".
pub struct FakePage {
    elements: HashMap<String, Instant>,
    stale: HashSet<String>,
    navigate_error: Option<String>,
    navigate_delay: Duration,
    landed_url: Option<String>,
    client_redirects: Mutex<VecDeque<String>>,
    url: Mutex<String>,
    calls: Mutex<Vec<PageCall>>,
    nav_log: Option<Arc<Mutex<Vec<String>>>>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            elements: HashMap::new(),
            stale: HashSet::new(),
            navigate_error: None,
            navigate_delay: Duration::ZERO,
            landed_url: None,
            client_redirects: Mutex::new(VecDeque::new()),
            url: Mutex::new("about:blank".to_string()),
            calls: Mutex::new(Vec::new()),
            nav_log: None,
        }
    }

    pub fn with_element(self, selector: &str) -> Self {
        self.with_delayed_element(selector, Duration::ZERO)
    }

    /// The selector starts matching `delay` after the page is built.
    pub fn with_delayed_element(mut self, selector: &str, delay: Duration) -> Self {
        self.elements.insert(selector.to_string(), Instant::now() + delay);
        self
    }

    /// The selector matches but every action on it fails.
    pub fn with_stale_element(mut self, selector: &str) -> Self {
        self.stale.insert(selector.to_string());
        self.with_element(selector)
    }

    pub fn failing_navigation(mut self, reason: &str) -> Self {
        self.navigate_error = Some(reason.to_string());
        self
    }

    pub fn with_navigate_delay(mut self, delay: Duration) -> Self {
        self.navigate_delay = delay;
        self
    }

    /// URL reported after navigation, simulating a redirect.
    pub fn landing_at(mut self, url: &str) -> Self {
        self.landed_url = Some(url.to_string());
        self
    }

    /// After the load, the page replaces itself with `url` from script.
    /// Idle checks are interrupted until every such redirect has happened.
    pub fn with_client_redirect(self, url: &str) -> Self {
        self.client_redirects.lock().unwrap().push_back(url.to_string());
        self
    }

    pub fn with_nav_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.nav_log = Some(log);
        self
    }

    pub fn calls(&self) -> Vec<PageCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn action_calls(&self) -> Vec<PageCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, PageCall::FillText { .. } | PageCall::AttachFile { .. }))
            .collect()
    }

    fn record(&self, call: PageCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_stale(&self, element: &FakeElement) -> Result<(), PageError> {
        if self.stale.contains(&element.selector) {
            return Err(PageError::Action(format!(
                "element {} is detached from the document",
                element.selector
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FormPage for FakePage {
    type Element = FakeElement;

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), PageError> {
        self.record(PageCall::Navigate(url.to_string()));
        if let Some(log) = &self.nav_log {
            log.lock().unwrap().push(url.to_string());
        }
        if !self.navigate_delay.is_zero() {
            tokio::time::sleep(self.navigate_delay).await;
        }
        if let Some(reason) = &self.navigate_error {
            if reason == "timeout" {
                return Err(PageError::NavigationTimeout {
                    url: url.to_string(),
                    timeout,
                });
            }
            return Err(PageError::Navigation {
                url: url.to_string(),
                reason: reason.clone(),
            });
        }
        *self.url.lock().unwrap() = self.landed_url.clone().unwrap_or_else(|| url.to_string());

        let settled = settle(
            |_| {
                let pending = !self.client_redirects.lock().unwrap().is_empty();
                std::future::ready(if pending {
                    IdleCheck::Interrupted("Execution context was destroyed".to_string())
                } else {
                    IdleCheck::Idle
                })
            },
            || {
                if let Some(next) = self.client_redirects.lock().unwrap().pop_front() {
                    *self.url.lock().unwrap() = next;
                }
                std::future::ready(())
            },
            timeout,
        )
        .await;
        if !settled {
            return Err(PageError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            });
        }
        Ok(())
    }

    async fn query(&self, selector: &str) -> Result<Option<FakeElement>, PageError> {
        self.record(PageCall::Query(selector.to_string()));
        let visible = self
            .elements
            .get(selector)
            .is_some_and(|appears_at| Instant::now() >= *appears_at);
        Ok(visible.then(|| FakeElement {
            selector: selector.to_string(),
        }))
    }

    async fn fill_text(&self, element: &FakeElement, value: &str) -> Result<(), PageError> {
        self.check_stale(element)?;
        self.record(PageCall::FillText {
            selector: element.selector.clone(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn attach_file(&self, element: &FakeElement, path: &Path) -> Result<(), PageError> {
        self.check_stale(element)?;
        let contents = std::fs::read(path).map_err(|e| PageError::Action(e.to_string()))?;
        self.record(PageCall::AttachFile {
            selector: element.selector.clone(),
            contents,
        });
        Ok(())
    }

    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self.url.lock().unwrap().clone())
    }
}

type PageFactory = Box<dyn Fn() -> FakePage + Send + Sync>;

/// Session provider handing out `FakePage`s and counting acquire/release pairs.
pub struct FakeSessions {
    factory: PageFactory,
    fail_acquire: Option<String>,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl FakeSessions {
    pub fn new(factory: impl Fn() -> FakePage + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            fail_acquire: None,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            fail_acquire: Some(reason.to_string()),
            ..Self::new(FakePage::new)
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for FakeSessions {
    type Page = FakePage;

    async fn acquire(&self) -> Result<FakePage, SessionError> {
        if let Some(reason) = &self.fail_acquire {
            return Err(SessionError::Launch(reason.clone()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok((self.factory)())
    }

    async fn release(&self, _page: FakePage) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_navigation_lands_on_target() {
        let page = FakePage::new();
        page.navigate("https://example.com/apply", TIMEOUT).await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "https://example.com/apply");
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_that_keeps_loading_after_navigation_settles() {
        let page = FakePage::new()
            .with_client_redirect("https://boards.example/jobs/1")
            .with_client_redirect("https://boards.example/jobs/1/apply");

        page.navigate("https://example.com/apply", TIMEOUT).await.unwrap();

        assert_eq!(
            page.current_url().await.unwrap(),
            "https://boards.example/jobs/1/apply"
        );
        assert_eq!(
            page.calls(),
            vec![PageCall::Navigate("https://example.com/apply".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_is_not_retried() {
        let page = FakePage::new()
            .failing_navigation("net::ERR_NAME_NOT_RESOLVED")
            .with_client_redirect("https://boards.example/jobs/1");

        let err = page.navigate("https://nowhere.example", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, PageError::Navigation { .. }));
    }
}
