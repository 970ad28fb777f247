//! Headless Chromium sessions over the DevTools protocol.
//!
//! One browser process is shared per `ChromeSessions`; every page gets its own
//! browser context so cookies and storage never leak between applications.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::apply::page::{settle, FormPage, IdleCheck, PageError};
use crate::apply::session::{SessionError, SessionProvider};

/// Launch settings for the shared browser.
#[derive(Debug, Clone)]
pub struct ChromeSettings {
    pub executable: Option<PathBuf>,
    pub headless: bool,
}

struct ChromeHandle {
    browser: Browser,
    handler: JoinHandle<()>,
}

pub struct ChromeSessions {
    settings: ChromeSettings,
    handle: Mutex<Option<Arc<ChromeHandle>>>,
}

impl ChromeSessions {
    pub fn new(settings: ChromeSettings) -> Self {
        Self {
            settings,
            handle: Mutex::new(None),
        }
    }

    /// Returns the running browser, launching (or relaunching) it when needed.
    async fn browser(&self) -> Result<Arc<ChromeHandle>, SessionError> {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.as_ref() {
            if !handle.handler.is_finished() {
                return Ok(handle.clone());
            }
            warn!("Browser event loop exited; relaunching");
        }

        let handle = Arc::new(self.launch().await?);
        *slot = Some(handle.clone());
        Ok(handle)
    }

    async fn launch(&self) -> Result<ChromeHandle, SessionError> {
        info!("Launching browser (headless: {})", self.settings.headless);

        let mut builder = BrowserConfig::builder().args(vec![
            "--disable-gpu",
            "--no-sandbox",
            "--disable-dev-shm-usage",
        ]);
        builder = if self.settings.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        if let Some(path) = &self.settings.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(SessionError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(ChromeHandle { browser, handler })
    }

    /// Closes the shared browser, if one was launched.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.browser.execute(CloseParams::default()).await {
                warn!("Browser close failed: {e}");
            }
            handle.handler.abort();
        }
    }
}

#[async_trait]
impl SessionProvider for ChromeSessions {
    type Page = ChromePage;

    async fn acquire(&self) -> Result<ChromePage, SessionError> {
        let handle = self.browser().await?;

        let context_id = handle
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| SessionError::Context(e.to_string()))?
            .result
            .browser_context_id;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(SessionError::Context)?;

        match handle.browser.new_page(target).await {
            Ok(page) => Ok(ChromePage {
                page,
                context_id,
                handle,
            }),
            Err(e) => {
                dispose_context(&handle.browser, context_id).await;
                Err(SessionError::Context(e.to_string()))
            }
        }
    }

    async fn release(&self, page: ChromePage) {
        let ChromePage {
            page,
            context_id,
            handle,
        } = page;
        if let Err(e) = page.close().await {
            warn!("Closing page failed: {e}");
        }
        dispose_context(&handle.browser, context_id).await;
    }
}

async fn dispose_context(browser: &Browser, context_id: BrowserContextId) {
    if let Err(e) = browser
        .execute(DisposeBrowserContextParams::new(context_id))
        .await
    {
        warn!("Disposing browser context failed: {e}");
    }
}

/// A page inside its own browser context.
pub struct ChromePage {
    page: Page,
    context_id: BrowserContextId,
    handle: Arc<ChromeHandle>,
}

#[async_trait]
impl FormPage for ChromePage {
    type Element = Element;

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), PageError> {
        let deadline = Instant::now() + timeout;
        let nav_error = |e: chromiumoxide::error::CdpError| PageError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let load = async {
            self.page.goto(url).await.map(|_| ()).map_err(nav_error)
        };
        match tokio::time::timeout(timeout, load).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(PageError::NavigationTimeout {
                    url: url.to_string(),
                    timeout,
                })
            }
        }

        let page = &self.page;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let settled = settle(
            |budget| check_network_idle(page, budget),
            || async move {
                if let Err(e) = page.wait_for_navigation().await {
                    debug!("Waiting for the next document failed: {e}");
                }
            },
            remaining,
        )
        .await;
        if settled {
            Ok(())
        } else {
            Err(PageError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            })
        }
    }

    async fn query(&self, selector: &str) -> Result<Option<Element>, PageError> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| PageError::Protocol(e.to_string()))?;
        Ok(elements.into_iter().next())
    }

    async fn fill_text(&self, element: &Element, value: &str) -> Result<(), PageError> {
        let action = |e: chromiumoxide::error::CdpError| PageError::Action(e.to_string());
        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map_err(action)?;
        element.focus().await.map_err(action)?;
        element.type_str(value).await.map_err(action)?;
        element
            .call_js_fn(
                "function() { this.dispatchEvent(new Event('change', { bubbles: true })); }",
                false,
            )
            .await
            .map_err(action)?;
        Ok(())
    }

    async fn attach_file(&self, element: &Element, path: &Path) -> Result<(), PageError> {
        let params = SetFileInputFilesParams::builder()
            .files(vec![path.to_string_lossy().into_owned()])
            .backend_node_id(element.backend_node_id.clone())
            .build()
            .map_err(PageError::Action)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| PageError::Action(e.to_string()))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, PageError> {
        self.page
            .url()
            .await
            .map_err(|e| PageError::Protocol(e.to_string()))?
            .ok_or_else(|| PageError::Protocol("page has no URL".to_string()))
    }
}

/// Checks in-page until the document is complete and no new resources have
/// been fetched for one second. An evaluation error means the document was
/// replaced while being checked.
async fn check_network_idle(page: &Page, budget: Duration) -> IdleCheck {
    let budget_ms = budget.as_millis().min(u128::from(u64::MAX)) as u64;
    let js = format!(
        r#"(async () => {{
            const timeoutMs = {budget_ms};
            const idleMs = 1000;
            const interval = 250;
            const start = Date.now();
            const count = () => {{
                try {{ return performance.getEntriesByType('resource').length; }} catch (_) {{ return 0; }}
            }};
            let last = count();
            let stable = 0;
            while (Date.now() - start < timeoutMs) {{
                await new Promise(r => setTimeout(r, interval));
                const current = count();
                if (document.readyState === 'complete' && current === last) {{
                    stable += interval;
                    if (stable >= idleMs) return true;
                }} else {{
                    stable = 0;
                }}
                last = current;
            }}
            return false;
        }})()"#
    );

    let evaluation = tokio::time::timeout(budget + Duration::from_secs(1), page.evaluate(js)).await;
    match evaluation {
        Ok(Ok(result)) => match result.into_value::<bool>() {
            Ok(true) => IdleCheck::Idle,
            _ => IdleCheck::Busy,
        },
        Ok(Err(e)) => IdleCheck::Interrupted(e.to_string()),
        Err(_) => IdleCheck::Busy,
    }
}
