//! Form-field locator: ordered selector fallback with a bounded wait per pattern.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::apply::fields::{LogicalField, SelectorTable};
use crate::apply::page::FormPage;

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Result of looking up one logical field.
#[derive(Debug)]
pub enum Located<E> {
    Found {
        element: E,
        selector: String,
        /// Position of the winning pattern in the field's list.
        rank: usize,
    },
    NotFound,
}

impl<E> Located<E> {
    #[cfg(test)]
    pub fn is_found(&self) -> bool {
        matches!(self, Located::Found { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FieldLocator {
    selectors: Arc<SelectorTable>,
    attempt_timeout: Duration,
    poll_interval: Duration,
}

impl FieldLocator {
    pub fn new(selectors: SelectorTable, attempt_timeout: Duration) -> Self {
        Self {
            selectors: Arc::new(selectors),
            attempt_timeout,
            poll_interval: POLL_INTERVAL.min(attempt_timeout),
        }
    }

    /// Tries each pattern for `field` in priority order and returns the first hit.
    ///
    /// A pattern that times out is not an error; `NotFound` means the field
    /// is simply not on this form.
    pub async fn locate<P: FormPage>(&self, page: &P, field: LogicalField) -> Located<P::Element> {
        for (rank, selector) in self.selectors.patterns(field).iter().enumerate() {
            match self.wait_for_selector(page, selector).await {
                Some(element) => {
                    debug!("Field '{field}' resolved via pattern #{rank} {selector}");
                    return Located::Found {
                        element,
                        selector: selector.clone(),
                        rank,
                    };
                }
                None => {
                    debug!(
                        "Selector {selector} not found for {field} within {:?}",
                        self.attempt_timeout
                    );
                }
            }
        }
        Located::NotFound
    }

    /// Polls until `selector` matches or the attempt timeout elapses.
    async fn wait_for_selector<P: FormPage>(&self, page: &P, selector: &str) -> Option<P::Element> {
        let poll = async {
            loop {
                match page.query(selector).await {
                    Ok(Some(element)) => return element,
                    Ok(None) => {}
                    Err(e) => debug!("Query for {selector} errored, retrying: {e}"),
                }
                sleep(self.poll_interval).await;
            }
        };
        timeout(self.attempt_timeout, poll).await.ok()
    }
}
