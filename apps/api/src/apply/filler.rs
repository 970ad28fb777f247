//! Form filler: navigate, populate every recognizable field, stop before submit.
//!
//! Per-field problems (missing field, failed fill) never abort a task. Only a
//! failed navigation does. The submit control is located and reported but
//! never clicked: "form populated and ready" is the success boundary.

use std::io::Write;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::apply::fields::{FieldKind, LogicalField};
use crate::apply::locator::{FieldLocator, Located};
use crate::apply::page::{FormPage, PageError};
use crate::models::application::{
    ApplicationTask, FailureCause, FailureStage, FieldFill, FieldSkip, FillOutcome,
    ResumeAttachment, SkipReason,
};

pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Task-fatal failure raised by the filler.
#[derive(Debug, Error)]
pub enum FillFailure {
    #[error("navigation failed: {0}")]
    Navigation(#[source] PageError),
}

impl From<FillFailure> for FailureCause {
    fn from(failure: FillFailure) -> Self {
        match failure {
            FillFailure::Navigation(e) => FailureCause {
                stage: FailureStage::Navigate,
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormFiller {
    locator: FieldLocator,
    navigation_timeout: Duration,
}

impl FormFiller {
    pub fn new(locator: FieldLocator, navigation_timeout: Duration) -> Self {
        Self {
            locator,
            navigation_timeout,
        }
    }

    /// Prepares the application form for `task` on `page`.
    pub async fn fill<P: FormPage>(
        &self,
        task: &ApplicationTask,
        page: &P,
    ) -> Result<FillOutcome, FillFailure> {
        page.navigate(&task.job_redirect_url, self.navigation_timeout)
            .await
            .map_err(FillFailure::Navigation)?;
        debug!("Task {} navigated to {}", task.id, task.job_redirect_url);

        let mut filled = Vec::new();
        let mut skipped = Vec::new();
        let mut submit_located = false;

        for field in LogicalField::FILL_ORDER {
            let (element, selector) = match self.locator.locate(page, field).await {
                Located::Found {
                    element, selector, ..
                } => (element, selector),
                Located::NotFound => {
                    debug!("Task {}: field '{field}' not present on form", task.id);
                    skipped.push(skip(field, SkipReason::NotFound));
                    continue;
                }
            };

            let action = match field.kind() {
                FieldKind::Control => {
                    submit_located = true;
                    continue;
                }
                FieldKind::Text => match task.applicant_value(field.as_str()) {
                    Some(value) => page.fill_text(&element, value).await,
                    None => {
                        skipped.push(skip(field, SkipReason::NoValue));
                        continue;
                    }
                },
                FieldKind::File => match &task.resume_attachment {
                    Some(attachment) => attach_resume(page, &element, attachment).await,
                    None => {
                        skipped.push(skip(field, SkipReason::NoValue));
                        continue;
                    }
                },
            };

            match action {
                Ok(()) => filled.push(FieldFill {
                    field: field.as_str().to_string(),
                    selector,
                }),
                Err(e) => {
                    warn!("Task {}: filling '{field}' via {selector} failed: {e}", task.id);
                    skipped.push(skip(
                        field,
                        SkipReason::FillFailed {
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }

        let landed_url = match page.current_url().await {
            Ok(url) => url,
            Err(e) => {
                warn!("Task {}: could not read page URL, using target: {e}", task.id);
                task.job_redirect_url.clone()
            }
        };

        info!(
            "Task {} ready: {} filled, {} skipped, submit located: {submit_located}",
            task.id,
            filled.len(),
            skipped.len()
        );

        Ok(FillOutcome {
            landed_url,
            filled,
            skipped,
            submit_located,
        })
    }
}

fn skip(field: LogicalField, reason: SkipReason) -> FieldSkip {
    FieldSkip {
        field: field.as_str().to_string(),
        reason,
    }
}

/// File inputs take a path, so the attachment is written to a temp file that
/// lives until the attach call returns.
async fn attach_resume<P: FormPage>(
    page: &P,
    element: &P::Element,
    attachment: &ResumeAttachment,
) -> Result<(), PageError> {
    let mut file = tempfile::Builder::new()
        .prefix("resume-")
        .suffix(&attachment.extension())
        .tempfile()
        .map_err(|e| PageError::Action(format!("temp file for resume: {e}")))?;
    file.write_all(&attachment.data)
        .and_then(|_| file.flush())
        .map_err(|e| PageError::Action(format!("writing resume: {e}")))?;

    page.attach_file(element, file.path()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::fields::SelectorTable;
    use crate::apply::locator::DEFAULT_ATTEMPT_TIMEOUT;
    use crate::apply::testing::{FakePage, PageCall};
    use crate::models::application::NewApplicationTask;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    const URL: &str = "https://example.com/apply";

    fn filler() -> FormFiller {
        FormFiller::new(
            FieldLocator::new(SelectorTable::default(), DEFAULT_ATTEMPT_TIMEOUT),
            DEFAULT_NAVIGATION_TIMEOUT,
        )
    }

    fn task(fields: &[(&str, &str)], resume: Option<ResumeAttachment>) -> ApplicationTask {
        let applicant_fields: BTreeMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApplicationTask::queued(
            Uuid::new_v4(),
            NewApplicationTask {
                job_id: None,
                job_redirect_url: URL.to_string(),
                applicant_fields,
                resume_attachment: resume,
                is_batch_member: true,
            },
        )
    }

    fn resume() -> ResumeAttachment {
        ResumeAttachment {
            id: Uuid::new_v4(),
            file_name: "cv.pdf".to_string(),
            data: bytes::Bytes::from_static(b"%PDF-1.4 resume"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_email_filled_via_most_specific_pattern() {
        let page = FakePage::new()
            .with_element(r#"input[type="email"]"#)
            .landing_at("https://example.com/apply?step=1");
        let task = task(&[("email", "a@b.com")], None);

        let outcome = filler().fill(&task, &page).await.unwrap();

        assert_eq!(outcome.landed_url, "https://example.com/apply?step=1");
        assert_eq!(
            outcome.filled,
            vec![FieldFill {
                field: "email".to_string(),
                selector: r#"input[type="email"]"#.to_string(),
            }]
        );
        assert_eq!(
            page.action_calls(),
            vec![PageCall::FillText {
                selector: r#"input[type="email"]"#.to_string(),
                value: "a@b.com".to_string(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_script_redirect_after_load_still_fills_form() {
        let page = FakePage::new()
            .with_element(r#"input[type="email"]"#)
            .with_client_redirect("https://boards.example/jobs/7/apply");
        let task = task(&[("email", "a@b.com")], None);

        let outcome = filler().fill(&task, &page).await.unwrap();

        assert_eq!(outcome.landed_url, "https://boards.example/jobs/7/apply");
        assert_eq!(outcome.filled.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_form_without_known_fields_is_still_ready() {
        let page = FakePage::new();
        let task = task(&[("name", "Ada"), ("email", "a@b.com")], Some(resume()));

        let outcome = filler().fill(&task, &page).await.unwrap();

        assert!(outcome.filled.is_empty());
        assert!(!outcome.submit_located);
        assert_eq!(outcome.skipped.len(), 4);
        assert!(outcome
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::NotFound));
        assert_eq!(outcome.landed_url, URL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_failure_is_fatal_and_touches_no_fields() {
        let page = FakePage::new()
            .with_element(r#"input[type="email"]"#)
            .failing_navigation("net::ERR_NAME_NOT_RESOLVED");
        let task = task(&[("email", "a@b.com")], None);

        let failure = filler().fill(&task, &page).await.unwrap_err();
        let cause: FailureCause = failure.into();

        assert_eq!(cause.stage, FailureStage::Navigate);
        assert!(cause.message.contains("ERR_NAME_NOT_RESOLVED"));
        assert_eq!(page.calls(), vec![PageCall::Navigate(URL.to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_file_input_skips_resume_only() {
        let page = FakePage::new()
            .with_element(r#"input[name*="name" i]"#)
            .with_element(r#"input[type="email"]"#);
        let task = task(&[("name", "Ada Lovelace"), ("email", "a@b.com")], Some(resume()));

        let outcome = filler().fill(&task, &page).await.unwrap();

        let filled: Vec<&str> = outcome.filled.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(filled, vec!["name", "email"]);
        assert!(outcome.skipped.contains(&FieldSkip {
            field: "resume".to_string(),
            reason: SkipReason::NotFound,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_attached_from_task_bytes() {
        let page = FakePage::new().with_element(r#"input[type="file"]"#);
        let task = task(&[], Some(resume()));

        let outcome = filler().fill(&task, &page).await.unwrap();

        assert_eq!(outcome.filled.len(), 1);
        assert_eq!(
            page.action_calls(),
            vec![PageCall::AttachFile {
                selector: r#"input[type="file"]"#.to_string(),
                contents: b"%PDF-1.4 resume".to_vec(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_field_without_value_is_skipped() {
        let page = FakePage::new()
            .with_element(r#"input[autocomplete="name"]"#)
            .with_element(r#"input[type="file"]"#);
        let task = task(&[("email", "a@b.com")], None);

        let outcome = filler().fill(&task, &page).await.unwrap();

        assert!(outcome.filled.is_empty());
        assert!(outcome.skipped.contains(&FieldSkip {
            field: "name".to_string(),
            reason: SkipReason::NoValue,
        }));
        assert!(outcome.skipped.contains(&FieldSkip {
            field: "resume".to_string(),
            reason: SkipReason::NoValue,
        }));
        assert!(page.action_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_element_does_not_abort_task() {
        let page = FakePage::new()
            .with_stale_element(r#"input[autocomplete="name"]"#)
            .with_element(r#"input[type="email"]"#);
        let task = task(&[("name", "Ada"), ("email", "a@b.com")], None);

        let outcome = filler().fill(&task, &page).await.unwrap();

        assert_eq!(outcome.filled.len(), 1);
        assert_eq!(outcome.filled[0].field, "email");
        assert!(outcome.skipped.iter().any(|s| s.field == "name"
            && matches!(s.reason, SkipReason::FillFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_located_but_never_invoked() {
        let page = FakePage::new()
            .with_element(r#"input[type="email"]"#)
            .with_element(r#"button[type="submit"]"#);
        let task = task(&[("email", "a@b.com")], None);

        let outcome = filler().fill(&task, &page).await.unwrap();

        assert!(outcome.submit_located);
        assert!(page.action_calls().iter().all(|c| !matches!(
            c,
            PageCall::FillText { selector, .. } | PageCall::AttachFile { selector, .. }
                if selector.contains("submit")
        )));
        assert!(!outcome.skipped.iter().any(|s| s.field == "submit"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refilling_same_task_is_repeatable() {
        let task = task(&[("email", "a@b.com")], None);
        let first = FakePage::new().with_element(r#"input[type="email"]"#);
        let second = FakePage::new().with_element(r#"input[type="email"]"#);

        let a = filler().fill(&task, &first).await.unwrap();
        let b = filler().fill(&task, &second).await.unwrap();

        assert_eq!(a, b);
    }
}
