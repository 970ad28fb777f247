use bytes::Bytes;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("the uploaded file is not a readable PDF: {0}")]
    Unreadable(String),

    #[error("the uploaded PDF contains no text")]
    Empty,

    #[error("text extraction task failed: {0}")]
    Join(#[from] JoinError),
}

/// Extracts plain text from a PDF resume.
///
/// PDF parsing is CPU-bound, so it runs on the blocking pool.
pub async fn extract_resume_text(pdf: Bytes) -> Result<String, ExtractError> {
    let size = pdf.len();
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&pdf))
        .await
        .map_err(|e| {
            // pdf-extract panics on some malformed documents
            if e.is_panic() {
                ExtractError::Unreadable("PDF parser panicked".to_string())
            } else {
                ExtractError::Join(e)
            }
        })?
        .map_err(|e| ExtractError::Unreadable(e.to_string()))?;

    if text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    debug!("Extracted {} chars from a {size}-byte PDF", text.len());
    Ok(text)
}
