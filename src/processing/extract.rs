//! Plain-text extraction for uploaded documents.

use super::types::{Document, ExtractionError, MediaType};

/// Extract the text of a document.
///
/// PDFs are parsed with `pdf-extract`, which concatenates the text of every page in document
/// order. Everything else is decoded as strict UTF-8. Failures are reported rather than
/// collapsed into empty text.
pub fn extract_text(document: &Document) -> Result<String, ExtractionError> {
    match document.media_type {
        MediaType::Pdf => extract_pdf(document),
        MediaType::Text => std::str::from_utf8(&document.content)
            .map(str::to_string)
            .map_err(|source| ExtractionError::InvalidUtf8 {
                file_name: document.file_name.clone(),
                source,
            }),
    }
}

/// Run [`extract_text`] on the blocking pool.
///
/// `pdf-extract` panics on some malformed inputs; a panicked task is reported as an
/// extraction failure for that document.
pub async fn extract_text_blocking(document: Document) -> Result<String, ExtractionError> {
    let file_name = document.file_name.clone();
    tokio::task::spawn_blocking(move || extract_text(&document))
        .await
        .map_err(|err| ExtractionError::Aborted {
            file_name,
            reason: if err.is_panic() {
                "parser panicked on malformed input".to_string()
            } else {
                err.to_string()
            },
        })?
}

fn extract_pdf(document: &Document) -> Result<String, ExtractionError> {
    let text = pdf_extract::extract_text_from_mem(&document.content).map_err(|err| {
        ExtractionError::Pdf {
            file_name: document.file_name.clone(),
            reason: err.to_string(),
        }
    })?;
    tracing::debug!(
        file = %document.file_name,
        bytes = document.content.len(),
        chars = text.chars().count(),
        "Extracted PDF text"
    );
    Ok(text)
}
