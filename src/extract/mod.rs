//! Document Extractor: raw fact-sheet text → one document-sourced
//! `PartialFactSet`.

mod composition;
mod document;

pub use composition::extract_composition;
pub use document::DocumentExtractor;

/// Errors from document extraction.
///
/// "Field not found" is deliberately NOT here — it is the expected,
/// frequent case and is logged at debug level, never raised.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Document unusable: {length} chars after trimming (minimum {minimum})")]
    DocumentUnusable { length: usize, minimum: usize },
}
