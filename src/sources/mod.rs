//! Source adapters and collaborator seams.
//!
//! Transport, auth, and retries live outside this crate; the traits here
//! are the seams through which the assembler reaches the outside world.
//! The adapters themselves (`structured`, `listing`) are pure
//! normalization: source-native shapes in, `PartialFactSet` out.

mod listing;
mod structured;

pub use listing::normalize_listing;
pub use structured::normalize_structured;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors a collaborator can report for one entity.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),
    #[error("Source timed out")]
    Timeout,
    #[error("Malformed source response: {0}")]
    Malformed(String),
}

/// A matched entity from the directory/listing lookup.
///
/// `document_token` is transport metadata telling the document source
/// where the fact sheet lives. It is never a record field, and the core
/// never constructs document locations itself — this token is the only
/// way to reach a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingMatch {
    pub name: String,
    pub identifier: String,
    pub series: Option<String>,
    pub document_token: Option<String>,
}

/// Structured-API collaborator: raw key-value response for one entity.
#[async_trait]
pub trait StructuredProvider: Send + Sync {
    async fn fetch(&self, entity_id: &str) -> Result<Option<serde_json::Value>, SourceError>;
}

/// Directory/listing collaborator: matched-entity metadata.
#[async_trait]
pub trait ListingProvider: Send + Sync {
    async fn lookup(&self, entity_id: &str) -> Result<Option<ListingMatch>, SourceError>;
}

/// Document collaborator: raw document bytes for a location token, or an
/// explicit "not available".
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, document_token: &str) -> Result<Option<Vec<u8>>, SourceError>;
}
