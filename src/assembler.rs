//! Fund Record Assembler — orchestrates the full per-entity pipeline.
//!
//! Flow: cache check → retrieval → extraction → reconciliation → scoring.
//! This is the only component that calls multiple other components in
//! sequence; it owns no extraction or merge logic of its own.
//!
//! Failure policy:
//! - A failed source never aborts the entity; its fact set is marked
//!   wholly absent and the pipeline continues
//! - Only all-sources-failed is surfaced as a distinguishable status
//! - No panic crosses the assembler boundary: a panic anywhere in the
//!   per-entity flow becomes an all-failed outcome with the
//!   detail attached for diagnostics

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use serde::Serialize;

use crate::batch::SourcePacer;
use crate::cache::DocumentCache;
use crate::config::PipelineConfig;
use crate::extract::DocumentExtractor;
use crate::reconcile::reconcile;
use crate::record::{FundRecord, PartialFactSet, Source};
use crate::sources::{
    normalize_listing, normalize_structured, DocumentSource, ListingProvider, SourceError,
    StructuredProvider,
};

// ═══════════════════════════════════════════
// Stages and outcomes
// ═══════════════════════════════════════════

/// Linear per-entity pipeline stages, no cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    CacheChecked,
    Retrieved,
    RetrievalFailed,
    Extracted,
    ExtractionFailed,
    Reconciled,
    Scored,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CacheChecked => "cache_checked",
            Self::Retrieved => "retrieved",
            Self::RetrievalFailed => "retrieval_failed",
            Self::Extracted => "extracted",
            Self::ExtractionFailed => "extraction_failed",
            Self::Reconciled => "reconciled",
            Self::Scored => "scored",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an entity's assembly ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssemblyStatus {
    /// All three sources contributed (even if some matched nothing).
    Complete,
    /// Some sources failed; the record holds whatever the rest supplied.
    Partial { failed: Vec<Source> },
    /// Every source failed. The record is schema-complete but all-absent;
    /// this must never be mistaken for a successful extraction.
    AllSourcesFailed,
}

/// The assembler's result for one entity: always a schema-complete
/// record, plus the status the caller must not ignore.
#[derive(Debug, Clone)]
pub struct AssemblyOutcome {
    pub record: FundRecord,
    pub status: AssemblyStatus,
}

// ═══════════════════════════════════════════
// FundRecordAssembler
// ═══════════════════════════════════════════

/// Per-entity orchestrator. Collaborators are injected as trait objects,
/// which allows mocking every external seam in tests.
pub struct FundRecordAssembler {
    structured: Box<dyn StructuredProvider>,
    listing: Box<dyn ListingProvider>,
    documents: Box<dyn DocumentSource>,
    cache: Arc<DocumentCache>,
    extractor: DocumentExtractor,
    pacer: Arc<SourcePacer>,
    config: PipelineConfig,
}

impl FundRecordAssembler {
    pub fn new(
        config: PipelineConfig,
        structured: Box<dyn StructuredProvider>,
        listing: Box<dyn ListingProvider>,
        documents: Box<dyn DocumentSource>,
        cache: Arc<DocumentCache>,
    ) -> Self {
        Self {
            extractor: DocumentExtractor::new(&config),
            pacer: Arc::new(SourcePacer::new(&config)),
            structured,
            listing,
            documents,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Assemble one entity's record.
    pub async fn assemble(&self, entity_id: &str) -> AssemblyOutcome {
        let never_cancelled = AtomicBool::new(false);
        self.assemble_with_cancel(entity_id, &never_cancelled).await
    }

    /// Assemble with cooperative cancellation: once `cancel` is set,
    /// remaining source calls are skipped, but reconciliation and scoring
    /// still run so the entity yields a schema-complete record.
    pub async fn assemble_with_cancel(
        &self,
        entity_id: &str,
        cancel: &AtomicBool,
    ) -> AssemblyOutcome {
        match AssertUnwindSafe(self.run_pipeline(entity_id, cancel))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let detail = panic_detail(panic);
                tracing::error!(
                    entity_id = %entity_id,
                    detail = %detail,
                    "Pipeline panicked, converting to all-failed outcome"
                );
                self.all_failed_outcome(entity_id, &format!("pipeline panicked: {detail}"))
            }
        }
    }

    /// An all-failed outcome with the same schema-complete record shape
    /// every attempted entity gets. Also used by the batch runner when a
    /// task is lost entirely.
    pub fn all_failed_outcome(&self, entity_id: &str, detail: &str) -> AssemblyOutcome {
        let record = reconcile(
            entity_id,
            &PartialFactSet::failed(Source::StructuredApi, detail),
            &PartialFactSet::failed(Source::ListingApi, detail),
            &PartialFactSet::failed(Source::Document, detail),
        );
        AssemblyOutcome {
            record,
            status: AssemblyStatus::AllSourcesFailed,
        }
    }

    // ── pipeline ─────────────────────────────────────────

    async fn run_pipeline(&self, entity_id: &str, cancel: &AtomicBool) -> AssemblyOutcome {
        let mut stage = Stage::Pending;

        // Listing first: it supplies both facts and the document-location
        // token. The core never constructs document locations itself.
        let listing_result = if cancelled(entity_id, cancel) {
            Err("cancelled before listing lookup".to_string())
        } else {
            self.pacer.pace(Source::ListingApi).await;
            self.bounded(self.listing.lookup(entity_id))
                .await
                .map_err(|e| e.to_string())
        };

        let (listing_facts, document_token) = match &listing_result {
            Ok(Some(matched)) => (
                normalize_listing(entity_id, matched),
                matched.document_token.clone(),
            ),
            Ok(None) => {
                tracing::warn!(entity_id = %entity_id, source = %Source::ListingApi, "No match in directory");
                (
                    PartialFactSet::failed(Source::ListingApi, "no match in directory"),
                    None,
                )
            }
            Err(reason) => {
                tracing::warn!(entity_id = %entity_id, source = %Source::ListingApi, reason = %reason, "Listing source failed");
                (PartialFactSet::failed(Source::ListingApi, reason), None)
            }
        };

        // Document: cache, then fetch via the listing's token on a miss.
        let document_text = self
            .obtain_document(entity_id, document_token.as_deref(), cancel, &mut stage)
            .await;

        let document_facts = match &document_text {
            Ok(text) => match self.extractor.extract(entity_id, text) {
                Ok(facts) => {
                    advance(entity_id, &mut stage, Stage::Extracted);
                    facts
                }
                Err(e) => {
                    advance(entity_id, &mut stage, Stage::ExtractionFailed);
                    tracing::warn!(entity_id = %entity_id, error = %e, "Document unusable");
                    PartialFactSet::failed(Source::Document, e.to_string())
                }
            },
            Err(reason) => PartialFactSet::failed(Source::Document, reason.clone()),
        };

        let structured_facts = if cancelled(entity_id, cancel) {
            PartialFactSet::failed(Source::StructuredApi, "cancelled before structured fetch")
        } else {
            self.pacer.pace(Source::StructuredApi).await;
            match self.bounded(self.structured.fetch(entity_id)).await {
                Ok(Some(raw)) => normalize_structured(entity_id, &raw),
                Ok(None) => {
                    tracing::warn!(entity_id = %entity_id, source = %Source::StructuredApi, "No data for entity");
                    PartialFactSet::failed(Source::StructuredApi, "no data for entity")
                }
                Err(e) => {
                    tracing::warn!(entity_id = %entity_id, source = %Source::StructuredApi, error = %e, "Structured source failed");
                    PartialFactSet::failed(Source::StructuredApi, e.to_string())
                }
            }
        };

        advance(entity_id, &mut stage, Stage::Reconciled);
        let record = reconcile(entity_id, &structured_facts, &listing_facts, &document_facts);
        advance(entity_id, &mut stage, Stage::Scored);

        let failed: Vec<Source> = [&structured_facts, &listing_facts, &document_facts]
            .iter()
            .filter(|set| set.is_failed())
            .map(|set| set.source)
            .collect();

        let status = if failed.len() == 3 {
            tracing::error!(
                entity_id = %entity_id,
                "All sources failed: record has zero populated fields"
            );
            AssemblyStatus::AllSourcesFailed
        } else if failed.is_empty() {
            AssemblyStatus::Complete
        } else {
            AssemblyStatus::Partial { failed }
        };

        AssemblyOutcome { record, status }
    }

    /// Cache check, then collaborator fetch. `Err` carries the reason the
    /// document-sourced set will report as its failure.
    async fn obtain_document(
        &self,
        entity_id: &str,
        token: Option<&str>,
        cancel: &AtomicBool,
        stage: &mut Stage,
    ) -> Result<String, String> {
        advance(entity_id, stage, Stage::CacheChecked);
        match self.cache.get(entity_id) {
            Ok(Some(hit)) => {
                advance(entity_id, stage, Stage::Retrieved);
                return Ok(String::from_utf8_lossy(&hit.payload).into_owned());
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(entity_id = %entity_id, error = %e, "Cache read failed, fetching fresh");
            }
        }

        let Some(token) = token else {
            advance(entity_id, stage, Stage::RetrievalFailed);
            return Err("no document token from listing".to_string());
        };

        if cancelled(entity_id, cancel) {
            advance(entity_id, stage, Stage::RetrievalFailed);
            return Err("cancelled before document retrieval".to_string());
        }

        self.pacer.pace(Source::Document).await;
        match self.bounded(self.documents.fetch(token)).await {
            Ok(Some(payload)) => {
                if let Err(e) = self.cache.put(entity_id, &payload) {
                    // A broken cache must not cost us the fetched document.
                    tracing::warn!(entity_id = %entity_id, error = %e, "Failed to cache document");
                }
                advance(entity_id, stage, Stage::Retrieved);
                Ok(String::from_utf8_lossy(&payload).into_owned())
            }
            Ok(None) => {
                advance(entity_id, stage, Stage::RetrievalFailed);
                tracing::warn!(entity_id = %entity_id, token = %token, "Document not available");
                Err("document not available".to_string())
            }
            Err(e) => {
                advance(entity_id, stage, Stage::RetrievalFailed);
                tracing::warn!(entity_id = %entity_id, error = %e, "Document retrieval failed");
                Err(e.to_string())
            }
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, SourceError>>,
    ) -> Result<T, SourceError> {
        match tokio::time::timeout(self.config.source_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout),
        }
    }
}

fn advance(entity_id: &str, stage: &mut Stage, next: Stage) {
    tracing::debug!(entity_id = %entity_id, from = %stage, to = %next, "Stage transition");
    *stage = next;
}

fn cancelled(entity_id: &str, cancel: &AtomicBool) -> bool {
    let is_cancelled = cancel.load(Ordering::Relaxed);
    if is_cancelled {
        tracing::info!(entity_id = %entity_id, "Cancellation requested, skipping remaining source calls");
    }
    is_cancelled
}

fn panic_detail(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
