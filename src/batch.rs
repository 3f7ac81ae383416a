//! Batch runner: bounded-concurrency assembly over many entities.
//!
//! - Concurrency is capped by a semaphore (`max_concurrency`)
//! - Every upstream call is paced per source: a minimum interval plus
//!   random jitter between consecutive calls to the same upstream
//! - Cancellation is cooperative via a shared flag; entities not yet
//!   started are skipped and reported, in-flight entities finish their
//!   current stage and drain
//! - One entity's failure (even a lost task) never aborts the batch

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use crate::assembler::{AssemblyOutcome, AssemblyStatus, FundRecordAssembler};
use crate::config::PipelineConfig;
use crate::record::Source;

// ═══════════════════════════════════════════
// SourcePacer
// ═══════════════════════════════════════════

/// Serializes the gap between consecutive calls to the same upstream.
///
/// Each caller reserves the next free slot for its source while holding
/// the lock, then sleeps outside it, so concurrent entities queue behind
/// each other instead of stampeding one upstream.
pub struct SourcePacer {
    min_interval: Duration,
    jitter: Duration,
    next_slot: tokio::sync::Mutex<HashMap<Source, Instant>>,
}

impl SourcePacer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            min_interval: config.pace_min_interval,
            jitter: config.pace_jitter,
            next_slot: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Wait until this source's next free slot, then claim the one after.
    pub async fn pace(&self, source: Source) {
        let slot = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots.get(&source).copied().unwrap_or(now).max(now);
            let jitter_ms = if self.jitter.is_zero() {
                0
            } else {
                rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64)
            };
            slots.insert(
                source,
                slot + self.min_interval + Duration::from_millis(jitter_ms),
            );
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::trace!(source = %source, wait_ms = wait.as_millis() as u64, "Pacing upstream call");
            tokio::time::sleep(wait).await;
        }
    }
}

// ═══════════════════════════════════════════
// Batch events and outcome
// ═══════════════════════════════════════════

/// Progress events emitted while a batch runs. Serialized tagged so a
/// frontend can stream them as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    EntityStarted {
        entity_id: String,
    },
    EntityFinished {
        entity_id: String,
        status: AssemblyStatus,
        overall_confidence: u8,
    },
    EntitySkipped {
        entity_id: String,
    },
    BatchFinished {
        run_id: String,
        processed: usize,
        skipped: usize,
    },
}

/// The result of one batch run.
#[derive(Debug)]
pub struct BatchOutcome {
    pub run_id: String,
    /// One outcome per attempted entity, in input order.
    pub outcomes: Vec<AssemblyOutcome>,
    /// Entity ids skipped because cancellation arrived before they started.
    pub skipped: Vec<String>,
    pub duration: Duration,
}

impl BatchOutcome {
    pub fn all_failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == AssemblyStatus::AllSourcesFailed)
            .count()
    }
}

enum TaskResult {
    Done(AssemblyOutcome),
    Skipped(String),
}

// ═══════════════════════════════════════════
// run_batch
// ═══════════════════════════════════════════

/// Assemble records for `entity_ids` with bounded concurrency.
///
/// Progress events go to `progress` if supplied; a closed receiver is
/// ignored, never an error. The returned outcome preserves input order
/// regardless of completion order.
pub async fn run_batch(
    assembler: Arc<FundRecordAssembler>,
    entity_ids: Vec<String>,
    cancel: Arc<AtomicBool>,
    progress: Option<mpsc::UnboundedSender<BatchEvent>>,
) -> BatchOutcome {
    let run_id = Uuid::new_v4().to_string();
    let started = Instant::now();
    let semaphore = Arc::new(Semaphore::new(assembler.config().max_concurrency.max(1)));

    tracing::info!(
        run_id = %run_id,
        entities = entity_ids.len(),
        max_concurrency = assembler.config().max_concurrency,
        "Batch run starting"
    );

    let mut handles = Vec::with_capacity(entity_ids.len());
    for entity_id in entity_ids {
        let assembler = Arc::clone(&assembler);
        let semaphore = Arc::clone(&semaphore);
        let cancel = Arc::clone(&cancel);
        let progress = progress.clone();

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                // The semaphore is never closed while handles are live.
                return TaskResult::Skipped(entity_id);
            };
            if cancel.load(Ordering::Relaxed) {
                emit(&progress, BatchEvent::EntitySkipped {
                    entity_id: entity_id.clone(),
                });
                return TaskResult::Skipped(entity_id);
            }

            emit(&progress, BatchEvent::EntityStarted {
                entity_id: entity_id.clone(),
            });
            let outcome = assembler.assemble_with_cancel(&entity_id, &cancel).await;
            emit(&progress, BatchEvent::EntityFinished {
                entity_id,
                status: outcome.status.clone(),
                overall_confidence: outcome.record.overall_confidence,
            });
            TaskResult::Done(outcome)
        }));
    }

    let mut outcomes = Vec::new();
    let mut skipped = Vec::new();
    for (position, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(TaskResult::Done(outcome)) => outcomes.push(outcome),
            Ok(TaskResult::Skipped(entity_id)) => skipped.push(entity_id),
            Err(join_error) => {
                // Panics are caught inside the assembler, but a lost
                // task still may not sink the batch.
                tracing::error!(
                    run_id = %run_id,
                    position,
                    error = %join_error,
                    "Batch task lost"
                );
                outcomes.push(assembler.all_failed_outcome(
                    &format!("entity-at-{position}"),
                    &format!("task lost: {join_error}"),
                ));
            }
        }
    }

    emit(&progress, BatchEvent::BatchFinished {
        run_id: run_id.clone(),
        processed: outcomes.len(),
        skipped: skipped.len(),
    });

    let duration = started.elapsed();
    tracing::info!(
        run_id = %run_id,
        processed = outcomes.len(),
        skipped = skipped.len(),
        all_failed = outcomes
            .iter()
            .filter(|o| o.status == AssemblyStatus::AllSourcesFailed)
            .count(),
        duration_ms = duration.as_millis() as u64,
        "Batch run finished"
    );

    BatchOutcome {
        run_id,
        outcomes,
        skipped,
        duration,
    }
}

fn emit(progress: &Option<mpsc::UnboundedSender<BatchEvent>>, event: BatchEvent) {
    if let Some(tx) = progress {
        let _ = tx.send(event);
    }
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DocumentCache;
    use crate::sources::{
        DocumentSource, ListingMatch, ListingProvider, SourceError, StructuredProvider,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    const SHEET: &str = "\
Folleto Informativo del fondo, serie única, para partícipes.
RUN: 10.446-9
Perfil de Riesgo: R3
Tolerancia al riesgo: Media
Horizonte de inversión: 24 meses
";

    struct StubStructured;

    #[async_trait]
    impl StructuredProvider for StubStructured {
        async fn fetch(&self, entity_id: &str) -> Result<Option<serde_json::Value>, SourceError> {
            Ok(Some(json!({ "nombre": format!("Fondo {entity_id}") })))
        }
    }

    struct StubListing;

    #[async_trait]
    impl ListingProvider for StubListing {
        async fn lookup(&self, entity_id: &str) -> Result<Option<ListingMatch>, SourceError> {
            Ok(Some(ListingMatch {
                name: format!("Fondo {entity_id}"),
                identifier: "10.446-9".into(),
                series: Some("A".into()),
                document_token: Some(format!("folleto/{entity_id}")),
            }))
        }
    }

    struct CountingDocuments {
        concurrent: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DocumentSource for CountingDocuments {
        async fn fetch(&self, _: &str) -> Result<Option<Vec<u8>>, SourceError> {
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            Ok(Some(SHEET.as_bytes().to_vec()))
        }
    }

    fn make_assembler(
        dir: &std::path::Path,
        max_concurrency: usize,
        peak: Arc<AtomicUsize>,
    ) -> Arc<FundRecordAssembler> {
        let config = PipelineConfig {
            cache_dir: dir.to_path_buf(),
            source_timeout: Duration::from_secs(1),
            max_concurrency,
            pace_min_interval: Duration::ZERO,
            pace_jitter: Duration::ZERO,
            min_document_len: 40,
            ..PipelineConfig::default()
        };
        let cache = Arc::new(
            DocumentCache::open(&config.cache_dir, config.cache_horizon_days).unwrap(),
        );
        Arc::new(FundRecordAssembler::new(
            config,
            Box::new(StubStructured),
            Box::new(StubListing),
            Box::new(CountingDocuments {
                concurrent: Arc::new(AtomicUsize::new(0)),
                peak,
            }),
            cache,
        ))
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("fondo-{i}")).collect()
    }

    #[tokio::test]
    async fn processes_all_entities_and_preserves_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = make_assembler(dir.path(), 4, Arc::new(AtomicUsize::new(0)));

        let outcome = run_batch(
            assembler,
            ids(6),
            Arc::new(AtomicBool::new(false)),
            None,
        )
        .await;

        assert_eq!(outcome.outcomes.len(), 6);
        assert!(outcome.skipped.is_empty());
        for (i, entity) in outcome.outcomes.iter().enumerate() {
            assert_eq!(entity.record.entity_id, format!("fondo-{i}"));
            assert_eq!(entity.status, AssemblyStatus::Complete);
        }
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        let peak = Arc::new(AtomicUsize::new(0));
        let assembler = make_assembler(dir.path(), 2, Arc::clone(&peak));

        run_batch(
            assembler,
            ids(8),
            Arc::new(AtomicBool::new(false)),
            None,
        )
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 2, "peak {}", peak.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancellation_before_start_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = make_assembler(dir.path(), 4, Arc::new(AtomicUsize::new(0)));

        let outcome = run_batch(
            assembler,
            ids(5),
            Arc::new(AtomicBool::new(true)),
            None,
        )
        .await;

        assert!(outcome.outcomes.is_empty());
        assert_eq!(outcome.skipped.len(), 5);
    }

    #[tokio::test]
    async fn progress_events_bracket_each_entity() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = make_assembler(dir.path(), 1, Arc::new(AtomicUsize::new(0)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        run_batch(
            assembler,
            ids(2),
            Arc::new(AtomicBool::new(false)),
            Some(tx),
        )
        .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        let started = events
            .iter()
            .filter(|e| matches!(e, BatchEvent::EntityStarted { .. }))
            .count();
        let finished = events
            .iter()
            .filter(|e| matches!(e, BatchEvent::EntityFinished { .. }))
            .count();
        assert_eq!(started, 2);
        assert_eq!(finished, 2);
        assert!(matches!(
            events.last(),
            Some(BatchEvent::BatchFinished { processed: 2, skipped: 0, .. })
        ));
    }

    #[tokio::test]
    async fn dropped_progress_receiver_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = make_assembler(dir.path(), 2, Arc::new(AtomicUsize::new(0)));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let outcome = run_batch(
            assembler,
            ids(3),
            Arc::new(AtomicBool::new(false)),
            Some(tx),
        )
        .await;

        assert_eq!(outcome.outcomes.len(), 3);
    }

    #[tokio::test]
    async fn batch_events_serialize_tagged() {
        let event = BatchEvent::EntityFinished {
            entity_id: "fondo-1".into(),
            status: AssemblyStatus::Complete,
            overall_confidence: 72,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "entity_finished");
        assert_eq!(value["status"]["status"], "complete");
        assert_eq!(value["overall_confidence"], 72);
    }

    #[tokio::test]
    async fn pacer_spaces_consecutive_calls_to_one_source() {
        let config = PipelineConfig {
            pace_min_interval: Duration::from_millis(30),
            pace_jitter: Duration::ZERO,
            ..PipelineConfig::default()
        };
        let pacer = SourcePacer::new(&config);

        let start = Instant::now();
        pacer.pace(Source::Document).await;
        pacer.pace(Source::Document).await;
        pacer.pace(Source::Document).await;
        assert!(
            start.elapsed() >= Duration::from_millis(60),
            "elapsed {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn pacer_does_not_couple_distinct_sources() {
        let config = PipelineConfig {
            pace_min_interval: Duration::from_millis(200),
            pace_jitter: Duration::ZERO,
            ..PipelineConfig::default()
        };
        let pacer = SourcePacer::new(&config);

        let start = Instant::now();
        pacer.pace(Source::Document).await;
        pacer.pace(Source::StructuredApi).await;
        pacer.pace(Source::ListingApi).await;
        assert!(
            start.elapsed() < Duration::from_millis(150),
            "elapsed {:?}",
            start.elapsed()
        );
    }
}
