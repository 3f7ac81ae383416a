pub mod config;
pub mod schema; // Canonical field catalog: tiers, priorities, sane ranges
pub mod record; // FactValue, PartialFactSet, FundRecord, lineage
pub mod patterns; // Pattern library + localization normalizers
pub mod extract; // Document text → document-sourced fact set
pub mod sources; // Collaborator traits + structured/listing adapters
pub mod cache; // Content-addressed document cache
pub mod reconcile; // Priority-walk merge + completeness scoring
pub mod assembler; // Per-entity orchestration, panic boundary
pub mod batch; // Bounded-concurrency batch runner, pacing

pub use assembler::{AssemblyOutcome, AssemblyStatus, FundRecordAssembler};
pub use batch::{run_batch, BatchEvent, BatchOutcome};
pub use record::{FundRecord, PartialFactSet, Source};
pub use schema::Field;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for binaries embedding this crate.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("Fichero core v{}", config::APP_VERSION);
}
