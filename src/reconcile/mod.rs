//! Reconciliation Engine: priority-walk merge plus completeness scoring.

mod engine;
pub mod scoring;

pub use engine::reconcile;
pub use scoring::overall_confidence;
