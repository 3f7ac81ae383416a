use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "fichero";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory (~/Fichero/ on all platforms)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Fichero")
}

/// Get the default document cache directory
pub fn default_cache_dir() -> PathBuf {
    app_data_dir().join("cache")
}

/// Default log filter when RUST_LOG is not set
pub fn default_log_filter() -> String {
    format!("{APP_NAME}=info")
}

/// Tunables for the extraction pipeline.
///
/// Everything time- or size-shaped lives here so expiration horizons and
/// request pacing never end up embedded in business logic.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory of the document cache (index + payloads).
    pub cache_dir: PathBuf,
    /// How long a cached document stays valid.
    pub cache_horizon_days: i64,
    /// Upper bound on any single collaborator call (listing lookup,
    /// document fetch, structured-API fetch).
    pub source_timeout: Duration,
    /// Maximum entities processed in parallel by a batch run.
    pub max_concurrency: usize,
    /// Minimum delay between two consecutive calls to the same upstream.
    pub pace_min_interval: Duration,
    /// Random extra delay added on top of `pace_min_interval`.
    pub pace_jitter: Duration,
    /// Documents shorter than this (after trimming) are unusable.
    pub min_document_len: usize,
    /// Allowed deviation, in percent points, of a composition table's
    /// row sum from 100 before the record is flagged.
    pub composition_sum_tolerance: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            cache_horizon_days: 30,
            source_timeout: Duration::from_secs(30),
            max_concurrency: 4,
            pace_min_interval: Duration::from_millis(2000),
            pace_jitter: Duration::from_millis(500),
            min_document_len: 200,
            composition_sum_tolerance: 5.0,
        }
    }
}
