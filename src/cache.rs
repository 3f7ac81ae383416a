//! Document retrieval cache.
//!
//! Content-addressed store of previously fetched documents, keyed by a
//! stable entity identifier and persisted across process runs.
//!
//! Key properties:
//! - `get` never blindly trusts an entry: expiry and the content hash are
//!   re-verified against the payload on every read
//! - Byte-identical payloads under different keys share one stored file
//!   (duplicate suppression)
//! - Reads are concurrent (`RwLock` index); writes are serialized per
//!   entity key, never behind one global lock

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const INDEX_FILE: &str = "index.json";
const PAYLOAD_DIR: &str = "payloads";

// ═══════════════════════════════════════════
// Entries
// ═══════════════════════════════════════════

/// Index metadata for one cached document.
/// `expires_at` is always `retrieved_at + configured horizon` — no field
/// of an entry is ever fabricated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub entity_key: String,
    /// SHA-256 of the payload, base64.
    pub content_hash: String,
    pub retrieved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub payload_path: PathBuf,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A cache hit: the verified payload plus its index entry.
#[derive(Debug, Clone)]
pub struct CachedDocument {
    pub entry: CacheEntry,
    pub payload: Vec<u8>,
}

/// Point-in-time cache shape, for operator logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub expired: usize,
    pub payload_bytes: u64,
}

// ═══════════════════════════════════════════
// DocumentCache
// ═══════════════════════════════════════════

/// JSON-indexed, content-addressed document store.
pub struct DocumentCache {
    root: PathBuf,
    horizon: Duration,
    index: RwLock<BTreeMap<String, CacheEntry>>,
    /// Per-key write locks so two concurrent puts for the same key cannot
    /// interleave, while puts for distinct keys proceed in parallel.
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentCache {
    /// Open (or create) a cache rooted at `root` with the given expiry
    /// horizon in days.
    pub fn open(root: impl Into<PathBuf>, horizon_days: i64) -> Result<Self, CacheError> {
        let root = root.into();
        std::fs::create_dir_all(root.join(PAYLOAD_DIR))?;

        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            let raw = std::fs::read_to_string(&index_path)?;
            serde_json::from_str(&raw)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            root,
            horizon: Duration::days(horizon_days),
            index: RwLock::new(index),
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Look up a document. Absent on: no entry, expired entry, missing
    /// payload file, or content-hash mismatch (corruption).
    pub fn get(&self, entity_key: &str) -> Result<Option<CachedDocument>, CacheError> {
        let entry = {
            let index = self.index.read().map_err(|_| CacheError::LockPoisoned)?;
            match index.get(entity_key) {
                Some(entry) => entry.clone(),
                None => {
                    tracing::debug!(entity_key = %entity_key, "Cache miss: no entry");
                    return Ok(None);
                }
            }
        };

        if entry.is_expired(Utc::now()) {
            tracing::info!(
                entity_key = %entity_key,
                expired_at = %entry.expires_at,
                "Cache miss: entry expired"
            );
            return Ok(None);
        }

        let payload = match std::fs::read(&entry.payload_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    entity_key = %entity_key,
                    path = %entry.payload_path.display(),
                    error = %e,
                    "Cache miss: payload file unreadable"
                );
                return Ok(None);
            }
        };

        if content_hash(&payload) != entry.content_hash {
            tracing::warn!(
                entity_key = %entity_key,
                "Cache miss: content hash mismatch, payload corrupt"
            );
            return Ok(None);
        }

        tracing::debug!(entity_key = %entity_key, bytes = payload.len(), "Cache hit");
        Ok(Some(CachedDocument { entry, payload }))
    }

    /// Store a document. If a non-expired entry under a different key
    /// already holds a byte-identical payload, the new entry links to the
    /// existing file instead of storing a second copy.
    pub fn put(&self, entity_key: &str, payload: &[u8]) -> Result<CacheEntry, CacheError> {
        let key_lock = self.lock_for_key(entity_key)?;
        let _guard = key_lock.lock().map_err(|_| CacheError::LockPoisoned)?;

        let hash = content_hash(payload);
        let now = Utc::now();

        let existing_path = {
            let index = self.index.read().map_err(|_| CacheError::LockPoisoned)?;
            index
                .values()
                .find(|e| {
                    e.entity_key != entity_key
                        && e.content_hash == hash
                        && !e.is_expired(now)
                        && e.payload_path.exists()
                })
                .map(|e| (e.entity_key.clone(), e.payload_path.clone()))
        };

        let payload_path = match existing_path {
            Some((other_key, path)) => {
                tracing::info!(
                    entity_key = %entity_key,
                    duplicate_of = %other_key,
                    "Byte-identical payload already cached, linking instead of storing"
                );
                path
            }
            None => {
                let path = self.payload_path_for(&hash);
                std::fs::write(&path, payload)?;
                path
            }
        };

        let entry = CacheEntry {
            entity_key: entity_key.to_string(),
            content_hash: hash,
            retrieved_at: now,
            expires_at: now + self.horizon,
            payload_path,
        };

        {
            let mut index = self.index.write().map_err(|_| CacheError::LockPoisoned)?;
            index.insert(entity_key.to_string(), entry.clone());
            self.persist_index(&index)?;
        }

        tracing::info!(
            entity_key = %entity_key,
            expires_at = %entry.expires_at,
            bytes = payload.len(),
            "Document cached"
        );
        Ok(entry)
    }

    /// Drop expired entries and unlink payload files no remaining entry
    /// references. Returns the number of entries removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = Utc::now();
        let mut index = self.index.write().map_err(|_| CacheError::LockPoisoned)?;

        let before = index.len();
        index.retain(|_, entry| !entry.is_expired(now));
        let removed = before - index.len();

        if removed > 0 {
            self.persist_index(&index)?;
        }

        // Unlink payloads that lost their last referencing entry.
        let live: Vec<&Path> = index.values().map(|e| e.payload_path.as_path()).collect();
        if let Ok(dir) = std::fs::read_dir(self.root.join(PAYLOAD_DIR)) {
            for file in dir.flatten() {
                let path = file.path();
                if !live.contains(&path.as_path()) {
                    let _ = std::fs::remove_file(&path);
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Purged expired cache entries");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let index = self.index.read().map_err(|_| CacheError::LockPoisoned)?;
        let now = Utc::now();
        let expired = index.values().filter(|e| e.is_expired(now)).count();
        let payload_bytes = index
            .values()
            .filter_map(|e| std::fs::metadata(&e.payload_path).ok())
            .map(|m| m.len())
            .sum();
        Ok(CacheStats {
            entries: index.len(),
            expired,
            payload_bytes,
        })
    }

    // ── internals ────────────────────────────────────────

    fn lock_for_key(&self, entity_key: &str) -> Result<Arc<Mutex<()>>, CacheError> {
        let mut locks = self.key_locks.lock().map_err(|_| CacheError::LockPoisoned)?;
        // A lock only the map still references belongs to no in-flight
        // write; dropping it keeps the map bounded by concurrent puts.
        locks.retain(|key, lock| key == entity_key || Arc::strong_count(lock) > 1);
        Ok(locks
            .entry(entity_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    fn payload_path_for(&self, hash_b64: &str) -> PathBuf {
        // Content-addressed filename: hex of the hash, filesystem-safe.
        let hex: String = base64::engine::general_purpose::STANDARD
            .decode(hash_b64)
            .unwrap_or_default()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        self.root.join(PAYLOAD_DIR).join(format!("{hex}.bin"))
    }

    fn persist_index(&self, index: &BTreeMap<String, CacheEntry>) -> Result<(), CacheError> {
        let raw = serde_json::to_string_pretty(index)?;
        std::fs::write(self.root.join(INDEX_FILE), raw)?;
        Ok(())
    }
}

/// SHA-256 content hash, base64.
pub fn content_hash(payload: &[u8]) -> String {
    let hash = Sha256::digest(payload);
    base64::engine::general_purpose::STANDARD.encode(hash)
}

// ═══════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache index error: {0}")]
    Index(#[from] serde_json::Error),
    #[error("Cache lock poisoned")]
    LockPoisoned,
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
