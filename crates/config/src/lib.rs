//! # Config - Metadata Reader Settings
//!
//! Shared configuration for the metadata-table read path. Every crate in the
//! workspace that needs a tunable reads it from [`MetadataConfig`] rather than
//! taking loose arguments.
//!
//! ## Environment
//!
//! [`MetadataConfig::from_env`] overlays these variables on the defaults:
//!
//! ```text
//! METADATA_ENABLED            read the metadata table at all    (default: true)
//! METADATA_REUSE_READERS      cache reader handles across calls (default: true)
//! METADATA_MAX_MEMORY_MB      merged-scan memory before spill   (default: 1024)
//! METADATA_SPILL_DIR          spill directory                   (default: $TMP/metadata-spill)
//! METADATA_OVERFLOW_POLICY    "lru" | "insertion"               (default: lru)
//! METADATA_FULL_SCAN_FILES    full-scan the files partition     (default: true)
//! METADATA_ROLLBACK_BOUNDARY  "exclusive" | "inclusive"         (default: exclusive)
//! METADATA_READ_BUFFER_KB     log reader buffer in KiB          (default: 64)
//! ```
//!
//! Unparseable values fall back to the default.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default memory budget for merged-mode log scanning (1 GiB).
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 1024 * 1024 * 1024;

/// Default read buffer for log files (64 KiB).
pub const DEFAULT_READ_BUFFER_BYTES: usize = 64 * 1024;

/// Which in-memory entry leaves first when merged-scan state exceeds
/// [`MetadataConfig::max_memory_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the least recently read or written entry.
    #[default]
    Lru,
    /// Evict the oldest inserted entry; reads do not change the order.
    InsertionOrder,
}

impl OverflowPolicy {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Some(Self::Lru),
            "insertion" | "insertion_order" | "fifo" => Some(Self::InsertionOrder),
            _ => None,
        }
    }
}

/// How a completed rollback/restore instant is compared against the earliest
/// completed instant when deciding whether its rolled-back commits stay valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackBoundary {
    /// `rollback_ts > earliest`.
    #[default]
    Exclusive,
    /// `rollback_ts >= earliest`.
    Inclusive,
}

impl RollbackBoundary {
    /// Returns `true` if a rollback at `rollback_ts` falls inside the window
    /// that starts at `earliest`.
    #[must_use]
    pub fn admits<T: Ord>(&self, rollback_ts: &T, earliest: &T) -> bool {
        match self {
            RollbackBoundary::Exclusive => rollback_ts > earliest,
            RollbackBoundary::Inclusive => rollback_ts >= earliest,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclusive" | ">" => Some(Self::Exclusive),
            "inclusive" | ">=" => Some(Self::Inclusive),
            _ => None,
        }
    }
}

/// Settings for the metadata-table read path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// When `false` the metadata table is never opened and every lookup
    /// answers "not found".
    pub enabled: bool,
    /// Keep (base reader, log scanner) pairs open between calls.
    ///
    /// Must be `false` when lookups run on independent workers that cannot
    /// share state.
    pub reuse_readers: bool,
    /// Merged-scan state beyond this many bytes spills to disk.
    pub max_memory_bytes: u64,
    /// Directory holding spill files.
    pub spill_dir: PathBuf,
    /// Eviction order once the memory budget is exceeded.
    pub overflow_policy: OverflowPolicy,
    /// Allow an eager full scan of the `files` partition's logs.
    pub full_scan_files_partition: bool,
    /// Comparison used by the timeline validity filter.
    pub rollback_boundary: RollbackBoundary,
    /// Buffer size for log file reads.
    pub read_buffer_bytes: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reuse_readers: true,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            spill_dir: std::env::temp_dir().join("metadata-spill"),
            overflow_policy: OverflowPolicy::Lru,
            full_scan_files_partition: true,
            rollback_boundary: RollbackBoundary::Exclusive,
            read_buffer_bytes: DEFAULT_READ_BUFFER_BYTES,
        }
    }
}

impl MetadataConfig {
    /// Builds a config from the process environment. See the crate docs for
    /// the variable names.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to the
    /// default for every missing or unparseable value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("METADATA_ENABLED").and_then(|v| v.parse().ok()) {
            cfg.enabled = v;
        }
        if let Some(v) = lookup("METADATA_REUSE_READERS").and_then(|v| v.parse().ok()) {
            cfg.reuse_readers = v;
        }
        if let Some(mb) = lookup("METADATA_MAX_MEMORY_MB").and_then(|v| v.parse::<u64>().ok()) {
            cfg.max_memory_bytes = mb.saturating_mul(1024 * 1024);
        }
        if let Some(dir) = lookup("METADATA_SPILL_DIR").filter(|v| !v.is_empty()) {
            cfg.spill_dir = PathBuf::from(dir);
        }
        if let Some(p) = lookup("METADATA_OVERFLOW_POLICY").and_then(|v| OverflowPolicy::parse(&v)) {
            cfg.overflow_policy = p;
        }
        if let Some(v) = lookup("METADATA_FULL_SCAN_FILES").and_then(|v| v.parse().ok()) {
            cfg.full_scan_files_partition = v;
        }
        if let Some(b) =
            lookup("METADATA_ROLLBACK_BOUNDARY").and_then(|v| RollbackBoundary::parse(&v))
        {
            cfg.rollback_boundary = b;
        }
        if let Some(kb) = lookup("METADATA_READ_BUFFER_KB").and_then(|v| v.parse::<usize>().ok()) {
            cfg.read_buffer_bytes = kb.max(1).saturating_mul(1024);
        }

        cfg
    }
}
