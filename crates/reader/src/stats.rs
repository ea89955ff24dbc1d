use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::scanner::ScanCounts;

/// Cumulative lookup statistics. Every counter only grows; updates from
/// concurrent lookups are plain atomic adds.
#[derive(Debug, Default)]
pub struct MetadataStats {
    base_file_read_ms: AtomicU64,
    log_merge_ms: AtomicU64,
    readers_opened: AtomicU64,
    readers_closed: AtomicU64,
    reader_open_ms: AtomicU64,
    blocks_read: AtomicU64,
    blocks_skipped: AtomicU64,
}

impl MetadataStats {
    pub(crate) fn record_base_read(&self, ms: u64) {
        self.base_file_read_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub(crate) fn record_log_merge(&self, ms: u64, counts: ScanCounts) {
        self.log_merge_ms.fetch_add(ms, Ordering::Relaxed);
        self.record_blocks(counts);
    }

    pub(crate) fn record_blocks(&self, counts: ScanCounts) {
        self.blocks_read.fetch_add(counts.blocks_read, Ordering::Relaxed);
        self.blocks_skipped
            .fetch_add(counts.blocks_skipped, Ordering::Relaxed);
    }

    pub(crate) fn record_open(&self, ms: u64) {
        self.readers_opened.fetch_add(1, Ordering::Relaxed);
        self.reader_open_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub(crate) fn record_close(&self) {
        self.readers_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Folds in the totals of work done elsewhere (a distributed task).
    pub(crate) fn absorb(&self, other: &StatsSnapshot) {
        self.base_file_read_ms
            .fetch_add(other.base_file_read_ms, Ordering::Relaxed);
        self.log_merge_ms.fetch_add(other.log_merge_ms, Ordering::Relaxed);
        self.readers_opened
            .fetch_add(other.readers_opened, Ordering::Relaxed);
        self.readers_closed
            .fetch_add(other.readers_closed, Ordering::Relaxed);
        self.reader_open_ms
            .fetch_add(other.reader_open_ms, Ordering::Relaxed);
        self.blocks_read.fetch_add(other.blocks_read, Ordering::Relaxed);
        self.blocks_skipped
            .fetch_add(other.blocks_skipped, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            base_file_read_ms: self.base_file_read_ms.load(Ordering::Relaxed),
            log_merge_ms: self.log_merge_ms.load(Ordering::Relaxed),
            readers_opened: self.readers_opened.load(Ordering::Relaxed),
            readers_closed: self.readers_closed.load(Ordering::Relaxed),
            reader_open_ms: self.reader_open_ms.load(Ordering::Relaxed),
            blocks_read: self.blocks_read.load(Ordering::Relaxed),
            blocks_skipped: self.blocks_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`MetadataStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub base_file_read_ms: u64,
    pub log_merge_ms: u64,
    pub readers_opened: u64,
    pub readers_closed: u64,
    pub reader_open_ms: u64,
    pub blocks_read: u64,
    pub blocks_skipped: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "base_file_read_ms={}", self.base_file_read_ms)?;
        writeln!(f, "log_merge_ms={}", self.log_merge_ms)?;
        writeln!(f, "readers_opened={}", self.readers_opened)?;
        writeln!(f, "readers_closed={}", self.readers_closed)?;
        writeln!(f, "reader_open_ms={}", self.reader_open_ms)?;
        writeln!(f, "blocks_read={}", self.blocks_read)?;
        write!(f, "blocks_skipped={}", self.blocks_skipped)
    }
}
