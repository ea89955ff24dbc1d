//! # Record - Metadata Records and Combine Rules
//!
//! Every entry stored in a metadata partition is a [`MetadataRecord`]: a
//! string key plus a tagged [`MetadataPayload`]. Records are immutable once
//! written; a later log block or base file supersedes them, and when two
//! versions of the same key meet, the payload's [`Combine`] rule decides the
//! surviving value.
//!
//! ## Partitions
//!
//! | Partition       | Payload                      | Key                            |
//! |-----------------|------------------------------|--------------------------------|
//! | `files`         | [`FilesPayload`]             | partition path / `__all_partitions__` |
//! | `column_stats`  | [`ColumnStatsPayload`]       | [`key::column_stats`]          |
//! | `bloom_filters` | [`BloomFilterPayload`]       | [`key::bloom_filter`]          |
//!
//! ## Encoding
//!
//! Records travel through base files and log blocks as `bincode` bytes
//! ([`MetadataRecord::encode`] / [`MetadataRecord::decode`]).

pub mod key;
mod payload;

use serde::{Deserialize, Serialize};

pub use payload::{
    BloomFilterPayload, ColumnStatsPayload, FileInfo, FilesKind, FilesPayload, StatValue,
};

/// Name of the `files` partition.
pub const PARTITION_FILES: &str = "files";
/// Name of the `column_stats` partition.
pub const PARTITION_COLUMN_STATS: &str = "column_stats";
/// Name of the `bloom_filters` partition.
pub const PARTITION_BLOOM_FILTERS: &str = "bloom_filters";

/// Resolves two versions of the same value into one.
///
/// `self` is the older write and `newer` the later one. Implementations must
/// be idempotent: `x.clone().combine(x) == x`.
pub trait Combine: Sized {
    fn combine(self, newer: Self) -> Self;
}

/// The tagged value carried by a metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataPayload {
    /// File listing of one dataset partition, or the list of all partitions.
    Files(FilesPayload),
    /// Column statistics for one column of one data file.
    ColumnStats(ColumnStatsPayload),
    /// Serialized bloom filter of one data file.
    BloomFilter(BloomFilterPayload),
}

impl MetadataPayload {
    /// Short name of the payload kind, used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            MetadataPayload::Files(_) => "files",
            MetadataPayload::ColumnStats(_) => "column_stats",
            MetadataPayload::BloomFilter(_) => "bloom_filter",
        }
    }

    /// Returns `true` if the payload itself marks the entry as deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        match self {
            MetadataPayload::Files(_) => false,
            MetadataPayload::ColumnStats(c) => c.deleted,
            MetadataPayload::BloomFilter(b) => b.deleted,
        }
    }
}

impl Combine for MetadataPayload {
    fn combine(self, newer: Self) -> Self {
        match (self, newer) {
            (MetadataPayload::Files(old), MetadataPayload::Files(new)) => {
                MetadataPayload::Files(old.combine(new))
            }
            (MetadataPayload::ColumnStats(old), MetadataPayload::ColumnStats(new)) => {
                MetadataPayload::ColumnStats(old.combine(new))
            }
            (MetadataPayload::BloomFilter(old), MetadataPayload::BloomFilter(new)) => {
                MetadataPayload::BloomFilter(old.combine(new))
            }
            (old, new) => {
                tracing::warn!(
                    old = old.kind(),
                    new = new.kind(),
                    "combining payloads of different kinds, keeping the newer one"
                );
                new
            }
        }
    }
}

/// One entry of a metadata partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Lookup key, unique within its metadata partition.
    pub key: String,
    /// Dataset partition the entry describes, if any.
    pub partition: Option<String>,
    pub payload: MetadataPayload,
}

impl MetadataRecord {
    pub fn new(key: impl Into<String>, payload: MetadataPayload) -> Self {
        Self {
            key: key.into(),
            partition: None,
            payload,
        }
    }

    /// Tags the record with the dataset partition it belongs to.
    #[must_use]
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    /// Serializes the record for storage in a base file or log block.
    pub fn encode(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    /// Decodes a record previously produced by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> bincode::Result<Self> {
        bincode::deserialize(bytes)
    }

    /// Approximate in-memory footprint, used for spill accounting.
    #[must_use]
    pub fn approx_size(&self) -> u64 {
        bincode::serialized_size(self).unwrap_or(0) + self.key.len() as u64
    }
}

impl Combine for MetadataRecord {
    fn combine(self, newer: Self) -> Self {
        MetadataRecord {
            key: newer.key,
            partition: newer.partition.or(self.partition),
            payload: self.payload.combine(newer.payload),
        }
    }
}
