//! Payload kinds and their combine rules.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::Combine;

/// What a `files` record lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilesKind {
    /// The `__all_partitions__` record: one entry per dataset partition.
    PartitionList,
    /// The data files of one dataset partition.
    FileList,
}

/// Size and liveness of one listed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub size: u64,
    pub deleted: bool,
}

impl FileInfo {
    #[must_use]
    pub fn live(size: u64) -> Self {
        Self { size, deleted: false }
    }

    #[must_use]
    pub fn deleted() -> Self {
        Self {
            size: 0,
            deleted: true,
        }
    }
}

/// A file (or partition) listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesPayload {
    pub kind: FilesKind,
    pub files: BTreeMap<String, FileInfo>,
}

impl FilesPayload {
    /// Builds a listing where every named entry is live.
    pub fn listing<I, S>(kind: FilesKind, files: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        Self {
            kind,
            files: files
                .into_iter()
                .map(|(name, size)| (name.into(), FileInfo::live(size)))
                .collect(),
        }
    }

    /// Names of the entries not marked deleted, in sorted order.
    pub fn live_files(&self) -> impl Iterator<Item = (&str, u64)> {
        self.files
            .iter()
            .filter(|(_, info)| !info.deleted)
            .map(|(name, info)| (name.as_str(), info.size))
    }
}

impl Combine for FilesPayload {
    /// Union of both listings. A name present in both keeps the newer delete
    /// marker, otherwise the larger size (appends only grow a file).
    fn combine(self, newer: Self) -> Self {
        let mut files = self.files;
        for (name, new_info) in newer.files {
            let merged = match files.get(&name) {
                Some(_) if new_info.deleted => new_info,
                Some(old_info) => FileInfo::live(old_info.size.max(new_info.size)),
                None => new_info,
            };
            files.insert(name, merged);
        }
        FilesPayload {
            kind: newer.kind,
            files,
        }
    }
}

/// A typed column statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatValue {
    Long(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl StatValue {
    fn compare(&self, other: &StatValue) -> Option<Ordering> {
        match (self, other) {
            (StatValue::Long(a), StatValue::Long(b)) => Some(a.cmp(b)),
            (StatValue::Double(a), StatValue::Double(b)) => a.partial_cmp(b),
            (StatValue::String(a), StatValue::String(b)) => Some(a.cmp(b)),
            (StatValue::Bytes(a), StatValue::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Statistics of one column in one data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatsPayload {
    pub file_name: String,
    pub column_name: String,
    pub min_value: Option<StatValue>,
    pub max_value: Option<StatValue>,
    pub null_count: u64,
    pub value_count: u64,
    pub total_size: u64,
    pub total_uncompressed_size: u64,
    pub deleted: bool,
}

/// Picks between two optional bounds. `keep` says which ordering the older
/// value must have to survive; incomparable values yield the newer one.
fn pick_bound(
    old: Option<StatValue>,
    new: Option<StatValue>,
    keep: Ordering,
) -> Option<StatValue> {
    match (old, new) {
        (Some(o), Some(n)) => match o.compare(&n) {
            Some(ord) if ord == keep => Some(o),
            _ => Some(n),
        },
        (o, None) => o,
        (None, n) => n,
    }
}

impl Combine for ColumnStatsPayload {
    /// Newer wins field-for-field, except that the min/max range only widens.
    /// A newer delete replaces the old stats outright.
    fn combine(self, newer: Self) -> Self {
        if newer.deleted
            || self.deleted
            || self.file_name != newer.file_name
            || self.column_name != newer.column_name
        {
            return newer;
        }
        ColumnStatsPayload {
            min_value: pick_bound(self.min_value, newer.min_value, Ordering::Less),
            max_value: pick_bound(self.max_value, newer.max_value, Ordering::Greater),
            ..newer
        }
    }
}

/// Serialized bloom filter of one data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilterPayload {
    pub filter_type: String,
    /// Instant at which the filter was built.
    pub timestamp: String,
    pub filter: Vec<u8>,
    pub deleted: bool,
}

impl Combine for BloomFilterPayload {
    fn combine(self, newer: Self) -> Self {
        newer
    }
}
