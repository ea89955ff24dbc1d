//! Prefix lookups against one file slice with private readers.
//!
//! A prefix does not pick a bucket, so a prefix query visits every slice of
//! the partition. Each visit opens its own readers and closes them before
//! returning; the shared reader cache is never touched. A
//! [`PrefixLookupTask`] owns everything it needs, so it can be shipped to any
//! worker and run there.

use record::MetadataRecord;

use crate::fs_view::FileSlice;
use crate::pair::ReaderHandles;
use crate::scanner::ScanSettings;
use crate::stats::StatsSnapshot;
use crate::MetadataError;

/// Records found by one task plus the work it did.
#[derive(Debug, Clone)]
pub struct PrefixLookupOutcome {
    pub records: Vec<MetadataRecord>,
    pub stats: StatsSnapshot,
}

/// A self-contained prefix lookup against one file slice.
#[derive(Debug, Clone)]
pub struct PrefixLookupTask {
    pub slice: FileSlice,
    /// Sorted and deduplicated.
    pub prefixes: Vec<String>,
    pub settings: ScanSettings,
}

impl PrefixLookupTask {
    pub fn run(self) -> Result<PrefixLookupOutcome, MetadataError> {
        lookup_prefixes_in_slice(&self.slice, &self.prefixes, &self.settings)
    }
}

/// Opens private readers for `slice`, answers `prefixes`, and closes them.
pub(crate) fn lookup_prefixes_in_slice(
    slice: &FileSlice,
    prefixes: &[String],
    settings: &ScanSettings,
) -> Result<PrefixLookupOutcome, MetadataError> {
    let mut handles =
        ReaderHandles::open(slice, settings).map_err(|source| MetadataError::OpenReaders {
            partition: slice.partition.clone(),
            file_id: slice.file_id.clone(),
            source,
        })?;

    let mut stats = StatsSnapshot {
        readers_opened: 1,
        reader_open_ms: handles.open_ms,
        blocks_read: handles.open_counts.blocks_read,
        blocks_skipped: handles.open_counts.blocks_skipped,
        ..StatsSnapshot::default()
    };

    let result = handles.lookup_prefixes(prefixes);
    drop(handles);
    stats.readers_closed = 1;

    let (records, timings) = result.map_err(|source| MetadataError::Read {
        partition: slice.partition.clone(),
        file_id: slice.file_id.clone(),
        source,
    })?;
    stats.base_file_read_ms = timings.base_file_read_ms;
    stats.log_merge_ms = timings.log_merge_ms;
    stats.blocks_read += timings.counts.blocks_read;
    stats.blocks_skipped += timings.counts.blocks_skipped;

    tracing::debug!(
        partition = %slice.partition,
        file_id = %slice.file_id,
        prefixes = prefixes.len(),
        records = records.len(),
        base_ms = timings.base_file_read_ms,
        log_ms = timings.log_merge_ms,
        "prefix lookup timings [base_file_read, log_merge]"
    );
    Ok(PrefixLookupOutcome { records, stats })
}
