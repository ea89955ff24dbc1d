//! The (base file reader, log scanner) pair bound to one file slice.

use anyhow::{Context, Result};
use basefile::BaseFileReader;
use record::MetadataRecord;
use std::time::Instant as Timer;

use crate::fs_view::FileSlice;
use crate::reconcile::{reconcile_keys, reconcile_prefixes};
use crate::scanner::{MergedLogScanner, ScanCounts, ScanSettings};

/// Time spent and blocks visited by one lookup on a pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupTimings {
    pub base_file_read_ms: u64,
    pub log_merge_ms: u64,
    pub counts: ScanCounts,
}

/// Open readers for one file slice.
pub struct ReaderHandles {
    base: Option<BaseFileReader>,
    scanner: MergedLogScanner,
    /// Time taken by [`open`](Self::open), full scan included.
    pub open_ms: u64,
    /// Blocks visited while opening (the full scan, if any).
    pub open_counts: ScanCounts,
}

impl ReaderHandles {
    /// Opens the base file (if the slice has one) and the log scanner.
    ///
    /// # Errors
    ///
    /// Fails if the base file cannot be opened or the full scan fails.
    pub fn open(slice: &FileSlice, settings: &ScanSettings) -> Result<Self> {
        let timer = Timer::now();

        let base = match &slice.base_file {
            Some(base_file) => {
                let reader = BaseFileReader::open(&base_file.path).with_context(|| {
                    format!("opening base file {}", base_file.path.display())
                })?;
                tracing::info!(
                    path = %base_file.path.display(),
                    instant = %base_file.name.instant,
                    records = reader.len(),
                    ms = timer.elapsed().as_millis() as u64,
                    "opened metadata base file"
                );
                Some(reader)
            }
            None => None,
        };

        let log_timer = Timer::now();
        let (scanner, open_counts) = MergedLogScanner::open(
            slice.partition.clone(),
            slice.file_id.clone(),
            slice.log_files.iter().cloned(),
            settings.clone(),
        )?;
        tracing::info!(
            partition = %slice.partition,
            file_id = %slice.file_id,
            log_files = scanner.log_files().len(),
            latest_metadata_instant = %settings.latest_metadata_instant,
            valid_instants = settings.valid_instants.len(),
            full_scan = scanner.is_full_scan(),
            ms = log_timer.elapsed().as_millis() as u64,
            "opened metadata log scanner"
        );

        Ok(Self {
            base,
            scanner,
            open_ms: timer.elapsed().as_millis() as u64,
            open_counts,
        })
    }

    #[must_use]
    pub fn has_base_file(&self) -> bool {
        self.base.is_some()
    }

    #[must_use]
    pub fn scanner(&self) -> &MergedLogScanner {
        &self.scanner
    }

    /// Full-key lookup: one entry per key in `keys`, in order.
    pub fn lookup_keys(
        &mut self,
        keys: &[String],
    ) -> Result<(Vec<(String, Option<MetadataRecord>)>, LookupTimings)> {
        let mut timings = LookupTimings::default();

        let timer = Timer::now();
        let base = match &self.base {
            Some(reader) => reader.get_records_by_keys(keys)?,
            None => Vec::new(),
        };
        timings.base_file_read_ms = timer.elapsed().as_millis() as u64;

        let timer = Timer::now();
        let (log, counts) = self.scanner.lookup_keys(keys)?;
        timings.log_merge_ms = timer.elapsed().as_millis() as u64;
        timings.counts = counts;

        Ok((reconcile_keys(keys, base, log), timings))
    }

    /// Prefix lookup: every live record matching one of `prefixes`.
    pub fn lookup_prefixes(
        &mut self,
        prefixes: &[String],
    ) -> Result<(Vec<MetadataRecord>, LookupTimings)> {
        let mut timings = LookupTimings::default();

        let timer = Timer::now();
        let base = match &self.base {
            Some(reader) => reader.get_records_by_key_prefixes(prefixes)?,
            None => Vec::new(),
        };
        timings.base_file_read_ms = timer.elapsed().as_millis() as u64;

        let timer = Timer::now();
        let (log, counts) = self.scanner.lookup_prefixes(prefixes)?;
        timings.log_merge_ms = timer.elapsed().as_millis() as u64;
        timings.counts = counts;

        Ok((reconcile_prefixes(base, log), timings))
    }
}
