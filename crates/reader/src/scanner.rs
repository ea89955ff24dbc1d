//! Log block scanning for one file slice.
//!
//! Logs are applied in [`logfile::LogFileName`] order and blocks in the
//! order they were written; a later block overrides an earlier one for the
//! same key. A block is skipped whole when its instant is not in the
//! [`ValidInstants`] or lies beyond the latest completed metadata instant.
//!
//! ## Merged mode
//!
//! [`MergedLogScanner`] keeps a key -> record map (a [`SpillableMap`]) plus
//! the set of deleted keys.
//!
//! - **Full scan**: every block, every key. Done once, when the scanner is
//!   opened with [`ScanSettings::full_scan`].
//! - **Point / prefix scan**: every block is still read, but only keys that
//!   were asked for (or match a requested prefix) are tracked. A key or
//!   prefix is scanned at most once per scanner; later lookups for it are
//!   answered from the kept state.
//!
//! ## Unmerged mode
//!
//! [`UnmergedLogScanner`] keeps nothing and hands every record of every valid
//! data block to a callback, as an owned copy decoded out of the reader's
//! reused buffer. A delete block fails the scan.

use anyhow::{Context, Result};
use config::OverflowPolicy;
use logfile::{BlockKind, LogBlock, LogFile, LogReader};
use record::{Combine, MetadataRecord};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use timeline::InstantTime;

use crate::spill::SpillableMap;
use crate::validity::ValidInstants;
use crate::MetadataError;

/// Everything a scanner needs besides its files.
///
/// Cheap to clone; a scanner keeps its own copy, so the instants it trusts
/// are frozen at open time.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub valid_instants: Arc<ValidInstants>,
    /// Latest completed instant on the metadata table's own timeline.
    pub latest_metadata_instant: InstantTime,
    pub read_buffer_bytes: usize,
    pub max_memory_bytes: u64,
    pub spill_dir: PathBuf,
    pub overflow_policy: OverflowPolicy,
    /// Merge every key at open time instead of on demand.
    pub full_scan: bool,
}

/// Blocks applied and skipped by one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCounts {
    pub blocks_read: u64,
    pub blocks_skipped: u64,
}

impl ScanCounts {
    fn add(&mut self, other: ScanCounts) {
        self.blocks_read += other.blocks_read;
        self.blocks_skipped += other.blocks_skipped;
    }
}

/// The merged log state of one key.
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    Present(MetadataRecord),
    /// The latest log write for the key is a delete.
    Deleted,
}

/// Drops change-capture logs and puts the rest in application order.
fn ordered_logs(log_files: impl IntoIterator<Item = LogFile>) -> Vec<LogFile> {
    let mut files: Vec<LogFile> = log_files.into_iter().filter(|f| !f.is_cdc()).collect();
    files.sort();
    files
}

/// Feeds every admissible block of `files` to `on_block`, in order.
fn walk_blocks<F>(files: &[LogFile], settings: &ScanSettings, mut on_block: F) -> Result<ScanCounts>
where
    F: FnMut(&LogFile, &LogBlock<'_>) -> Result<()>,
{
    let mut counts = ScanCounts::default();
    for file in files {
        let mut reader = LogReader::open_with_capacity(&file.path, settings.read_buffer_bytes)
            .with_context(|| format!("opening log file {}", file.path.display()))?;
        while let Some(block) = reader
            .next_block()
            .with_context(|| format!("reading log file {}", file.path.display()))?
        {
            let instant = block.instant();
            if !settings.valid_instants.contains(instant) {
                tracing::trace!(file = %file.name, %instant, "skipping block of an invalid instant");
                counts.blocks_skipped += 1;
                continue;
            }
            if instant > settings.latest_metadata_instant {
                tracing::trace!(
                    file = %file.name,
                    %instant,
                    latest = %settings.latest_metadata_instant,
                    "skipping block beyond the latest metadata instant"
                );
                counts.blocks_skipped += 1;
                continue;
            }
            counts.blocks_read += 1;
            on_block(file, &block)?;
        }
    }
    Ok(counts)
}

struct MergeState {
    records: SpillableMap<MetadataRecord>,
    deleted: HashSet<String>,
}

impl MergeState {
    fn put(&mut self, record: MetadataRecord) -> Result<()> {
        self.deleted.remove(&record.key);
        let merged = match self.records.get(&record.key)? {
            Some(existing) => existing.combine(record),
            None => record,
        };
        self.records.insert(merged.key.clone(), merged)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.records.discard(key);
        self.deleted.insert(key.to_string());
        Ok(())
    }

    fn apply(&mut self, block: &LogBlock<'_>, wants: impl Fn(&str) -> bool) -> Result<()> {
        match block.kind() {
            BlockKind::Data => {
                for raw in block.records() {
                    let raw = raw?;
                    if wants(raw.key) {
                        self.put(raw.to_record()?)?;
                    }
                }
            }
            BlockKind::Delete => {
                for key in block.deleted_keys() {
                    let key = key?;
                    if wants(key) {
                        self.delete(key)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Merges every block into the keys selected by `wants`. If the walk
    /// fails, whatever it merged for those keys is dropped again, leaving
    /// them as they were before the call.
    fn merge(
        &mut self,
        files: &[LogFile],
        settings: &ScanSettings,
        wants: impl Fn(&str) -> bool,
    ) -> Result<ScanCounts> {
        let walked = walk_blocks(files, settings, |_, block| self.apply(block, &wants));
        if walked.is_err() {
            self.discard(&wants);
        }
        walked
    }

    fn discard(&mut self, wants: impl Fn(&str) -> bool) {
        for key in self.records.keys() {
            if wants(key.as_str()) {
                self.records.discard(&key);
            }
        }
        self.deleted.retain(|k| !wants(k.as_str()));
    }

    fn value_of(&mut self, key: &str) -> Result<Option<LogValue>> {
        if self.deleted.contains(key) {
            return Ok(Some(LogValue::Deleted));
        }
        Ok(self.records.get(key)?.map(LogValue::Present))
    }
}

/// Merged-mode scanner over the logs of one file slice.
pub struct MergedLogScanner {
    partition: String,
    file_id: String,
    log_files: Vec<LogFile>,
    settings: ScanSettings,
    state: MergeState,
    full_scan_done: bool,
    resolved_keys: HashSet<String>,
    resolved_prefixes: Vec<String>,
}

impl MergedLogScanner {
    /// Creates a scanner and, if the settings ask for it, runs the full scan.
    ///
    /// # Errors
    ///
    /// Fails if the full scan cannot read a log file.
    pub fn open(
        partition: impl Into<String>,
        file_id: impl Into<String>,
        log_files: impl IntoIterator<Item = LogFile>,
        settings: ScanSettings,
    ) -> Result<(Self, ScanCounts)> {
        let state = MergeState {
            records: SpillableMap::new(
                settings.max_memory_bytes,
                settings.spill_dir.clone(),
                settings.overflow_policy,
            ),
            deleted: HashSet::new(),
        };
        let mut scanner = Self {
            partition: partition.into(),
            file_id: file_id.into(),
            log_files: ordered_logs(log_files),
            settings,
            state,
            full_scan_done: false,
            resolved_keys: HashSet::new(),
            resolved_prefixes: Vec::new(),
        };
        let counts = if scanner.settings.full_scan {
            scanner.scan_all()?
        } else {
            ScanCounts::default()
        };
        Ok((scanner, counts))
    }

    #[must_use]
    pub fn partition(&self) -> &str {
        &self.partition
    }

    #[must_use]
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// The logs this scanner reads, in application order.
    #[must_use]
    pub fn log_files(&self) -> &[LogFile] {
        &self.log_files
    }

    #[must_use]
    pub fn is_full_scan(&self) -> bool {
        self.full_scan_done
    }

    /// Merges every block into the state. A second call is a no-op.
    pub fn scan_all(&mut self) -> Result<ScanCounts> {
        if self.full_scan_done {
            return Ok(ScanCounts::default());
        }
        let resolved_keys = &self.resolved_keys;
        let resolved_prefixes = &self.resolved_prefixes;
        let counts = self.state.merge(&self.log_files, &self.settings, |k: &str| {
            !resolved_keys.contains(k) && !resolved_prefixes.iter().any(|p| k.starts_with(p.as_str()))
        })?;
        self.full_scan_done = true;
        tracing::debug!(
            partition = %self.partition,
            file_id = %self.file_id,
            keys = self.state.records.len(),
            deleted = self.state.deleted.len(),
            "full log scan complete"
        );
        Ok(counts)
    }

    fn is_resolved(&self, key: &str) -> bool {
        self.full_scan_done
            || self.resolved_keys.contains(key)
            || self.resolved_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    /// Returns the merged log state of every key in `keys`, in input order.
    ///
    /// `None` means the logs never mention the key.
    pub fn lookup_keys(
        &mut self,
        keys: &[String],
    ) -> Result<(Vec<(String, Option<LogValue>)>, ScanCounts)> {
        let pending: HashSet<String> = keys
            .iter()
            .filter(|k| !self.is_resolved(k))
            .cloned()
            .collect();

        let mut counts = ScanCounts::default();
        if !pending.is_empty() {
            counts.add(self.state.merge(&self.log_files, &self.settings, |k: &str| {
                pending.contains(k)
            })?);
            self.resolved_keys.extend(pending);
        }

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push((key.clone(), self.state.value_of(key)?));
        }
        Ok((out, counts))
    }

    /// Returns the merged log state of every key matching one of `prefixes`,
    /// deletes included, sorted by key.
    pub fn lookup_prefixes(
        &mut self,
        prefixes: &[String],
    ) -> Result<(Vec<(String, LogValue)>, ScanCounts)> {
        let pending: Vec<String> = prefixes
            .iter()
            .filter(|p| {
                !self.full_scan_done
                    && !self
                        .resolved_prefixes
                        .iter()
                        .any(|q| p.starts_with(q.as_str()))
            })
            .cloned()
            .collect();

        let mut counts = ScanCounts::default();
        if !pending.is_empty() {
            let resolved_keys = &self.resolved_keys;
            let resolved_prefixes = &self.resolved_prefixes;
            let wants = |k: &str| {
                pending.iter().any(|p| k.starts_with(p.as_str()))
                    && !resolved_keys.contains(k)
                    && !resolved_prefixes.iter().any(|q| k.starts_with(q.as_str()))
            };
            counts.add(self.state.merge(&self.log_files, &self.settings, wants)?);
            self.resolved_prefixes.extend(pending);
        }

        let matches = |k: &str| prefixes.iter().any(|p| k.starts_with(p.as_str()));
        let mut keys: Vec<String> = self
            .state
            .records
            .keys()
            .into_iter()
            .chain(self.state.deleted.iter().cloned())
            .filter(|k| matches(k.as_str()))
            .collect();
        keys.sort();
        keys.dedup();

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.state.value_of(&key)? {
                out.push((key, value));
            }
        }
        Ok((out, counts))
    }

    /// Number of keys currently held, live or deleted.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.state.records.len() + self.state.deleted.len()
    }

    /// Number of live records currently spilled to disk.
    #[must_use]
    pub fn spilled_keys(&self) -> usize {
        self.state.records.spilled_len()
    }
}

/// Unmerged-mode scanner: streams records, keeps no state.
pub struct UnmergedLogScanner {
    partition: String,
    file_id: String,
    log_files: Vec<LogFile>,
    settings: ScanSettings,
}

impl UnmergedLogScanner {
    pub fn new(
        partition: impl Into<String>,
        file_id: impl Into<String>,
        log_files: impl IntoIterator<Item = LogFile>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            partition: partition.into(),
            file_id: file_id.into(),
            log_files: ordered_logs(log_files),
            settings,
        }
    }

    /// Calls `callback` once per record of every admissible data block, in
    /// file then block order. Each record is an owned copy.
    ///
    /// # Errors
    ///
    /// - [`MetadataError::DeleteBlockInUnmergedScan`] as soon as an admissible
    ///   delete block is reached.
    /// - [`MetadataError::Read`] if a log cannot be read or decoded.
    pub fn scan<F>(&self, mut callback: F) -> Result<ScanCounts, MetadataError>
    where
        F: FnMut(MetadataRecord),
    {
        let result = walk_blocks(&self.log_files, &self.settings, |file, block| {
            match block.kind() {
                BlockKind::Delete => {
                    return Err(MetadataError::DeleteBlockInUnmergedScan {
                        file: file.name.to_string(),
                        instant: block.instant(),
                    }
                    .into());
                }
                BlockKind::Data => {
                    for raw in block.records() {
                        callback(raw?.to_record()?);
                    }
                }
            }
            Ok(())
        });

        result.map_err(|err| match err.downcast::<MetadataError>() {
            Ok(usage) => usage,
            Err(source) => MetadataError::Read {
                partition: self.partition.clone(),
                file_id: self.file_id.clone(),
                source,
            },
        })
    }
}
