//! `TableMetadata`: the lookup API over a dataset's metadata table.

use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::MetadataConfig;
use record::{key, MetadataPayload, MetadataRecord, PARTITION_FILES};
use timeline::{Action, InstantTime, TableMetaClient, TimelineError, SOLO_COMMIT_TIMESTAMP};

use crate::cache::{ReaderCache, ReaderPair};
use crate::fs_view::{latest_file_slices, FileSlice};
use crate::pair::{LookupTimings, ReaderHandles};
use crate::prefix::{lookup_prefixes_in_slice, PrefixLookupOutcome, PrefixLookupTask};
use crate::router::route;
use crate::scanner::{ScanCounts, ScanSettings, UnmergedLogScanner};
use crate::stats::{MetadataStats, StatsSnapshot};
use crate::validity::ValidInstants;
use crate::MetadataError;

/// Whether the metadata table can serve lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataStatus {
    Ready,
    /// `enabled = false` in the config.
    DisabledByConfig,
    /// The dataset or its metadata table has no timeline.
    DisabledNotFound,
    /// Loading failed for another reason.
    DisabledError(String),
}

impl MetadataStatus {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, MetadataStatus::Ready)
    }
}

impl fmt::Display for MetadataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataStatus::Ready => write!(f, "ready"),
            MetadataStatus::DisabledByConfig => write!(f, "disabled (config)"),
            MetadataStatus::DisabledNotFound => write!(f, "disabled (not found)"),
            MetadataStatus::DisabledError(msg) => write!(f, "disabled (error: {msg})"),
        }
    }
}

/// How a prefix lookup visits the file slices of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationMode {
    /// One slice after another on the calling thread.
    #[default]
    Sequential,
    /// Slices in parallel on the rayon pool, borrowing shared state.
    Parallel,
    /// Each slice becomes an owned [`PrefixLookupTask`] that shares nothing
    /// with this instance; the tasks run on the rayon pool and report their
    /// own stats back.
    Distributed,
}

struct Tables {
    dataset: TableMetaClient,
    metadata: TableMetaClient,
}

/// Point, batch and prefix lookups against the metadata table of one
/// dataset.
///
/// Lookups take `&self` and may run concurrently. [`reset`](Self::reset)
/// takes `&mut self`, so no lookup can observe a half-reloaded state.
pub struct TableMetadata {
    config: MetadataConfig,
    dataset_path: PathBuf,
    metadata_path: PathBuf,
    status: MetadataStatus,
    tables: Option<Tables>,
    /// Latest file slices per partition, listed on first use.
    slices: DashMap<String, Arc<Vec<FileSlice>>>,
    cache: ReaderCache,
    stats: Arc<MetadataStats>,
}

impl TableMetadata {
    /// Opens the metadata table of the dataset at `dataset_path`.
    ///
    /// Never fails: a table that cannot be loaded leaves the instance
    /// disabled, and every lookup then answers "not found". See
    /// [`status`](Self::status).
    pub fn new(dataset_path: impl Into<PathBuf>, config: MetadataConfig) -> Self {
        let dataset_path = dataset_path.into();
        let metadata_path = TableMetaClient::metadata_table_path(&dataset_path);
        let stats = Arc::new(MetadataStats::default());
        let mut md = Self {
            cache: ReaderCache::new(config.reuse_readers, Arc::clone(&stats)),
            config,
            dataset_path,
            metadata_path,
            status: MetadataStatus::DisabledByConfig,
            tables: None,
            slices: DashMap::new(),
            stats,
        };
        md.load();
        md
    }

    fn load(&mut self) {
        self.tables = None;
        if !self.config.enabled {
            self.status = MetadataStatus::DisabledByConfig;
            tracing::info!(dataset = %self.dataset_path.display(), "metadata table disabled by config");
            return;
        }

        let loaded = TableMetaClient::load(&self.dataset_path).and_then(|dataset| {
            TableMetaClient::load(&self.metadata_path).map(|metadata| Tables { dataset, metadata })
        });
        match loaded {
            Ok(tables) => {
                tracing::info!(
                    dataset = %self.dataset_path.display(),
                    synced = ?tables.metadata.timeline().last_completed_of(&[Action::DeltaCommit]).map(|i| i.time),
                    reuse_readers = self.config.reuse_readers,
                    "metadata table ready"
                );
                self.tables = Some(tables);
                self.status = MetadataStatus::Ready;
            }
            Err(TimelineError::TableNotFound { path }) => {
                tracing::warn!(
                    path = %path.display(),
                    "metadata table not found, lookups will return nothing"
                );
                self.status = MetadataStatus::DisabledNotFound;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load metadata table, lookups will return nothing");
                self.status = MetadataStatus::DisabledError(e.to_string());
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> &MetadataStatus {
        &self.status
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.status.is_ready()
    }

    #[must_use]
    pub fn config(&self) -> &MetadataConfig {
        &self.config
    }

    #[must_use]
    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    #[must_use]
    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of reader pairs currently held open by the cache.
    #[must_use]
    pub fn cached_readers(&self) -> usize {
        self.cache.len()
    }

    // -------------------- Lookups --------------------

    /// Looks up one key.
    ///
    /// # Errors
    ///
    /// See [`get_records_by_keys`](Self::get_records_by_keys).
    pub fn get_record_by_key(
        &self,
        key: &str,
        partition: &str,
    ) -> Result<Option<MetadataRecord>, MetadataError> {
        let keys = [key.to_string()];
        Ok(self
            .get_records_by_keys(&keys, partition)?
            .into_iter()
            .next()
            .and_then(|(_, record)| record))
    }

    /// Looks up a batch of keys. The result has one entry per input key, in
    /// input order, `None` for keys that do not exist or were deleted.
    ///
    /// # Errors
    ///
    /// Any failure to open or read a file slice fails the whole call. Readers
    /// opened by this call are closed before the error is returned.
    pub fn get_records_by_keys(
        &self,
        keys: &[String],
        partition: &str,
    ) -> Result<Vec<(String, Option<MetadataRecord>)>, MetadataError> {
        let not_found = || keys.iter().map(|k| (k.clone(), None)).collect();
        let Some(tables) = &self.tables else {
            return Ok(not_found());
        };
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let slices = self.partition_slices(tables, partition)?;
        if slices.is_empty() {
            return Ok(not_found());
        }

        let mut sorted = keys.to_vec();
        sorted.sort();
        sorted.dedup();
        let settings = self.scan_settings(tables, partition)?;

        let mut found: HashMap<String, Option<MetadataRecord>> = HashMap::with_capacity(sorted.len());
        let mut opened: Vec<Arc<ReaderPair>> = Vec::new();
        let outcome = self.lookup_groups(&slices, &sorted, &settings, &mut found, &mut opened);

        if let Err(e) = outcome {
            for pair in &opened {
                self.cache.close(pair);
            }
            return Err(e);
        }
        if !self.cache.reuse() {
            for pair in &opened {
                self.cache.close(pair);
            }
        }

        Ok(keys
            .iter()
            .map(|k| (k.clone(), found.get(k).cloned().flatten()))
            .collect())
    }

    fn lookup_groups(
        &self,
        slices: &[FileSlice],
        keys: &[String],
        settings: &ScanSettings,
        found: &mut HashMap<String, Option<MetadataRecord>>,
        opened: &mut Vec<Arc<ReaderPair>>,
    ) -> Result<(), MetadataError> {
        for (slice, group) in route(slices, keys) {
            let (pair, fresh) = self
                .cache
                .get_or_open(&slice.partition, &slice.file_id, || {
                    ReaderHandles::open(slice, settings)
                })
                .map_err(|source| MetadataError::OpenReaders {
                    partition: slice.partition.clone(),
                    file_id: slice.file_id.clone(),
                    source,
                })?;
            if fresh {
                opened.push(Arc::clone(&pair));
            }

            let read_error = |source| MetadataError::Read {
                partition: slice.partition.clone(),
                file_id: slice.file_id.clone(),
                source,
            };
            let (records, timings) = match pair.with_handles(|h| h.lookup_keys(&group)) {
                Some(Ok(found)) => found,
                Some(Err(source)) => {
                    // A scan that failed part way leaves merge state nobody
                    // may answer from again.
                    tracing::warn!(
                        partition = %slice.partition,
                        file_id = %slice.file_id,
                        "evicting readers after a failed read"
                    );
                    self.cache.close(&pair);
                    return Err(read_error(source));
                }
                None => {
                    return Err(read_error(anyhow::anyhow!(
                        "readers were closed during the lookup"
                    )))
                }
            };

            self.record_timings(slice, group.len(), timings);
            found.extend(records);
        }
        Ok(())
    }

    fn record_timings(&self, slice: &FileSlice, keys: usize, timings: LookupTimings) {
        self.stats.record_base_read(timings.base_file_read_ms);
        self.stats.record_log_merge(timings.log_merge_ms, timings.counts);
        tracing::debug!(
            partition = %slice.partition,
            file_id = %slice.file_id,
            keys,
            base_ms = timings.base_file_read_ms,
            log_ms = timings.log_merge_ms,
            "metadata lookup timings [base_file_read, log_merge]"
        );
    }

    /// Every live record whose key starts with one of `prefixes`, sorted by
    /// key.
    ///
    /// Every file slice of the partition is visited with readers opened for
    /// this call alone; cached readers are never used.
    ///
    /// # Errors
    ///
    /// The first slice that fails to open or read fails the call.
    pub fn get_records_by_key_prefixes(
        &self,
        prefixes: &[String],
        partition: &str,
        mode: EvaluationMode,
    ) -> Result<Vec<MetadataRecord>, MetadataError> {
        let Some(tables) = &self.tables else {
            return Ok(Vec::new());
        };
        if prefixes.is_empty() {
            return Ok(Vec::new());
        }
        let slices = self.partition_slices(tables, partition)?;
        if slices.is_empty() {
            return Ok(Vec::new());
        }

        let mut sorted = prefixes.to_vec();
        sorted.sort();
        sorted.dedup();
        let settings = self.scan_settings(tables, partition)?;

        let outcomes: Vec<Result<PrefixLookupOutcome, MetadataError>> = match mode {
            EvaluationMode::Sequential => slices
                .iter()
                .map(|slice| lookup_prefixes_in_slice(slice, &sorted, &settings))
                .collect(),
            EvaluationMode::Parallel => slices
                .par_iter()
                .map(|slice| lookup_prefixes_in_slice(slice, &sorted, &settings))
                .collect(),
            EvaluationMode::Distributed => slices
                .iter()
                .map(|slice| PrefixLookupTask {
                    slice: slice.clone(),
                    prefixes: sorted.clone(),
                    settings: settings.clone(),
                })
                .collect::<Vec<_>>()
                .into_par_iter()
                .map(PrefixLookupTask::run)
                .collect(),
        };

        let mut merged: BTreeMap<String, MetadataRecord> = BTreeMap::new();
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(o) => {
                    self.stats.absorb(&o.stats);
                    merged.extend(o.records.into_iter().map(|r| (r.key.clone(), r)));
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        Ok(merged.into_values().collect())
    }

    /// Streams every record of every admissible log data block of
    /// `partition` to `callback`, without merging. Base files are not read.
    ///
    /// # Errors
    ///
    /// [`MetadataError::DeleteBlockInUnmergedScan`] if a delete block is
    /// reached; [`MetadataError::Read`] if a log cannot be read.
    pub fn stream_log_records<F>(
        &self,
        partition: &str,
        mut callback: F,
    ) -> Result<ScanCounts, MetadataError>
    where
        F: FnMut(MetadataRecord),
    {
        let mut total = ScanCounts::default();
        let Some(tables) = &self.tables else {
            return Ok(total);
        };
        let slices = self.partition_slices(tables, partition)?;
        let settings = self.scan_settings(tables, partition)?;
        for slice in slices.iter() {
            let scanner = UnmergedLogScanner::new(
                slice.partition.clone(),
                slice.file_id.clone(),
                slice.log_files.iter().cloned(),
                settings.clone(),
            );
            let counts = scanner.scan(&mut callback)?;
            self.stats.record_blocks(counts);
            total.blocks_read += counts.blocks_read;
            total.blocks_skipped += counts.blocks_skipped;
        }
        Ok(total)
    }

    fn partition_slices(
        &self,
        tables: &Tables,
        partition: &str,
    ) -> Result<Arc<Vec<FileSlice>>, MetadataError> {
        if let Some(cached) = self.slices.get(partition) {
            return Ok(Arc::clone(cached.value()));
        }
        let listed = latest_file_slices(&self.metadata_path, partition, tables.metadata.timeline())
            .map_err(|source| MetadataError::ListSlices {
                partition: partition.to_string(),
                source,
            })?;
        tracing::debug!(partition, slices = listed.len(), "listed metadata file slices");
        let listed = Arc::new(listed);
        self.slices
            .insert(partition.to_string(), Arc::clone(&listed));
        Ok(listed)
    }

    /// Scan settings for one call: the valid instants are recomputed from the
    /// current dataset timeline every time.
    fn scan_settings(&self, tables: &Tables, partition: &str) -> Result<ScanSettings, MetadataError> {
        let valid = ValidInstants::compute(tables.dataset.timeline(), self.config.rollback_boundary)?;
        let latest_metadata_instant = tables
            .metadata
            .timeline()
            .last_completed()
            .map(|i| i.time)
            .unwrap_or(SOLO_COMMIT_TIMESTAMP);
        Ok(ScanSettings {
            valid_instants: Arc::new(valid),
            latest_metadata_instant,
            read_buffer_bytes: self.config.read_buffer_bytes,
            max_memory_bytes: self.config.max_memory_bytes,
            spill_dir: self.config.spill_dir.clone(),
            overflow_policy: self.config.overflow_policy,
            full_scan: partition == PARTITION_FILES && self.config.full_scan_files_partition,
        })
    }

    // -------------------- Timeline --------------------

    /// Latest dataset instant the metadata table has caught up with: the last
    /// completed delta commit on the metadata timeline.
    #[must_use]
    pub fn get_synced_instant_time(&self) -> Option<InstantTime> {
        self.tables.as_ref().and_then(|t| {
            t.metadata
                .timeline()
                .last_completed_of(&[Action::DeltaCommit])
                .map(|i| i.time)
        })
    }

    /// Last completed compaction (a `commit`) on the metadata timeline.
    #[must_use]
    pub fn get_latest_compaction_time(&self) -> Option<InstantTime> {
        self.tables.as_ref().and_then(|t| {
            t.metadata
                .timeline()
                .last_completed_of(&[Action::Commit])
                .map(|i| i.time)
        })
    }

    // -------------------- Partitions --------------------

    /// Every partition of the dataset, sorted. A non-partitioned dataset
    /// reports its single partition as `""`.
    ///
    /// # Errors
    ///
    /// See [`get_records_by_keys`](Self::get_records_by_keys).
    pub fn get_all_partition_paths(&self) -> Result<Vec<String>, MetadataError> {
        let record = self.get_record_by_key(key::ALL_PARTITIONS, PARTITION_FILES)?;
        Ok(live_listing(record)
            .into_iter()
            .map(|(name, _)| {
                if name == key::NON_PARTITIONED {
                    String::new()
                } else {
                    name
                }
            })
            .collect())
    }

    /// Live files of one dataset partition with their sizes, sorted by name.
    ///
    /// # Errors
    ///
    /// See [`get_records_by_keys`](Self::get_records_by_keys).
    pub fn get_all_files_in_partition(
        &self,
        partition_path: &str,
    ) -> Result<Vec<(String, u64)>, MetadataError> {
        let record = self.get_record_by_key(&key::files(partition_path), PARTITION_FILES)?;
        Ok(live_listing(record))
    }

    /// Partitions equal to or nested under one of `prefixes`. An empty
    /// prefix list, or an empty prefix, selects every partition.
    ///
    /// # Errors
    ///
    /// See [`get_records_by_keys`](Self::get_records_by_keys).
    pub fn get_partition_paths_with_prefixes(
        &self,
        prefixes: &[String],
    ) -> Result<Vec<String>, MetadataError> {
        let all = self.get_all_partition_paths()?;
        let prefixes: Vec<&str> = prefixes.iter().map(|p| p.trim_end_matches('/')).collect();
        if prefixes.is_empty() || prefixes.iter().any(|p| p.is_empty()) {
            return Ok(all);
        }
        Ok(all
            .into_iter()
            .filter(|path| {
                prefixes.iter().any(|&prefix| match path.strip_prefix(prefix) {
                    Some(rest) => rest.is_empty() || rest.starts_with('/'),
                    None => false,
                })
            })
            .collect())
    }

    // -------------------- Lifecycle --------------------

    /// Closes every cached reader and reloads both timelines from disk.
    ///
    /// Cached scanners embed the instants they trusted at open time, so they
    /// are dropped before the reload.
    pub fn reset(&mut self) {
        self.cache.close_all();
        self.slices.clear();
        self.load();
    }

    /// Closes every cached reader. Lookups still work afterwards and reopen
    /// readers as needed. Safe to call repeatedly.
    pub fn close(&self) {
        self.cache.close_all();
        self.slices.clear();
    }
}

impl Drop for TableMetadata {
    fn drop(&mut self) {
        self.close();
    }
}

fn live_listing(record: Option<MetadataRecord>) -> Vec<(String, u64)> {
    match record.map(|r| r.payload) {
        Some(MetadataPayload::Files(listing)) => listing
            .live_files()
            .map(|(name, size)| (name.to_string(), size))
            .collect(),
        Some(other) => {
            tracing::warn!(kind = other.kind(), "expected a files listing record");
            Vec::new()
        }
        None => Vec::new(),
    }
}
