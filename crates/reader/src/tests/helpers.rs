use anyhow::Result;
use basefile::{BaseFileName, BaseFileWriter};
use config::{MetadataConfig, OverflowPolicy};
use logfile::{Block, LogFile, LogFileName, LogWriter};
use record::{BloomFilterPayload, FilesKind, FilesPayload, MetadataPayload, MetadataRecord};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use timeline::{Action, Instant, InstantTime, State, TableMetaClient, TIMELINE_DIR};

use crate::fs_view::FileSlice;
use crate::scanner::ScanSettings;
use crate::validity::ValidInstants;
use crate::TableMetadata;

/// A dataset directory with an (initially empty) metadata table.
pub struct Fixture {
    pub dir: TempDir,
    pub dataset: PathBuf,
    pub metadata: PathBuf,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        let dir = tempdir()?;
        let dataset = dir.path().join("dataset");
        let metadata = TableMetaClient::metadata_table_path(&dataset);
        fs::create_dir_all(dataset.join(TIMELINE_DIR))?;
        fs::create_dir_all(metadata.join(TIMELINE_DIR))?;
        Ok(Self {
            dir,
            dataset,
            metadata,
        })
    }

    /// A dataset with no metadata table at all.
    pub fn without_metadata() -> Result<Self> {
        let fixture = Self::new()?;
        fs::remove_dir_all(&fixture.metadata)?;
        Ok(fixture)
    }

    fn touch(timeline_root: &Path, instant: Instant, body: &[u8]) -> Result<()> {
        fs::write(timeline_root.join(TIMELINE_DIR).join(instant.file_name()), body)?;
        Ok(())
    }

    pub fn dataset_instant(&self, ts: u64, action: Action, state: State) -> Result<()> {
        Self::touch(&self.dataset, Instant::new(ts, action, state), b"")
    }

    pub fn dataset_commit(&self, ts: u64) -> Result<()> {
        self.dataset_instant(ts, Action::Commit, State::Completed)
    }

    pub fn dataset_rollback(&self, ts: u64, rolled_back: &[u64]) -> Result<()> {
        let commits: Vec<String> = rolled_back.iter().map(|c| c.to_string()).collect();
        let body = serde_json::json!({ "commitsRollback": commits }).to_string();
        Self::touch(
            &self.dataset,
            Instant::completed(ts, Action::Rollback),
            body.as_bytes(),
        )
    }

    /// A completed rollback whose details are not valid JSON.
    pub fn dataset_broken_rollback(&self, ts: u64) -> Result<()> {
        Self::touch(&self.dataset, Instant::completed(ts, Action::Rollback), b"{oops")
    }

    pub fn metadata_delta_commit(&self, ts: u64) -> Result<()> {
        Self::touch(&self.metadata, Instant::completed(ts, Action::DeltaCommit), b"")
    }

    pub fn metadata_compaction(&self, ts: u64) -> Result<()> {
        Self::touch(&self.metadata, Instant::completed(ts, Action::Commit), b"")
    }

    /// Marks `ts` completed on both timelines, the usual state after a
    /// dataset commit has been synced.
    pub fn synced_commit(&self, ts: u64) -> Result<()> {
        self.dataset_commit(ts)?;
        self.metadata_delta_commit(ts)
    }

    pub fn partition_dir(&self, partition: &str) -> Result<PathBuf> {
        let dir = self.metadata.join(partition);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Writes a base file. `records` may come in any order.
    pub fn base_file(
        &self,
        partition: &str,
        file_id: &str,
        instant: u64,
        records: &[MetadataRecord],
    ) -> Result<PathBuf> {
        let name = BaseFileName::new(file_id, InstantTime::new(instant));
        let path = self.partition_dir(partition)?.join(name.file_name());
        let mut sorted = records.to_vec();
        sorted.sort_by(|a, b| a.key.cmp(&b.key));
        BaseFileWriter::write(&path, &sorted)?;
        Ok(path)
    }

    pub fn log_file(
        &self,
        partition: &str,
        file_id: &str,
        base_instant: u64,
        version: u32,
        blocks: &[Block],
    ) -> Result<PathBuf> {
        let name = LogFileName::new(file_id, InstantTime::new(base_instant), version);
        let path = self.partition_dir(partition)?.join(name.file_name());
        let mut writer = LogWriter::create(&path, false)?;
        for block in blocks {
            writer.append(block)?;
        }
        writer.sync_to_disk()?;
        Ok(path)
    }

    /// Empty file groups named `<prefix>-0000`, `<prefix>-0001`, ...
    pub fn file_ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}-{i:04}")).collect()
    }

    pub fn config(&self) -> MetadataConfig {
        MetadataConfig {
            spill_dir: self.dir.path().join("spill"),
            ..MetadataConfig::default()
        }
    }

    pub fn open(&self) -> TableMetadata {
        TableMetadata::new(&self.dataset, self.config())
    }

    pub fn open_with(&self, config: MetadataConfig) -> TableMetadata {
        TableMetadata::new(&self.dataset, config)
    }
}

pub fn bloom(key: &str, ts: &str) -> MetadataRecord {
    MetadataRecord::new(
        key,
        MetadataPayload::BloomFilter(BloomFilterPayload {
            filter_type: "SIMPLE".to_string(),
            timestamp: ts.to_string(),
            filter: key.as_bytes().to_vec(),
            deleted: false,
        }),
    )
}

pub fn listing(key: &str, kind: FilesKind, files: &[(&str, u64)]) -> MetadataRecord {
    MetadataRecord::new(
        key,
        MetadataPayload::Files(FilesPayload::listing(kind, files.iter().copied())),
    )
}

pub fn data(ts: u64, records: Vec<MetadataRecord>) -> Block {
    Block::Data {
        instant: InstantTime::new(ts),
        records,
    }
}

pub fn delete(ts: u64, keys: &[&str]) -> Block {
    Block::Delete {
        instant: InstantTime::new(ts),
        keys: keys.iter().map(|k| k.to_string()).collect(),
    }
}

pub fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

/// Timestamp carried by a bloom record built with [`bloom`].
pub fn stamp(record: &MetadataRecord) -> Option<&str> {
    match &record.payload {
        MetadataPayload::BloomFilter(b) => Some(b.timestamp.as_str()),
        _ => None,
    }
}

pub fn settings(valid: &[u64], latest: u64, spill_dir: &Path) -> ScanSettings {
    ScanSettings {
        valid_instants: Arc::new(ValidInstants::from_instants(
            valid.iter().map(|&t| InstantTime::new(t)),
        )),
        latest_metadata_instant: InstantTime::new(latest),
        read_buffer_bytes: 4096,
        max_memory_bytes: 1024 * 1024,
        spill_dir: spill_dir.to_path_buf(),
        overflow_policy: OverflowPolicy::Lru,
        full_scan: false,
    }
}

pub fn log_files(paths: &[PathBuf]) -> Vec<LogFile> {
    paths.iter().filter_map(|p| LogFile::from_path(p)).collect()
}

pub fn empty_slice(file_id: &str) -> FileSlice {
    FileSlice {
        partition: "p".to_string(),
        file_id: file_id.to_string(),
        base_file: None,
        log_files: Vec::new(),
    }
}
