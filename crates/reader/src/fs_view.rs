//! File-slice enumeration for one metadata partition.

use anyhow::{Context, Result};
use basefile::BaseFileName;
use logfile::LogFile;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use timeline::{ActiveTimeline, InstantTime, SOLO_COMMIT_TIMESTAMP};

/// A base file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseFile {
    pub name: BaseFileName,
    pub path: PathBuf,
}

/// The latest base file of a file group plus every log written on top of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSlice {
    pub partition: String,
    pub file_id: String,
    pub base_file: Option<BaseFile>,
    /// Sorted by [`logfile::LogFileName`] order.
    pub log_files: Vec<LogFile>,
}

impl FileSlice {
    /// Instant of the base file, or the bootstrap instant if there is none.
    #[must_use]
    pub fn base_instant(&self) -> InstantTime {
        self.base_file
            .as_ref()
            .map(|b| b.name.instant)
            .unwrap_or(SOLO_COMMIT_TIMESTAMP)
    }
}

#[derive(Default)]
struct FileGroup {
    bases: Vec<BaseFile>,
    logs: Vec<LogFile>,
}

/// Lists the latest merged file slice of every file group under
/// `<metadata_path>/<partition>`, sorted by file id.
///
/// A base file only counts once its instant is completed on the metadata
/// timeline (or is the bootstrap instant). Logs whose base instant is older
/// than the chosen base file belong to a compacted-away slice and are
/// dropped. Every file group yields a slice, even an empty one, so the
/// slice count always equals the bucket count used by the writer. A missing
/// partition directory yields no slices.
///
/// # Errors
///
/// Fails if the partition directory exists but cannot be listed.
pub fn latest_file_slices(
    metadata_path: &Path,
    partition: &str,
    metadata_timeline: &ActiveTimeline,
) -> Result<Vec<FileSlice>> {
    let dir = metadata_path.join(partition);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut groups: BTreeMap<String, FileGroup> = BTreeMap::new();
    let entries =
        fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(log) = LogFile::from_path(&path) {
            groups
                .entry(log.name.file_id.clone())
                .or_default()
                .logs
                .push(log);
        } else if let Some(base) = BaseFileName::parse(name) {
            groups
                .entry(base.file_id.clone())
                .or_default()
                .bases
                .push(BaseFile {
                    name: base,
                    path: path.clone(),
                });
        }
    }

    let slices = groups
        .into_iter()
        .map(|(file_id, group)| {
            let base_file = group
                .bases
                .into_iter()
                .filter(|b| {
                    b.name.instant == SOLO_COMMIT_TIMESTAMP
                        || metadata_timeline.is_completed_at(b.name.instant)
                })
                .max_by_key(|b| b.name.instant);
            let floor = base_file
                .as_ref()
                .map(|b| b.name.instant)
                .unwrap_or(SOLO_COMMIT_TIMESTAMP);
            let mut log_files: Vec<LogFile> = group
                .logs
                .into_iter()
                .filter(|l| l.name.base_instant >= floor)
                .collect();
            log_files.sort();
            FileSlice {
                partition: partition.to_string(),
                file_id,
                base_file,
                log_files,
            }
        })
        .collect();
    Ok(slices)
}
