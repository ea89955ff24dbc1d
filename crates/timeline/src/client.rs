use std::path::{Path, PathBuf};

use crate::{ActiveTimeline, TimelineError, METADATA_TABLE_DIR, TIMELINE_DIR};

/// Handle on one table: its base path and loaded active timeline.
#[derive(Debug, Clone)]
pub struct TableMetaClient {
    base_path: PathBuf,
    timeline: ActiveTimeline,
}

impl TableMetaClient {
    /// Opens the table at `base_path` and loads its timeline.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineError::TableNotFound`] if `base_path` has no timeline
    /// directory, or any error from [`ActiveTimeline::load`].
    pub fn load<P: AsRef<Path>>(base_path: P) -> Result<Self, TimelineError> {
        let base_path = base_path.as_ref().to_path_buf();
        let dir = base_path.join(TIMELINE_DIR);
        if !dir.is_dir() {
            return Err(TimelineError::TableNotFound { path: base_path });
        }
        let timeline = ActiveTimeline::load(&dir)?;
        Ok(Self {
            base_path,
            timeline,
        })
    }

    /// Wraps an in-memory timeline, for tables that are not on disk.
    #[must_use]
    pub fn from_timeline(base_path: impl Into<PathBuf>, timeline: ActiveTimeline) -> Self {
        Self {
            base_path: base_path.into(),
            timeline,
        }
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    #[must_use]
    pub fn timeline(&self) -> &ActiveTimeline {
        &self.timeline
    }

    /// Re-reads the timeline from disk.
    pub fn reload_timeline(&mut self) -> Result<(), TimelineError> {
        self.timeline.reload()
    }

    /// Path of the metadata table that belongs to the dataset at `dataset`.
    #[must_use]
    pub fn metadata_table_path(dataset: &Path) -> PathBuf {
        dataset.join(TIMELINE_DIR).join(METADATA_TABLE_DIR)
    }

    /// Returns `true` if `path` is itself a metadata table.
    #[must_use]
    pub fn is_metadata_table(path: &Path) -> bool {
        path.file_name().map(|n| n == METADATA_TABLE_DIR).unwrap_or(false)
            && path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n == TIMELINE_DIR)
                .unwrap_or(false)
    }
}
