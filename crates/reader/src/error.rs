use thiserror::Error;
use timeline::{InstantTime, TimelineError};

/// Errors surfaced by metadata lookups.
///
/// A missing or disabled metadata table is not an error; see
/// [`MetadataStatus`](crate::MetadataStatus).
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The file slices of a partition could not be listed.
    #[error("error listing file slices of metadata partition {partition}")]
    ListSlices {
        partition: String,
        #[source]
        source: anyhow::Error,
    },

    /// The base file reader or log scanner of a file slice failed to open.
    #[error("error opening readers for metadata table partition {partition} file group {file_id}")]
    OpenReaders {
        partition: String,
        file_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Reading an already opened file slice failed.
    #[error("error merging records from metadata table partition {partition} file group {file_id}")]
    Read {
        partition: String,
        file_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The dataset timeline could not be interpreted, e.g. a rollback whose
    /// details do not parse.
    #[error(transparent)]
    Timeline(#[from] TimelineError),

    /// Unmerged scans only accept data blocks.
    #[error("delete block at instant {instant} in {file} is not supported by an unmerged scan")]
    DeleteBlockInUnmergedScan { file: String, instant: InstantTime },
}
