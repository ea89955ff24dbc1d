//! # Timeline - Table Instants
//!
//! A table's history is a sequence of **instants**, each an action
//! (commit, delta commit, rollback, restore, ...) at a timestamp, moving
//! through `requested -> inflight -> completed`. Every instant is one file in
//! the table's `.timeline/` directory (see [`Instant::file_name`]).
//!
//! Two timelines matter to the metadata read path:
//!
//! - the **dataset** timeline, which decides which log blocks are trusted
//!   (a metadata write lands before the dataset commit it describes
//!   completes, so it may describe a commit that is later rolled back);
//! - the **metadata table's own** timeline, whose latest completed instant
//!   bounds what a log scanner may read.
//!
//! ## Layout
//!
//! ```text
//! <dataset>/.timeline/<ts>.<action>[.<state>]
//! <dataset>/.timeline/metadata/.timeline/<ts>.<action>[.<state>]
//! ```

mod active;
mod client;
mod instant;
mod rollback;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use active::ActiveTimeline;
pub use client::TableMetaClient;
pub use instant::{Action, Instant, InstantTime, State, SOLO_COMMIT_TIMESTAMP};
pub use rollback::{rolled_back_commits, RestoreMetadata, RollbackMetadata};

/// Name of the timeline directory under a table's base path.
pub const TIMELINE_DIR: &str = ".timeline";

/// Name of the metadata table directory under the dataset's timeline dir.
pub const METADATA_TABLE_DIR: &str = "metadata";

/// Errors raised while loading or interpreting a timeline.
#[derive(Debug, Error)]
pub enum TimelineError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The path has no timeline directory.
    #[error("table not found at {}", path.display())]
    TableNotFound { path: PathBuf },

    /// A timestamp that is not a digit string.
    #[error("invalid instant timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// A timeline file name that does not follow `<ts>.<action>[.<state>]`.
    #[error("invalid timeline file name: {0:?}")]
    InvalidFileName(String),

    /// Rollback or restore details that cannot be deserialized.
    #[error("error retrieving rollback commits for instant {instant}")]
    MalformedMetadata {
        instant: String,
        #[source]
        source: serde_json::Error,
    },

    /// A rollback or restore instant without stored details.
    #[error("no details recorded for instant {instant}")]
    MissingDetails { instant: String },
}
