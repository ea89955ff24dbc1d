//! # Reader - Metadata Table Read Path
//!
//! Answers point, batch and key-prefix lookups against the metadata table of
//! a dataset. Each metadata partition is split into file groups; the latest
//! slice of a group is an immutable sorted base file plus the log files
//! appended on top of it.
//!
//! ## Architecture
//!
//! ```text
//! get_records_by_keys(keys, partition)
//!   |
//!   v
//! ┌──────────────────────────────────────────────────────┐
//! │                   TableMetadata                      │
//! │                                                      │
//! │ fs_view  → latest file slices (sorted by file id)    │
//! │ router   → key → bucket → file slice                 │
//! │ validity → dataset instants a log block may carry    │
//! │ cache    → (base reader, log scanner) per slice      │
//! │              |                                       │
//! │              v                                       │
//! │ scanner  → merged log state per key (spills to disk) │
//! │ reconcile→ base record ⊕ log state → answer          │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                                  |
//! |---------------|----------------------------------------------------------|
//! | [`router`]    | `bucket_of()`, `route()`                                 |
//! | [`validity`]  | `ValidInstants::compute()` from the dataset timeline     |
//! | [`fs_view`]   | `latest_file_slices()`                                   |
//! | [`scanner`]   | merged and unmerged log scanning                         |
//! | [`spill`]     | memory-bounded map backing the merged scanner            |
//! | [`reconcile`] | combining base and log results                           |
//! | [`pair`]      | opening the readers of one slice                         |
//! | [`cache`]     | sharing reader pairs between lookups                     |
//! | [`prefix`]    | self-contained prefix lookups over one slice             |
//! | [`metadata`]  | `TableMetadata`, the public entry point                  |
//!
//! ## Consistency
//!
//! Log blocks are applied in file order and block order, last write wins. A
//! block is skipped when its instant is not in [`ValidInstants`] or is newer
//! than the latest completed instant on the metadata table's own timeline.
//! A delete in the log shadows the base file's record for that key.

pub mod cache;
mod error;
pub mod fs_view;
pub mod metadata;
pub mod pair;
pub mod prefix;
pub mod reconcile;
pub mod router;
pub mod scanner;
pub mod spill;
mod stats;
pub mod validity;

pub use cache::{ReaderCache, ReaderPair};
pub use error::MetadataError;
pub use fs_view::{latest_file_slices, BaseFile, FileSlice};
pub use metadata::{EvaluationMode, MetadataStatus, TableMetadata};
pub use pair::ReaderHandles;
pub use prefix::{PrefixLookupOutcome, PrefixLookupTask};
pub use router::{bucket_of, key_hash, route};
pub use scanner::{LogValue, MergedLogScanner, ScanCounts, ScanSettings, UnmergedLogScanner};
pub use spill::SpillableMap;
pub use stats::{MetadataStats, StatsSnapshot};
pub use validity::ValidInstants;

#[cfg(test)]
mod tests;
