//! # Basefile - Sorted Metadata Snapshots
//!
//! A base file is the immutable full snapshot of one metadata file group as
//! of some instant. Records are stored sorted by key so the reader can answer
//! both point lookups and key-prefix lookups from an in-memory index.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION (records in ascending key order)                 │
//! │                                                               │
//! │ crc32 (u32) | key_len (u32) | key | val_len (u32) | val       │
//! │                                                               │
//! │ `val` is the bincode-encoded MetadataRecord. The CRC covers   │
//! │ everything after itself.                                      │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX SECTION (key -> data_offset)                            │
//! │                                                               │
//! │ key_len (u32) | key | data_offset (u64)                       │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 20 bytes)                                 │
//! │                                                               │
//! │ record_count (u64 LE) | index_offset (u64 LE) | magic "MBF1"  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## File names
//!
//! `<file_id>_<instant>.base`, see [`BaseFileName`].

mod format;
mod name;
mod reader;
mod writer;

pub use format::{BASE_FILE_MAGIC, FOOTER_BYTES};
pub use name::{BaseFileName, BASE_EXTENSION};
pub use reader::BaseFileReader;
pub use writer::BaseFileWriter;
