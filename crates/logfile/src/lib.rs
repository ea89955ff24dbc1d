//! # Logfile - Metadata Log Blocks
//!
//! Append-only delta files of a metadata file group. Each log file holds a
//! sequence of **blocks**; each block is written by one instant and carries
//! either upserted records or deleted keys. The order of blocks inside a file,
//! and of files inside a file slice, is the order in which they must be
//! applied.
//!
//! ## Binary Block Format
//!
//! ```text
//! [block_len: u32 LE][crc32: u32 LE][body ...]
//! ```
//!
//! Body: `[kind: u8][instant: u64][count: u32][entries ...]`
//!
//! - Data entry (`kind = 0`): `[key_len: u32][key][val_len: u32][record bytes]`
//! - Delete entry (`kind = 1`): `[key_len: u32][key]`
//!
//! `block_len` includes the 4-byte CRC but **not** itself. A truncated final
//! block (crash mid-append) reads as a clean end of file.
//!
//! ## File names
//!
//! ```text
//! .<file_id>_<base_instant>.log.<version>_<write_token>[-cdc]
//! ```
//!
//! See [`LogFileName`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use logfile::{Block, LogReader, LogWriter};
//! use timeline::InstantTime;
//!
//! let mut w = LogWriter::create(".files-0000_0.log.1_0-1-0", true).unwrap();
//! w.append(&Block::Delete {
//!     instant: InstantTime::new(10),
//!     keys: vec!["2024/01/01".to_string()],
//! }).unwrap();
//! drop(w);
//!
//! let mut r = LogReader::open(".files-0000_0.log.1_0-1-0").unwrap();
//! while let Some(block) = r.next_block().unwrap() {
//!     println!("{:?}", block.header());
//! }
//! ```

mod block;
mod name;
mod reader;
mod writer;

use std::io;

use thiserror::Error;

pub use block::{Block, BlockHeader, BlockKind, DeletedKeys, LogBlock, RawRecord, Records};
pub use name::{LogFile, LogFileName, CDC_SUFFIX};
pub use reader::LogReader;
pub use writer::LogWriter;

/// Errors that can occur while reading or writing log files.
#[derive(Debug, Error)]
pub enum LogError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A block failed CRC validation or its body is inconsistent.
    #[error("corrupt log block: {0}")]
    Corrupt(&'static str),

    /// A record inside a block could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Codec(#[from] bincode::Error),
}

#[cfg(test)]
mod tests;
