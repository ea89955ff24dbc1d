use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::block::BlockKind;
use crate::{Block, LogError};

/// Append-only log file writer.
///
/// Each block is serialized into a reused buffer, checksummed, and written
/// with a single `write_all`. With `sync` set every append is followed by
/// `sync_all()`.
///
/// The read path never writes logs; this exists so tools and tests can
/// produce file slices in the same format the reader consumes.
pub struct LogWriter {
    file: File,
    sync: bool,
    buf: Vec<u8>,
}

impl LogWriter {
    /// Opens (or creates) a log file in append mode.
    ///
    /// # Arguments
    ///
    /// * `path` - location of the log file.
    /// * `sync` - fsync after every appended block.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, LogError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file,
            sync,
            buf: Vec::with_capacity(4096),
        })
    }

    /// Serializes `block` and appends it.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, if a record cannot be encoded, or if the block
    /// body would not fit in a `u32` length.
    pub fn append(&mut self, block: &Block) -> Result<(), LogError> {
        self.buf.clear();
        // frame header, filled once the body is known
        self.buf.extend_from_slice(&[0u8; 8]);

        match block {
            Block::Data { instant, records } => {
                self.buf.write_u8(BlockKind::Data.code())?;
                self.buf.write_u64::<LittleEndian>(instant.as_u64())?;
                self.buf.write_u32::<LittleEndian>(len_u32(records.len())?)?;
                for record in records {
                    let value = record.encode()?;
                    put_bytes(&mut self.buf, record.key.as_bytes())?;
                    put_bytes(&mut self.buf, &value)?;
                }
            }
            Block::Delete { instant, keys } => {
                self.buf.write_u8(BlockKind::Delete.code())?;
                self.buf.write_u64::<LittleEndian>(instant.as_u64())?;
                self.buf.write_u32::<LittleEndian>(len_u32(keys.len())?)?;
                for key in keys {
                    put_bytes(&mut self.buf, key.as_bytes())?;
                }
            }
        }

        let body = &self.buf[8..];
        let mut hasher = Crc32::new();
        hasher.update(body);
        let crc = hasher.finalize();
        let block_len = len_u32(body.len() + 4)?;

        self.buf[0..4].copy_from_slice(&block_len.to_le_bytes());
        self.buf[4..8].copy_from_slice(&crc.to_le_bytes());

        self.file.write_all(&self.buf)?;
        self.file.flush()?;
        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Flushes and fsyncs regardless of the `sync` setting.
    pub fn sync_to_disk(&mut self) -> Result<(), LogError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

fn len_u32(len: usize) -> Result<u32, LogError> {
    u32::try_from(len).map_err(|_| {
        LogError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "log block too large (exceeds u32::MAX bytes)",
        ))
    })
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<(), LogError> {
    buf.write_u32::<LittleEndian>(len_u32(bytes.len())?)?;
    buf.extend_from_slice(bytes);
    Ok(())
}
