use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::{LogBlock, LogError};

/// Upper bound on a single block. Anything larger is treated as corruption.
const MAX_BLOCK_SIZE: u32 = 256 * 1024 * 1024;

/// Sequential block reader.
///
/// Generic over any `Read` so tests can feed an in-memory `Cursor`. The body
/// buffer is reused between blocks: a [`LogBlock`] borrows it and is
/// invalidated by the next call to [`next_block`](Self::next_block).
///
/// A truncated final block reads as a clean end of file. A CRC mismatch or an
/// absurd length is [`LogError::Corrupt`].
pub struct LogReader<R: Read> {
    rdr: BufReader<R>,
    body: Vec<u8>,
    blocks_read: u64,
}

impl LogReader<File> {
    /// Opens a log file with the default buffer size.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        Ok(Self::from_reader(File::open(path)?))
    }

    /// Opens a log file with a read buffer of `capacity` bytes.
    pub fn open_with_capacity<P: AsRef<Path>>(
        path: P,
        capacity: usize,
    ) -> Result<Self, LogError> {
        Ok(Self::with_capacity(capacity, File::open(path)?))
    }
}

impl<R: Read> LogReader<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            rdr: BufReader::new(reader),
            body: Vec::with_capacity(4096),
            blocks_read: 0,
        }
    }

    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        Self {
            rdr: BufReader::with_capacity(capacity.max(1), reader),
            body: Vec::with_capacity(4096),
            blocks_read: 0,
        }
    }

    /// Number of complete blocks returned so far.
    #[must_use]
    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    /// Reads the next block, or `None` at end of file.
    ///
    /// # Errors
    ///
    /// - [`LogError::Corrupt`] on a CRC mismatch, an impossible length, or a
    ///   malformed header.
    /// - [`LogError::Io`] on any other read failure.
    pub fn next_block(&mut self) -> Result<Option<LogBlock<'_>>, LogError> {
        let block_len = match self.rdr.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if block_len <= 4 || block_len > MAX_BLOCK_SIZE {
            return Err(LogError::Corrupt("impossible block length"));
        }

        let crc = match self.rdr.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        self.body.clear();
        self.body.resize((block_len - 4) as usize, 0);
        match self.rdr.read_exact(&mut self.body) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let mut hasher = Crc32::new();
        hasher.update(&self.body);
        if hasher.finalize() != crc {
            return Err(LogError::Corrupt("crc mismatch"));
        }

        self.blocks_read += 1;
        LogBlock::parse(&self.body).map(Some)
    }
}
