use byteorder::{LittleEndian, ReadBytesExt};
use record::MetadataRecord;
use timeline::InstantTime;

use crate::LogError;

/// Size of `[kind][instant][count]` at the start of every body.
pub(crate) const HEADER_BYTES: usize = 1 + 8 + 4;

/// What a block carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Inserted or updated records.
    Data,
    /// Deleted keys.
    Delete,
}

impl BlockKind {
    pub(crate) fn code(self) -> u8 {
        match self {
            BlockKind::Data => 0,
            BlockKind::Delete => 1,
        }
    }

    fn from_code(code: u8) -> Result<Self, LogError> {
        match code {
            0 => Ok(BlockKind::Data),
            1 => Ok(BlockKind::Delete),
            _ => Err(LogError::Corrupt("unknown block kind")),
        }
    }
}

/// Kind, writing instant and entry count of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub kind: BlockKind,
    pub instant: InstantTime,
    pub count: u32,
}

/// An owned block, as handed to [`LogWriter::append`](crate::LogWriter::append).
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Data {
        instant: InstantTime,
        records: Vec<MetadataRecord>,
    },
    Delete {
        instant: InstantTime,
        keys: Vec<String>,
    },
}

impl Block {
    #[must_use]
    pub fn instant(&self) -> InstantTime {
        match self {
            Block::Data { instant, .. } | Block::Delete { instant, .. } => *instant,
        }
    }
}

/// A decoded block borrowing the reader's buffer.
///
/// The buffer is overwritten by the next call to
/// [`LogReader::next_block`](crate::LogReader::next_block); anything that must
/// outlive the block has to be copied out (see [`RawRecord::to_record`]).
#[derive(Debug, Clone, Copy)]
pub struct LogBlock<'a> {
    header: BlockHeader,
    entries: &'a [u8],
}

impl<'a> LogBlock<'a> {
    /// Parses a block body (everything after the CRC).
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Corrupt`] if the body is shorter than a header or
    /// the kind byte is unknown.
    pub fn parse(body: &'a [u8]) -> Result<Self, LogError> {
        if body.len() < HEADER_BYTES {
            return Err(LogError::Corrupt("block shorter than its header"));
        }
        let mut r = body;
        let kind = BlockKind::from_code(r.read_u8()?)?;
        let instant = InstantTime::new(r.read_u64::<LittleEndian>()?);
        let count = r.read_u32::<LittleEndian>()?;
        Ok(Self {
            header: BlockHeader {
                kind,
                instant,
                count,
            },
            entries: r,
        })
    }

    #[must_use]
    pub fn header(&self) -> BlockHeader {
        self.header
    }

    #[must_use]
    pub fn kind(&self) -> BlockKind {
        self.header.kind
    }

    #[must_use]
    pub fn instant(&self) -> InstantTime {
        self.header.instant
    }

    /// Iterates the records of a data block. Yields nothing for a delete block.
    #[must_use]
    pub fn records(&self) -> Records<'a> {
        let remaining = match self.header.kind {
            BlockKind::Data => self.header.count,
            BlockKind::Delete => 0,
        };
        Records {
            buf: self.entries,
            remaining,
        }
    }

    /// Iterates the keys of a delete block. Yields nothing for a data block.
    #[must_use]
    pub fn deleted_keys(&self) -> DeletedKeys<'a> {
        let remaining = match self.header.kind {
            BlockKind::Delete => self.header.count,
            BlockKind::Data => 0,
        };
        DeletedKeys {
            buf: self.entries,
            remaining,
        }
    }
}

/// A record still in its encoded form, borrowing the block buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    pub key: &'a str,
    pub value: &'a [u8],
}

impl RawRecord<'_> {
    /// Decodes into an owned record that no longer references the buffer.
    pub fn to_record(&self) -> Result<MetadataRecord, LogError> {
        Ok(MetadataRecord::decode(self.value)?)
    }
}

fn take<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], LogError> {
    if buf.len() < len {
        return Err(LogError::Corrupt("entry runs past the end of its block"));
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

fn take_key<'a>(buf: &mut &'a [u8]) -> Result<&'a str, LogError> {
    let len = buf.read_u32::<LittleEndian>()? as usize;
    let bytes = take(buf, len)?;
    std::str::from_utf8(bytes).map_err(|_| LogError::Corrupt("key is not valid utf-8"))
}

/// Iterator over the records of a data block.
pub struct Records<'a> {
    buf: &'a [u8],
    remaining: u32,
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<RawRecord<'a>, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let next = (|| -> Result<RawRecord<'a>, LogError> {
            let key = take_key(&mut self.buf)?;
            let len = self.buf.read_u32::<LittleEndian>()? as usize;
            let value = take(&mut self.buf, len)?;
            Ok(RawRecord { key, value })
        })();
        if next.is_err() {
            self.remaining = 0;
        }
        Some(next)
    }
}

/// Iterator over the keys of a delete block.
pub struct DeletedKeys<'a> {
    buf: &'a [u8],
    remaining: u32,
}

impl<'a> Iterator for DeletedKeys<'a> {
    type Item = Result<&'a str, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let next = take_key(&mut self.buf);
        if next.is_err() {
            self.remaining = 0;
        }
        Some(next)
    }
}
