//! Footer constants and helpers.
//!
//! ```text
//! [record_count: u64 LE][index_offset: u64 LE][magic: u32 LE]
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Magic number identifying base files (ASCII "MBF1").
pub const BASE_FILE_MAGIC: u32 = 0x4D42_4631;

/// Size of the footer: 8 (`record_count`) + 8 (`index_offset`) + 4 (`magic`).
pub const FOOTER_BYTES: u64 = 8 + 8 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footer {
    pub record_count: u64,
    pub index_offset: u64,
}

pub(crate) fn write_footer<W: Write>(w: &mut W, footer: Footer) -> io::Result<()> {
    w.write_u64::<LittleEndian>(footer.record_count)?;
    w.write_u64::<LittleEndian>(footer.index_offset)?;
    w.write_u32::<LittleEndian>(BASE_FILE_MAGIC)?;
    Ok(())
}

/// Reads the footer, leaving the cursor at the end of the file.
pub(crate) fn read_footer<R: Read + Seek>(r: &mut R) -> io::Result<Footer> {
    let filesize = r.seek(SeekFrom::End(0))?;
    if filesize < FOOTER_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "file too small for base file footer",
        ));
    }
    r.seek(SeekFrom::End(-(FOOTER_BYTES as i64)))?;
    let record_count = r.read_u64::<LittleEndian>()?;
    let index_offset = r.read_u64::<LittleEndian>()?;
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != BASE_FILE_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown base file magic: {magic:#x}"),
        ));
    }
    Ok(Footer {
        record_count,
        index_offset,
    })
}
