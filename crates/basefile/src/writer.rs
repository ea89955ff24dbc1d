use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use record::MetadataRecord;
use std::fs::{rename, OpenOptions};
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use crate::format::{write_footer, Footer};

/// Writes a sorted run of records to an immutable base file.
///
/// Stateless; all work happens in [`write`](BaseFileWriter::write). The file
/// is written to `<path>.tmp`, fsynced, then renamed into place so readers
/// never observe a partial base file.
pub struct BaseFileWriter {}

impl BaseFileWriter {
    /// Writes `records` to `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - destination, conventionally `<file_id>_<instant>.base`.
    /// * `records` - records in strictly ascending key order.
    ///
    /// # Errors
    ///
    /// Fails if keys are not strictly ascending, a record cannot be encoded,
    /// or on any I/O failure. An empty input produces a valid empty file.
    pub fn write<'a, I>(path: &Path, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a MetadataRecord>,
    {
        let tmp_path = path.with_extension("base.tmp");
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        let mut file = BufWriter::new(raw_file);

        let mut index: Vec<(&str, u64)> = Vec::new();
        let mut record_buf: Vec<u8> = Vec::with_capacity(256);

        for record in records {
            if let Some((prev, _)) = index.last() {
                if *prev >= record.key.as_str() {
                    drop(file);
                    let _ = std::fs::remove_file(&tmp_path);
                    bail!(
                        "base file keys must be strictly ascending: {:?} after {:?}",
                        record.key,
                        prev
                    );
                }
            }
            let value = record.encode()?;

            record_buf.clear();
            record_buf.write_u32::<LittleEndian>(record.key.len() as u32)?;
            record_buf.extend_from_slice(record.key.as_bytes());
            record_buf.write_u32::<LittleEndian>(value.len() as u32)?;
            record_buf.extend_from_slice(&value);

            let mut hasher = Crc32::new();
            hasher.update(&record_buf);
            let crc = hasher.finalize();

            let offset = file.stream_position()?;
            file.write_u32::<LittleEndian>(crc)?;
            file.write_all(&record_buf)?;
            index.push((record.key.as_str(), offset));
        }

        let index_offset = file.stream_position()?;
        for (key, data_offset) in &index {
            file.write_u32::<LittleEndian>(key.len() as u32)?;
            file.write_all(key.as_bytes())?;
            file.write_u64::<LittleEndian>(*data_offset)?;
        }
        write_footer(
            &mut file,
            Footer {
                record_count: index.len() as u64,
                index_offset,
            },
        )?;

        file.flush()?;
        file.into_inner()?.sync_all()?;
        rename(&tmp_path, path)?;

        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }
}
