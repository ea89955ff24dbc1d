use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use record::MetadataRecord;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::format::{read_footer, FOOTER_BYTES};

/// Maximum key size we'll allocate during reads (64 KiB).
const MAX_KEY_BYTES: usize = 64 * 1024;
/// Maximum encoded record size we'll allocate during reads (64 MiB).
const MAX_VALUE_BYTES: usize = 64 * 1024 * 1024;

/// Reads a base file for key and key-prefix lookups.
///
/// [`open`](BaseFileReader::open) loads the whole index into a
/// `BTreeMap<String, u64>` (key -> data offset). Prefix lookups are range
/// scans over that map, so only matching records touch the disk.
///
/// One file handle is kept for the reader's lifetime behind a `Mutex`, so
/// lookups work through `&self`.
pub struct BaseFileReader {
    path: PathBuf,
    index: BTreeMap<String, u64>,
    file: Mutex<BufReader<File>>,
}

impl BaseFileReader {
    /// Opens a base file and loads its index.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is too small, the magic is wrong, the
    /// index offset lies outside the file, or on I/O failure.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut f =
            File::open(&path).with_context(|| format!("opening base file {}", path.display()))?;
        let filesize = f.metadata()?.len();

        let footer = read_footer(&mut f)
            .with_context(|| format!("reading footer of {}", path.display()))?;
        let index_end = filesize - FOOTER_BYTES;
        if footer.index_offset > index_end {
            bail!("invalid index_offset in {}", path.display());
        }

        f.seek(SeekFrom::Start(footer.index_offset))?;
        let mut rdr = BufReader::new(f);
        let mut index = BTreeMap::new();
        let mut pos = footer.index_offset;
        while pos < index_end {
            let key_len = rdr.read_u32::<LittleEndian>()? as usize;
            if key_len > MAX_KEY_BYTES {
                bail!("corrupt index: key_len {key_len} exceeds maximum {MAX_KEY_BYTES}");
            }
            let mut key = vec![0u8; key_len];
            rdr.read_exact(&mut key)?;
            let data_offset = rdr.read_u64::<LittleEndian>()?;
            index.insert(String::from_utf8(key)?, data_offset);
            pos += 4 + key_len as u64 + 8;
        }
        if index.len() as u64 != footer.record_count {
            bail!(
                "corrupt index: {} entries, footer says {}",
                index.len(),
                footer.record_count
            );
        }

        rdr.seek(SeekFrom::Start(0))?;
        Ok(Self {
            path,
            index,
            file: Mutex::new(rdr),
        })
    }

    /// Point lookup for a single key.
    pub fn get(&self, key: &str) -> Result<Option<MetadataRecord>> {
        match self.index.get(key) {
            Some(&offset) => self.read_at(key, offset).map(Some),
            None => Ok(None),
        }
    }

    /// Looks up every key in `keys`, returning the records that exist in
    /// ascending key order. Missing keys are simply absent from the output.
    pub fn get_records_by_keys(&self, keys: &[String]) -> Result<Vec<MetadataRecord>> {
        let wanted: BTreeSet<&str> = keys.iter().map(String::as_str).collect();
        let mut out = Vec::with_capacity(wanted.len());
        for key in wanted {
            if let Some(record) = self.get(key)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Returns every record whose key starts with one of `prefixes`, once
    /// each, in ascending key order.
    pub fn get_records_by_key_prefixes(&self, prefixes: &[String]) -> Result<Vec<MetadataRecord>> {
        let mut matched: BTreeMap<&str, u64> = BTreeMap::new();
        for prefix in prefixes {
            for (key, offset) in self.prefix_range(prefix) {
                matched.insert(key, offset);
            }
        }
        matched
            .into_iter()
            .map(|(key, offset)| self.read_at(key, offset))
            .collect()
    }

    fn prefix_range<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, u64)> + 'a {
        self.index
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(k, &o)| (k.as_str(), o))
    }

    fn read_at(&self, key: &str, offset: u64) -> Result<MetadataRecord> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
        f.seek(SeekFrom::Start(offset))?;

        let stored_crc = f.read_u32::<LittleEndian>()?;
        let key_len = f.read_u32::<LittleEndian>()? as usize;
        if key_len > MAX_KEY_BYTES {
            bail!("corrupt data: key_len {key_len} exceeds maximum {MAX_KEY_BYTES}");
        }
        let mut key_buf = vec![0u8; key_len];
        f.read_exact(&mut key_buf)?;
        if key_buf != key.as_bytes() {
            bail!("index pointed to mismatching key at offset {offset}");
        }
        let val_len = f.read_u32::<LittleEndian>()? as usize;
        if val_len > MAX_VALUE_BYTES {
            bail!("corrupt data: val_len {val_len} exceeds maximum {MAX_VALUE_BYTES}");
        }
        let mut val = vec![0u8; val_len];
        f.read_exact(&mut val)?;

        let mut hasher = Crc32::new();
        hasher.update(&(key_len as u32).to_le_bytes());
        hasher.update(&key_buf);
        hasher.update(&(val_len as u32).to_le_bytes());
        hasher.update(&val);
        let actual_crc = hasher.finalize();
        if actual_crc != stored_crc {
            bail!(
                "CRC32 mismatch at offset {}: expected {:#010x}, got {:#010x} (data corruption)",
                offset,
                stored_crc,
                actual_crc
            );
        }

        MetadataRecord::decode(&val)
            .with_context(|| format!("decoding record {key:?} in {}", self.path.display()))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }
}
