//! Memory-bounded key/value map for merged-scan state.
//!
//! ```text
//!  insert ──► ┌───────────────────────┐  over budget  ┌──────────────────────┐
//!             │ LruCache (in memory)  │ ────────────► │ DiskMap (spill file) │
//!  get    ◄── │ byte-accounted        │ ◄──────────── │ append-only frames   │
//!             └───────────────────────┘   read-back   └──────────────────────┘
//! ```
//!
//! The eviction order is pluggable ([`OverflowPolicy`]) and independent of
//! merge semantics: a value is either in memory or on disk, never both, and
//! reads return the same value regardless of where it lives.

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use config::OverflowPolicy;
use crc32fast::Hasher as Crc32;
use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Bytes charged per entry on top of its serialized size.
const ENTRY_OVERHEAD: u64 = 64;

/// Append-only spill file with an in-memory offset index.
///
/// Frames are `[len: u32][crc32: u32][bincode value]`. Overwritten or removed
/// values leave dead frames behind; the file is unnamed and vanishes when the
/// map is dropped.
struct DiskMap {
    file: File,
    end: u64,
    index: HashMap<String, (u64, u32)>,
    buf: Vec<u8>,
}

impl DiskMap {
    fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating spill dir {}", dir.display()))?;
        let file = tempfile::tempfile_in(dir)
            .with_context(|| format!("creating spill file in {}", dir.display()))?;
        Ok(Self {
            file,
            end: 0,
            index: HashMap::new(),
            buf: Vec::with_capacity(1024),
        })
    }

    fn put<V: Serialize>(&mut self, key: String, value: &V) -> Result<()> {
        let body = bincode::serialize(value)?;
        let len = u32::try_from(body.len()).context("spilled value exceeds u32::MAX bytes")?;
        let mut hasher = Crc32::new();
        hasher.update(&body);

        self.buf.clear();
        self.buf.write_u32::<LittleEndian>(len)?;
        self.buf.write_u32::<LittleEndian>(hasher.finalize())?;
        self.buf.extend_from_slice(&body);

        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&self.buf)?;
        self.index.insert(key, (self.end, len));
        self.end += self.buf.len() as u64;
        Ok(())
    }

    fn get<V: DeserializeOwned>(&mut self, key: &str) -> Result<Option<V>> {
        let Some(&(offset, len)) = self.index.get(key) else {
            return Ok(None);
        };
        self.file.seek(SeekFrom::Start(offset))?;
        let stored_len = self.file.read_u32::<LittleEndian>()?;
        let stored_crc = self.file.read_u32::<LittleEndian>()?;
        if stored_len != len {
            bail!("spill index out of sync for {key:?}");
        }
        self.buf.clear();
        self.buf.resize(len as usize, 0);
        self.file.read_exact(&mut self.buf)?;
        let mut hasher = Crc32::new();
        hasher.update(&self.buf);
        if hasher.finalize() != stored_crc {
            bail!("spill frame for {key:?} failed its checksum");
        }
        Ok(Some(bincode::deserialize(&self.buf)?))
    }

    fn remove<V: DeserializeOwned>(&mut self, key: &str) -> Result<Option<V>> {
        let value = self.get(key)?;
        self.index.remove(key);
        Ok(value)
    }

    fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }
}

/// A string-keyed map that keeps at most `max_memory_bytes` of values in
/// memory and spills the rest to disk.
pub struct SpillableMap<V> {
    policy: OverflowPolicy,
    max_memory_bytes: u64,
    spill_dir: PathBuf,
    memory: LruCache<String, (V, u64)>,
    memory_bytes: u64,
    disk: Option<DiskMap>,
}

impl<V> SpillableMap<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    pub fn new(max_memory_bytes: u64, spill_dir: impl Into<PathBuf>, policy: OverflowPolicy) -> Self {
        Self {
            policy,
            max_memory_bytes,
            spill_dir: spill_dir.into(),
            memory: LruCache::unbounded(),
            memory_bytes: 0,
            disk: None,
        }
    }

    /// Returns a copy of the value for `key`.
    ///
    /// Under [`OverflowPolicy::Lru`] a hit refreshes the entry's recency;
    /// under [`OverflowPolicy::InsertionOrder`] reads never reorder.
    pub fn get(&mut self, key: &str) -> Result<Option<V>> {
        let hit = match self.policy {
            OverflowPolicy::Lru => self.memory.get(key),
            OverflowPolicy::InsertionOrder => self.memory.peek(key),
        };
        if let Some((value, _)) = hit {
            return Ok(Some(value.clone()));
        }
        match self.disk.as_mut() {
            Some(disk) => disk.get(key),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.memory.contains(key) || self.disk.as_ref().map_or(false, |d| d.contains(key))
    }

    /// Inserts or replaces the value for `key`, spilling the coldest entries
    /// if the memory budget is exceeded.
    pub fn insert(&mut self, key: String, value: V) -> Result<()> {
        if let Some(disk) = self.disk.as_mut() {
            disk.index.remove(&key);
        }
        let size = bincode::serialized_size(&value)? + key.len() as u64 + ENTRY_OVERHEAD;

        let replaced = match self.policy {
            OverflowPolicy::Lru => self.memory.put(key, (value, size)).map(|(_, s)| s),
            OverflowPolicy::InsertionOrder => match self.memory.peek_mut(&key) {
                Some(slot) => Some(std::mem::replace(slot, (value, size)).1),
                None => {
                    self.memory.put(key, (value, size));
                    None
                }
            },
        };
        self.memory_bytes = self.memory_bytes + size - replaced.unwrap_or(0);
        self.evict_over_budget()
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&mut self, key: &str) -> Result<Option<V>> {
        if let Some((value, size)) = self.memory.pop(key) {
            self.memory_bytes -= size;
            return Ok(Some(value));
        }
        match self.disk.as_mut() {
            Some(disk) => disk.remove(key),
            None => Ok(None),
        }
    }

    /// Drops `key` without reading its value back. Never touches the disk.
    pub fn discard(&mut self, key: &str) {
        if let Some((_, size)) = self.memory.pop(key) {
            self.memory_bytes -= size;
        }
        if let Some(disk) = self.disk.as_mut() {
            disk.index.remove(key);
        }
    }

    /// Moves the coldest entries to disk until the budget holds. An entry
    /// leaves memory only after it is on disk, so a failed spill loses
    /// nothing.
    fn evict_over_budget(&mut self) -> Result<()> {
        while self.memory_bytes > self.max_memory_bytes && !self.memory.is_empty() {
            if self.disk.is_none() {
                tracing::debug!(
                    dir = %self.spill_dir.display(),
                    budget = self.max_memory_bytes,
                    "merged scan state exceeded memory budget, spilling to disk"
                );
                self.disk = Some(DiskMap::create(&self.spill_dir)?);
            }
            let (Some(disk), Some((key, (value, _)))) = (self.disk.as_mut(), self.memory.peek_lru())
            else {
                break;
            };
            disk.put(key.clone(), value)?;
            if let Some((_, (_, size))) = self.memory.pop_lru() {
                self.memory_bytes -= size;
            }
        }
        Ok(())
    }

    /// Every key, in memory and on disk, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.memory.iter().map(|(k, _)| k.clone()).collect();
        if let Some(disk) = &self.disk {
            keys.extend(disk.index.keys().cloned());
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.memory.len() + self.disk.as_ref().map_or(0, |d| d.index.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `key` currently lives in memory.
    pub fn in_memory(&self, key: &str) -> bool {
        self.memory.contains(key)
    }

    /// Entries currently held on disk.
    pub fn spilled_len(&self) -> usize {
        self.disk.as_ref().map_or(0, |d| d.index.len())
    }

    pub fn memory_bytes(&self) -> u64 {
        self.memory_bytes
    }
}
