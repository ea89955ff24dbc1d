//! Per-instance cache of open reader pairs.
//!
//! Keyed by `(partition, file_id)`. In reuse mode a pair is opened at most
//! once per key. Each key owns a slot: the map's shard lock is only held to
//! find or insert the slot, and the opener runs under the slot's own mutex,
//! so racing callers for the same key wait and then share the winner's pair
//! while lookups of other keys proceed. Without reuse every call opens a
//! private pair that the caller closes after use.
//!
//! Lock order is always shard, released, then slot. Nothing takes a shard
//! lock while holding a slot.

use anyhow::Result;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::pair::ReaderHandles;
use crate::stats::MetadataStats;

pub type PairKey = (String, String);

/// The cached pair of one key, empty until an open succeeds.
type Slot = Mutex<Option<Arc<ReaderPair>>>;

/// A reader pair shared between lookups. Closing is idempotent.
pub struct ReaderPair {
    key: PairKey,
    handles: Mutex<Option<ReaderHandles>>,
}

impl ReaderPair {
    fn new(key: PairKey, handles: ReaderHandles) -> Self {
        Self {
            key,
            handles: Mutex::new(Some(handles)),
        }
    }

    #[must_use]
    pub fn partition(&self) -> &str {
        &self.key.0
    }

    #[must_use]
    pub fn file_id(&self) -> &str {
        &self.key.1
    }

    /// Runs `f` on the open handles; `None` if the pair was already closed.
    pub fn with_handles<T>(&self, f: impl FnOnce(&mut ReaderHandles) -> T) -> Option<T> {
        let mut guard = self.handles.lock();
        guard.as_mut().map(f)
    }

    /// Drops the handles. Returns `true` only for the call that closed them.
    pub fn close(&self) -> bool {
        self.handles.lock().take().is_some()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handles.lock().is_none()
    }
}

pub struct ReaderCache {
    reuse: bool,
    pairs: DashMap<PairKey, Arc<Slot>>,
    stats: Arc<MetadataStats>,
}

impl ReaderCache {
    pub fn new(reuse: bool, stats: Arc<MetadataStats>) -> Self {
        Self {
            reuse,
            pairs: DashMap::new(),
            stats,
        }
    }

    #[must_use]
    pub fn reuse(&self) -> bool {
        self.reuse
    }

    /// Returns the pair for `(partition, file_id)`, opening it with `open`
    /// if needed. The flag is `true` when this call opened the pair.
    ///
    /// # Errors
    ///
    /// Whatever `open` returns. Nothing is cached on failure.
    pub fn get_or_open<F>(
        &self,
        partition: &str,
        file_id: &str,
        open: F,
    ) -> Result<(Arc<ReaderPair>, bool)>
    where
        F: FnOnce() -> Result<ReaderHandles>,
    {
        let key: PairKey = (partition.to_string(), file_id.to_string());
        if !self.reuse {
            let handles = open()?;
            self.stats.record_open(handles.open_ms);
            self.stats.record_blocks(handles.open_counts);
            return Ok((Arc::new(ReaderPair::new(key, handles)), true));
        }

        let slot = Arc::clone(self.pairs.entry(key.clone()).or_default().value());
        let mut guard = slot.lock();
        if let Some(pair) = guard.as_ref() {
            if !pair.is_closed() {
                return Ok((Arc::clone(pair), false));
            }
        }
        let handles = open()?;
        self.stats.record_open(handles.open_ms);
        self.stats.record_blocks(handles.open_counts);
        let pair = Arc::new(ReaderPair::new(key, handles));
        *guard = Some(Arc::clone(&pair));
        Ok((pair, true))
    }

    fn slot(&self, key: &PairKey) -> Option<Arc<Slot>> {
        self.pairs.get(key).map(|e| Arc::clone(e.value()))
    }

    /// Closes a pair handed out by [`get_or_open`](Self::get_or_open) and
    /// evicts it if it is the cached one.
    pub fn close(&self, pair: &ReaderPair) {
        if let Some(slot) = self.slot(&pair.key) {
            let mut guard = slot.lock();
            if guard
                .as_ref()
                .map_or(false, |cached| std::ptr::eq(cached.as_ref(), pair))
            {
                *guard = None;
            }
        }
        if pair.close() {
            self.stats.record_close();
        }
    }

    /// Evicts and closes the cached pair for `(partition, file_id)`, if any.
    pub fn close_key(&self, partition: &str, file_id: &str) {
        let key: PairKey = (partition.to_string(), file_id.to_string());
        let Some(slot) = self.slot(&key) else {
            return;
        };
        let taken = slot.lock().take();
        if let Some(pair) = taken {
            if pair.close() {
                self.stats.record_close();
            }
        }
    }

    /// Closes and evicts every cached pair. Safe to call repeatedly.
    pub fn close_all(&self) {
        let keys: Vec<PairKey> = self.pairs.iter().map(|e| e.key().clone()).collect();
        for (partition, file_id) in keys {
            self.close_key(&partition, &file_id);
        }
    }

    /// Number of cached pairs. Waits for opens in progress.
    #[must_use]
    pub fn len(&self) -> usize {
        let slots: Vec<Arc<Slot>> = self.pairs.iter().map(|e| Arc::clone(e.value())).collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ReaderCache {
    fn drop(&mut self) {
        self.close_all();
    }
}
