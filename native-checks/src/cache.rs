//! Name → handler cache with staleness tracking.
//!
//! Lookups are lock-free on hit. Filling a miss and evicting both happen
//! under one mutex, so a name is loaded at most once per generation even
//! when many workers miss on it at the same moment.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::errors::LoadError;
use crate::handler::HandlerEntry;
use crate::loader::HandlerLoader;

pub struct HandlerCache {
    loader: Arc<dyn HandlerLoader>,
    entries: DashMap<String, Arc<HandlerEntry>>,
    /// Serializes load+insert, eviction and staleness scans
    fill_lock: Mutex<()>,
}

impl HandlerCache {
    pub fn new(loader: Arc<dyn HandlerLoader>) -> Self {
        Self {
            loader,
            entries: DashMap::new(),
            fill_lock: Mutex::new(()),
        }
    }

    /// Get the handler for `name`, loading it on first use.
    ///
    /// A failed load leaves nothing behind; the next call retries.
    pub fn resolve(&self, name: &str) -> Result<Arc<HandlerEntry>, LoadError> {
        if let Some(entry) = self.entries.get(name) {
            return Ok(Arc::clone(&entry));
        }

        let _guard = self.fill_lock.lock();

        // Another worker may have filled it while we waited
        if let Some(entry) = self.entries.get(name) {
            return Ok(Arc::clone(&entry));
        }

        let entry = Arc::new(self.loader.load(name)?);
        self.entries.insert(name.to_string(), Arc::clone(&entry));
        debug!("Cached handler '{}'", name);
        Ok(entry)
    }

    /// Names whose backing script changed since they were loaded.
    ///
    /// Does not modify the cache.
    pub fn scan_stale(&self) -> BTreeSet<String> {
        let _guard = self.fill_lock.lock();
        self.entries
            .iter()
            .filter(|entry| entry.value().is_stale())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Drop the listed entries. Executions already holding one keep it.
    ///
    /// Returns how many entries were actually removed.
    pub fn evict<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> usize {
        let _guard = self.fill_lock.lock();
        names
            .into_iter()
            .filter(|name| self.entries.remove(name.as_str()).is_some())
            .count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for HandlerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerCache")
            .field("names", &self.names())
            .finish()
    }
}
