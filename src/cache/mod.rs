pub mod store;

pub use store::{CacheStore, PersistError};

use crate::protocol::{DomainName, RecordType, ResourceRecord};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Seconds a fetched entry is served from the cache before it is fetched again.
pub const DEFAULT_FRESHNESS_WINDOW: u32 = 360;

/// Everything learned about one domain from a single upstream reply.
///
/// Freshness is tracked per entry, not per record. The upstream TTLs are only echoed
/// back to clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub origin: DomainName,
    pub fetched_at: DateTime<Utc>,
    pub freshness_window: u32,
    pub records: HashMap<RecordType, Vec<ResourceRecord>>,
}

impl CacheEntry {
    /// Groups `answers` by type, keeping the order they were received in.
    pub fn new(
        origin: DomainName,
        fetched_at: DateTime<Utc>,
        freshness_window: u32,
        answers: Vec<ResourceRecord>,
    ) -> CacheEntry {
        let mut records: HashMap<RecordType, Vec<ResourceRecord>> = HashMap::new();
        for record in answers {
            records.entry(record.rtype()).or_default().push(record);
        }

        CacheEntry {
            origin,
            fetched_at,
            freshness_window,
            records,
        }
    }

    pub fn records(&self, rtype: RecordType) -> Option<&[ResourceRecord]> {
        self.records.get(&rtype).map(Vec::as_slice)
    }

    pub fn is_fresh(&self, rtype: RecordType, now: DateTime<Utc>) -> bool {
        self.records.contains_key(&rtype)
            && now.signed_duration_since(self.fetched_at)
                <= Duration::seconds(self.freshness_window.into())
    }
}

#[derive(Clone, Debug)]
pub enum Lookup {
    Fresh(Arc<CacheEntry>),
    Stale(Arc<CacheEntry>),
    Miss,
}

/// Cache of upstream answers, one entry per domain, optionally written through to disk.
pub struct RecordCache {
    entries: RwLock<HashMap<DomainName, Arc<CacheEntry>>>,
    // Serializes writes to the store
    persist_lock: Mutex<()>,
    store: Option<CacheStore>,
}

impl RecordCache {
    pub fn in_memory() -> RecordCache {
        RecordCache {
            entries: RwLock::new(HashMap::new()),
            persist_lock: Mutex::new(()),
            store: None,
        }
    }

    /// Creates a cache holding every entry found in `store`, writing new entries back to it.
    pub fn load(store: CacheStore) -> Result<RecordCache, PersistError> {
        // Two files can hold the same origin, keep the most recently fetched one
        let mut entries: HashMap<DomainName, Arc<CacheEntry>> = HashMap::new();
        for entry in store.load_all()? {
            match entries.get(&entry.origin) {
                Some(kept) if kept.fetched_at >= entry.fetched_at => {}
                _ => {
                    entries.insert(entry.origin.clone(), Arc::new(entry));
                }
            }
        }

        info!(count = entries.len(), dir = %store.dir().display(), "Loaded cache");

        Ok(RecordCache {
            entries: RwLock::new(entries),
            persist_lock: Mutex::new(()),
            store: Some(store),
        })
    }

    pub fn get(&self, domain: &DomainName, rtype: RecordType, now: DateTime<Utc>) -> Lookup {
        match self.entries.read().get(domain) {
            Some(entry) if entry.is_fresh(rtype, now) => Lookup::Fresh(Arc::clone(entry)),
            Some(entry) => Lookup::Stale(Arc::clone(entry)),
            None => Lookup::Miss,
        }
    }

    /// Replaces the whole entry for the entry's domain, then persists it on the blocking
    /// thread pool.
    ///
    /// Types cached earlier for the domain but absent from `entry` are dropped. The new
    /// entry is visible to lookups before it reaches disk, and a persistence failure is
    /// returned after the in-memory replacement has happened.
    pub async fn put(self: &Arc<Self>, entry: CacheEntry) -> Result<(), PersistError> {
        let origin = entry.origin.clone();
        self.entries.write().insert(origin.clone(), Arc::new(entry));

        if self.store.is_none() {
            return Ok(());
        }

        let cache = Arc::clone(self);
        tokio::task::spawn_blocking(move || cache.persist(&origin)).await?
    }

    // Saves whatever is current for `origin`, so racing puts leave the latest entry on disk
    fn persist(&self, origin: &DomainName) -> Result<(), PersistError> {
        let store = match &self.store {
            Some(store) => store,
            None => return Ok(()),
        };

        let _persisting = self.persist_lock.lock();
        let entry = self.entries.read().get(origin).cloned();
        match entry {
            Some(entry) => store.save(&entry),
            None => Ok(()),
        }
    }

    /// Writes every entry to the store. Stops at the first failure.
    pub fn flush(&self) -> Result<(), PersistError> {
        let store = match &self.store {
            Some(store) => store,
            None => return Ok(()),
        };

        let _persisting = self.persist_lock.lock();
        let entries: Vec<Arc<CacheEntry>> = self.entries.read().values().cloned().collect();
        for entry in &entries {
            store.save(entry)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
