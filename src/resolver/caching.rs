use crate::{cache::*, protocol::*, resolver::*};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

type Outcome = Result<Vec<ResourceRecord>, ResolveError>;

type InflightKey = (DomainName, RecordType);

/// Resolver that answers from the record cache while entries are fresh and forwards
/// upstream otherwise, replacing the domain's cache entry with what came back.
///
/// Concurrent misses for the same domain and type share a single upstream round trip.
/// The round trip runs on its own task, so it still completes and fills the cache when
/// every query waiting on it has gone away.
pub struct CachingResolver<F>(Arc<Inner<F>>);

struct Inner<F> {
    cache: Arc<RecordCache>,
    forwarder: F,
    freshness_window: u32,
    inflight: Mutex<HashMap<InflightKey, watch::Receiver<Option<Outcome>>>>,
}

impl<F> Clone for CachingResolver<F> {
    fn clone(&self) -> Self {
        CachingResolver(Arc::clone(&self.0))
    }
}

impl<F> CachingResolver<F>
where
    F: Forwarder + Send + Sync + 'static,
{
    pub fn new(cache: Arc<RecordCache>, forwarder: F, freshness_window: u32) -> Self {
        CachingResolver(Arc::new(Inner {
            cache,
            forwarder,
            freshness_window,
            inflight: Mutex::new(HashMap::new()),
        }))
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.0.cache
    }
}

#[async_trait]
impl<F> Resolver for CachingResolver<F>
where
    F: Forwarder + Send + Sync + 'static,
{
    async fn resolve(&self, domain: &DomainName, rtype: RecordType) -> Outcome {
        if !rtype.is_supported() {
            return Err(ResolveError::UnsupportedType(rtype));
        }

        match self.0.cache.get(domain, rtype, Utc::now()) {
            Lookup::Fresh(entry) => {
                info!(%domain, %rtype, "Cached response");
                return Ok(entry.records(rtype).map(<[_]>::to_vec).unwrap_or_default());
            }
            Lookup::Stale(_) => info!(%domain, %rtype, "Cache entry is stale"),
            Lookup::Miss => info!(%domain, %rtype, "Cache miss"),
        }

        let receiver = Inner::join_or_forward(&self.0, domain, rtype);
        wait_for_outcome(receiver).await
    }
}

impl<F> Inner<F>
where
    F: Forwarder + Send + Sync + 'static,
{
    /// Subscribes to the in-flight forward for `domain` and `rtype`, starting one if
    /// there is none.
    fn join_or_forward(
        self: &Arc<Self>,
        domain: &DomainName,
        rtype: RecordType,
    ) -> watch::Receiver<Option<Outcome>> {
        let key = (domain.clone(), rtype);

        let mut inflight = self.inflight.lock();
        if let Some(receiver) = inflight.get(&key) {
            return receiver.clone();
        }

        // A forward may have finished and filled the cache since the caller's lookup
        if let Lookup::Fresh(entry) = self.cache.get(domain, rtype, Utc::now()) {
            let records = entry.records(rtype).map(<[_]>::to_vec).unwrap_or_default();
            let (_, receiver) = watch::channel(Some(Ok(records)));
            return receiver;
        }

        let (sender, receiver) = watch::channel(None);
        inflight.insert(key.clone(), receiver.clone());
        drop(inflight);

        let guard = InflightGuard {
            inner: Arc::clone(self),
            key,
        };
        tokio::spawn(async move {
            let (domain, rtype) = &guard.key;
            let outcome = guard.inner.forward(domain, *rtype).await;
            drop(guard);
            // Nobody may be waiting anymore, the cache was still updated
            let _ = sender.send(Some(outcome));
        });

        receiver
    }

    async fn forward(&self, domain: &DomainName, rtype: RecordType) -> Outcome {
        let answers = self.forwarder.forward(domain, rtype).await?;

        let entry = CacheEntry::new(domain.clone(), Utc::now(), self.freshness_window, answers);
        let records = entry.records(rtype).map(<[_]>::to_vec);

        if let Err(err) = self.cache.put(entry).await {
            warn!(%domain, %err, "Failed to persist cache entry");
        }

        records.ok_or_else(|| ResolveError::EmptyAnswer {
            domain: domain.clone(),
            rtype,
        })
    }
}

// Clears the in-flight slot when the forward finishes, even by panicking
struct InflightGuard<F> {
    inner: Arc<Inner<F>>,
    key: InflightKey,
}

impl<F> Drop for InflightGuard<F> {
    fn drop(&mut self) {
        self.inner.inflight.lock().remove(&self.key);
    }
}

async fn wait_for_outcome(mut receiver: watch::Receiver<Option<Outcome>>) -> Outcome {
    loop {
        let current = receiver.borrow().clone();
        if let Some(outcome) = current {
            return outcome;
        }
        if receiver.changed().await.is_err() {
            return Err(ResolveError::Dropped);
        }
    }
}
