use crate::{protocol::*, resolver::*};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Forwarder that repeats timed out or failed round trips, backing off exponentially
/// with random jitter between attempts. Other failures are returned immediately.
pub struct Retry<F> {
    inner: F,
    attempts: u32,
    backoff: Duration,
}

impl<F> Retry<F> {
    pub fn new(forwarder: F, attempts: u32, backoff: Duration) -> Self {
        Self {
            inner: forwarder,
            attempts: attempts.max(1),
            backoff,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.saturating_mul(1 << (attempt - 1).min(16));
        let max_jitter = u64::try_from(base.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = rand::thread_rng().gen_range(0..=max_jitter);
        base + Duration::from_millis(jitter)
    }
}

#[async_trait]
impl<F: Forwarder + Send + Sync> Forwarder for Retry<F> {
    async fn forward(
        &self,
        domain: &DomainName,
        rtype: RecordType,
    ) -> Result<Vec<ResourceRecord>, ResolveError> {
        let mut attempt = 1;
        loop {
            match self.inner.forward(domain, rtype).await {
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    let delay = self.delay(attempt);
                    debug!(%domain, %rtype, attempt, ?delay, %err, "Retrying upstream query");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
