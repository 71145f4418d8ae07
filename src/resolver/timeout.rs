use crate::{protocol::*, resolver::*};
use async_trait::async_trait;
use std::time::Duration;

/// Forwarder that gives up on the inner forwarder after a fixed deadline
pub struct Timeout<F> {
    inner: F,
    timeout: Duration,
}

impl<F> Timeout<F> {
    pub fn new(forwarder: F, timeout: Duration) -> Self {
        Self {
            inner: forwarder,
            timeout,
        }
    }
}

#[async_trait]
impl<F: Forwarder + Send + Sync> Forwarder for Timeout<F> {
    async fn forward(
        &self,
        domain: &DomainName,
        rtype: RecordType,
    ) -> Result<Vec<ResourceRecord>, ResolveError> {
        tokio::time::timeout(self.timeout, self.inner.forward(domain, rtype))
            .await
            .map_err(|_| ResolveError::UpstreamTimeout(self.timeout))?
    }
}
