pub mod caching;
pub mod retry;
pub mod stub;
pub mod timeout;

use crate::protocol::{DomainName, RecordType, ResourceRecord, WireError};
use async_trait::async_trait;
use std::{io, sync::Arc, time::Duration};
use thiserror::Error;

/// A resolver takes queries and answers them. From the caller's perspective how the
/// answer was found is not relevant, only the returned records matter.
///
/// The resolver in this crate forwards requests with a look-aside cache:
///
/// ```text
///               Local                        |  Remote
///                                            |
///  +--------+           +----------+         |  +--------+
///  |        |  queries  |          | queries |  |        |
///  | Caller |---------->|          |---------|->| Remote |
///  |        |           | Resolver |         |  |  Name  |
///  |        |<----------|          |<--------|--| Server |
///  |        |  records  |          | replies |  |        |
///  +--------+           +----------+         |  +--------+
///                         |     A            |
///             cache puts  |     | lookups    |
///                         V     |            |
///                       +----------+         |
///                       |  cache   |---> disk
///                       +----------+         |
/// ```
#[async_trait]
pub trait Resolver {
    async fn resolve(
        &self,
        domain: &DomainName,
        rtype: RecordType,
    ) -> Result<Vec<ResourceRecord>, ResolveError>;
}

/// One round trip to an upstream server, returning every answer record it decoded.
#[async_trait]
pub trait Forwarder {
    async fn forward(
        &self,
        domain: &DomainName,
        rtype: RecordType,
    ) -> Result<Vec<ResourceRecord>, ResolveError>;
}

#[async_trait]
impl<F: Forwarder + Send + Sync + ?Sized> Forwarder for Arc<F> {
    #[inline]
    async fn forward(
        &self,
        domain: &DomainName,
        rtype: RecordType,
    ) -> Result<Vec<ResourceRecord>, ResolveError> {
        self.as_ref().forward(domain, rtype).await
    }
}

// Cloneable so a single upstream outcome can be handed to every waiting query
#[derive(Clone, Debug, Error)]
pub enum ResolveError {
    #[error("unsupported query type {0}")]
    UnsupportedType(RecordType),
    #[error("upstream did not reply within {0:?}")]
    UpstreamTimeout(Duration),
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(#[source] Arc<io::Error>),
    #[error("malformed upstream reply: {0}")]
    Malformed(#[from] WireError),
    #[error("upstream answer for {domain} has no {rtype} records")]
    EmptyAnswer {
        domain: DomainName,
        rtype: RecordType,
    },
    #[error("query dropped")]
    Dropped,
}

impl From<io::Error> for ResolveError {
    fn from(err: io::Error) -> Self {
        ResolveError::UpstreamUnreachable(Arc::new(err))
    }
}

impl ResolveError {
    /// Whether trying the upstream again could produce a different outcome.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ResolveError::UpstreamTimeout(_) | ResolveError::UpstreamUnreachable(_)
        )
    }
}
