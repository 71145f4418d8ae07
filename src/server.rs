use crate::protocol::*;
use crate::resolver::{ResolveError, Resolver};
use crate::response::build_response;
use std::{io, net::SocketAddr, sync::Arc};
use tokio::{net::UdpSocket, sync::Semaphore};
use tracing::{info, info_span, trace, warn, Instrument};

pub struct Server<R>(Arc<Inner<R>>);

impl<R> Server<R>
where
    R: Resolver + Send + Sync + 'static,
{
    /// Serves queries arriving on `socket`, handling at most `max_inflight` at once.
    pub fn new(socket: UdpSocket, resolver: R, max_inflight: usize) -> Server<R> {
        Server(Arc::new(Inner {
            socket,
            resolver,
            permits: Arc::new(Semaphore::new(max_inflight)),
        }))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.socket.local_addr()
    }

    pub async fn run(&self) -> io::Result<()> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            let (size, origin) = self.0.socket.recv_from(&mut buf).await?;
            let bytes = buf[0..size].to_vec();
            trace!(?bytes, %origin, "Received datagram");

            let permit = match Arc::clone(&self.0.permits).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(%origin, "Too many queries in flight, dropping datagram");
                    continue;
                }
            };

            let inner = Arc::clone(&self.0);
            tokio::spawn(
                async move {
                    inner.handle_request(&bytes, origin).await;
                    drop(permit);
                }
                .instrument(info_span!("query", %origin)),
            );
        }
    }
}

struct Inner<R> {
    socket: UdpSocket,
    resolver: R,
    permits: Arc<Semaphore>,
}

impl<R> Inner<R>
where
    R: Resolver,
{
    async fn handle_request(&self, request: &[u8], origin: SocketAddr) {
        let reply = match answer(&self.resolver, request).await {
            Some(reply) => reply,
            None => return,
        };

        trace!(bytes = ?reply, "Send response");
        if let Err(err) = self.socket.send_to(&reply, origin).await {
            warn!(%err, "Error sending response");
        }
    }
}

/// Produces the reply datagram for one query, or `None` when the client gets no reply.
///
/// Malformed datagrams and failed resolutions go unanswered. A query for a type other
/// than A or NS is answered with an empty datagram.
pub async fn answer<R: Resolver + ?Sized>(resolver: &R, request: &[u8]) -> Option<Vec<u8>> {
    let query = match decode_query(request) {
        Ok(query) => query,
        Err(err) => {
            info!(%err, "Error parsing query");
            return None;
        }
    };

    info!(domain = %query.domain, qtype = %query.qtype, "Query");

    match resolver.resolve(&query.domain, query.qtype).await {
        Ok(records) => {
            for record in &records {
                info!(domain = %query.domain, ttl = record.ttl, value = %record.data.to_text(), "Answer");
            }
            match build_response(&query, &records) {
                Ok(reply) => Some(reply),
                Err(err) => {
                    warn!(%err, "Error encoding response");
                    None
                }
            }
        }
        Err(ResolveError::UnsupportedType(rtype)) => {
            info!(%rtype, "Unsupported query type, sending empty reply");
            Some(Vec::new())
        }
        Err(err) => {
            warn!(domain = %query.domain, %err, "Error resolving query");
            None
        }
    }
}
