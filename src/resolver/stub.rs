use crate::{protocol::*, resolver::*};
use async_trait::async_trait;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Forwards each query to a fixed upstream server over a fresh datagram socket.
///
/// There is no deadline here, an upstream that never replies leaves `forward` pending.
/// Wrap in `Timeout` to bound it.
pub struct UdpForwarder {
    target: SocketAddr,
}

impl UdpForwarder {
    pub fn new<A: ToSocketAddrs>(target: A) -> io::Result<UdpForwarder> {
        let target = target.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "no addresses to send data to")
        })?;

        Ok(UdpForwarder { target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    async fn connect(&self) -> io::Result<UdpSocket> {
        let local = if self.target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local).await?;
        // Connected sockets only deliver datagrams sent from the target
        socket.connect(self.target).await?;
        Ok(socket)
    }
}

#[async_trait]
impl Forwarder for UdpForwarder {
    async fn forward(
        &self,
        domain: &DomainName,
        rtype: RecordType,
    ) -> Result<Vec<ResourceRecord>, ResolveError> {
        let request = encode_query(domain, rtype)?;
        let socket = self.connect().await?;

        trace!(?request, target = ?self.target, "Sending query");
        socket.send(&request).await?;

        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            let size = socket.recv(&mut buf).await?;
            let bytes = &buf[0..size];

            let header = match Header::read_from(&mut io::Cursor::new(bytes)) {
                Ok(header) => header,
                Err(err) => {
                    debug!(%err, size, "Ignoring runt datagram");
                    continue;
                }
            };
            if header.id != UPSTREAM_QUERY_ID || !header.flags.qr() {
                debug!(id = header.id, "Ignoring unsolicited datagram");
                continue;
            }

            trace!(?bytes, "Received reply");
            let records = decode_answer(bytes, header.answer_count)?;
            debug!(
                %domain,
                %rtype,
                rcode = header.flags.rcode(),
                answers = records.len(),
                "Upstream replied"
            );
            return Ok(records);
        }
    }
}
