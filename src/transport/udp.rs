//! UDP transport for DNS queries.
//!
//! The listener spawns one task per datagram; the task runs the query
//! handler and sends the reply straight back to the source address.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use hickory_proto::op::Message;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{MAX_DNS_PACKET_SIZE, Network};
use crate::error::ReplyError;
use crate::handler::QueryHandler;

/// Size of a DNS header; anything shorter is dropped.
const HEADER_LEN: usize = 12;

/// UDP listener for the resolver.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the receive loop.
    pub fn start(self, handler: Arc<QueryHandler>) -> JoinHandle<()> {
        tokio::spawn(run(self.socket, handler))
    }
}

async fn run(socket: Arc<UdpSocket>, handler: Arc<QueryHandler>) {
    let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!("UDP recv error: {}", e);
                continue;
            }
        };

        if len < HEADER_LEN {
            continue;
        }

        let query = match Message::from_vec(&buf[..len]) {
            Ok(m) => m,
            Err(e) => {
                debug!(client = %src, "dropping malformed query: {}", e);
                continue;
            }
        };

        let socket = socket.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            let reply = handler.handle(query, src.ip(), Network::Udp).await;
            if let Err(e) = send_reply(&socket, &reply, src).await {
                warn!(client = %src, "UDP reply error: {}", e);
            }
        });
    }
}

async fn send_reply(socket: &UdpSocket, reply: &Message, dest: SocketAddr) -> Result<(), ReplyError> {
    let bytes = reply.to_vec()?;
    socket.send_to(&bytes, dest).await?;
    Ok(())
}

/// Send one query to `nameserver` over UDP and wait for a datagram from it.
pub(crate) async fn exchange(nameserver: SocketAddr, query: &[u8]) -> io::Result<Vec<u8>> {
    let local: SocketAddr = match nameserver {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(nameserver).await?;
    socket.send(query).await?;

    let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];
    let len = socket.recv(&mut buf).await?;
    buf.truncate(len);

    Ok(buf)
}
