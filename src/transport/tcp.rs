//! TCP transport for DNS queries.
//!
//! TCP DNS messages are prefixed with a 2-byte big-endian length. A client
//! connection may carry several queries; each is answered in order until
//! the client closes or stays idle past [`IDLE_TIMEOUT`].

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Network;
use crate::error::ReplyError;
use crate::handler::QueryHandler;

/// How long an open client connection may wait for its next query.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP listener for the resolver.
///
/// Each connection is handled in a separate task.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind a TCP listener for the transport.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Start the accept loop.
    pub fn start(self, handler: Arc<QueryHandler>) -> JoinHandle<()> {
        tokio::spawn(run_accept_loop(self.listener, handler))
    }
}

/// Accept loop - spawns a handler task for each incoming connection.
async fn run_accept_loop(listener: TcpListener, handler: Arc<QueryHandler>) {
    loop {
        match listener.accept().await {
            Ok((client, peer)) => {
                tokio::spawn(handle_connection(client, peer, handler.clone()));
            }
            Err(e) => {
                warn!("TCP accept error: {}", e);
            }
        }
    }
}

/// Serve queries on one connection until EOF, idle timeout or a write failure.
async fn handle_connection(mut client: TcpStream, peer: SocketAddr, handler: Arc<QueryHandler>) {
    loop {
        let frame = match tokio::time::timeout(IDLE_TIMEOUT, read_dns_message(&mut client)).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => return,
            Ok(Err(e)) => {
                debug!(client = %peer, "TCP read error: {}", e);
                return;
            }
            Err(_) => return,
        };

        let query = match Message::from_vec(&frame) {
            Ok(m) => m,
            Err(e) => {
                debug!(client = %peer, "dropping malformed query: {}", e);
                return;
            }
        };

        let reply = handler.handle(query, peer.ip(), Network::Tcp).await;
        if let Err(e) = write_reply(&mut client, &reply).await {
            warn!(client = %peer, "TCP reply error: {}", e);
            return;
        }
    }
}

async fn write_reply(stream: &mut TcpStream, reply: &Message) -> Result<(), ReplyError> {
    let bytes = reply.to_vec()?;
    write_dns_message(stream, &bytes).await
}

/// Read one length-prefixed DNS message, returning it without the prefix.
async fn read_dns_message(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let len = stream.read_u16().await? as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;

    Ok(buf)
}

async fn write_dns_message(stream: &mut TcpStream, message: &[u8]) -> Result<(), ReplyError> {
    let len = u16::try_from(message.len()).map_err(|_| ReplyError::TooLarge(message.len()))?;
    let mut frame = Vec::with_capacity(message.len() + 2);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(message);
    stream.write_all(&frame).await?;

    Ok(())
}

/// Send one query to `nameserver` over TCP and return its reply.
pub(crate) async fn exchange(nameserver: SocketAddr, query: &[u8]) -> io::Result<Vec<u8>> {
    let mut upstream = TcpStream::connect(nameserver).await?;

    write_dns_message(&mut upstream, query)
        .await
        .map_err(|e| match e {
            ReplyError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidInput, other.to_string()),
        })?;

    read_dns_message(&mut upstream).await
}
