//! Transport layer for the resolver.
//!
//! Provides the UDP and TCP listeners that receive client queries and the
//! [`Exchange`] seam used to talk to upstream nameservers.

pub mod tcp;
pub mod udp;

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;

use crate::error::ExchangeError;

/// Largest DNS message accepted over either transport.
pub const MAX_DNS_PACKET_SIZE: usize = 65535;

/// Transport protocol of a query, inbound or outbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Tcp,
    Udp,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Udp => "udp",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sends one query to one nameserver and returns its reply.
///
/// Implementations must bound the exchange by `timeout` and must reject
/// replies whose ID differs from the query's.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn exchange(
        &self,
        nameserver: SocketAddr,
        query: &Message,
        network: Network,
        timeout: Duration,
    ) -> Result<Message, ExchangeError>;
}

/// Exchanges over real sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct WireExchange;

#[async_trait]
impl Exchange for WireExchange {
    async fn exchange(
        &self,
        nameserver: SocketAddr,
        query: &Message,
        network: Network,
        timeout: Duration,
    ) -> Result<Message, ExchangeError> {
        let bytes = query.to_vec()?;

        let exchange = async {
            match network {
                Network::Udp => udp::exchange(nameserver, &bytes).await,
                Network::Tcp => tcp::exchange(nameserver, &bytes).await,
            }
        };

        let reply = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ExchangeError::Timeout {
                nameserver,
                timeout,
            })?
            .map_err(|source| ExchangeError::Io { nameserver, source })?;

        let reply = Message::from_vec(&reply)?;
        if reply.id() != query.id() {
            return Err(ExchangeError::IdMismatch {
                expected: query.id(),
                got: reply.id(),
            });
        }

        Ok(reply)
    }
}
