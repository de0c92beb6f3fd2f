//! Detection of tampered answers.
//!
//! A hijacking resolver answers lookups for names it wants to censor with a
//! small pool of bogus addresses. Those addresses are collected here, seeded
//! from configuration and extended by periodically asking the hijacked path
//! for a random name that cannot exist: any address it returns is fake.

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, Query};
use hickory_proto::rr::{Name, RecordType};
use rustc_hash::FxHashSet;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dns::a_records;
use crate::error::ExchangeError;
use crate::transport::{Exchange, Network};

/// Suffix of the random names used for probing.
const PROBE_SUFFIX: &str = "-1.googlevideo.com.";

/// Set of IPv4 addresses known to come from a tampering resolver.
///
/// Grows monotonically; nothing is ever removed.
pub struct FakeIpGuard {
    ips: RwLock<FxHashSet<Ipv4Addr>>,
}

impl FakeIpGuard {
    pub fn new<I: IntoIterator<Item = Ipv4Addr>>(seed: I) -> Self {
        Self {
            ips: RwLock::new(seed.into_iter().collect()),
        }
    }

    pub fn is_fake(&self, ip: Ipv4Addr) -> bool {
        self.ips.read().map(|ips| ips.contains(&ip)).unwrap_or(false)
    }

    /// Record a fake address. Returns `true` if it was not known before.
    pub fn add(&self, ip: Ipv4Addr) -> bool {
        self.ips.write().map(|mut ips| ips.insert(ip)).unwrap_or(false)
    }

    /// First A record of `message` that is a known fake address.
    pub fn check(&self, message: &Message) -> Option<Ipv4Addr> {
        a_records(message).find(|ip| self.is_fake(*ip))
    }

    pub fn len(&self) -> usize {
        self.ips.read().map(|ips| ips.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn items(&self) -> Vec<Ipv4Addr> {
        let mut items: Vec<Ipv4Addr> = self
            .ips
            .read()
            .map(|ips| ips.iter().copied().collect())
            .unwrap_or_default();
        items.sort_unstable();
        items
    }

    /// Ask `nameserver` for one random name and learn every A address it returns.
    ///
    /// Returns the number of newly learned addresses.
    pub async fn probe_once(
        &self,
        exchange: &dyn Exchange,
        nameserver: SocketAddr,
        timeout: Duration,
    ) -> Result<usize, ExchangeError> {
        let query = probe_query()?;
        let qname = query.queries()[0].name().to_ascii();

        let reply = exchange
            .exchange(nameserver, &query, Network::Udp, timeout)
            .await?;

        let mut learned = 0;
        for ip in a_records(&reply) {
            if self.add(ip) {
                info!(%ip, %qname, "learned fake ip");
                learned += 1;
            }
        }
        Ok(learned)
    }

    /// Probe `nameserver` now and then every `interval`, for the life of the process.
    pub fn spawn_probe(
        self: Arc<Self>,
        exchange: Arc<dyn Exchange>,
        nameserver: SocketAddr,
        interval: Duration,
        timeout: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.probe_once(exchange.as_ref(), nameserver, timeout).await {
                    Ok(learned) => debug!(%nameserver, learned, known = self.len(), "fake ip probe done"),
                    Err(e) => warn!(%nameserver, "fake ip probe failed: {}", e),
                }
            }
        })
    }
}

impl Default for FakeIpGuard {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

/// A recursive A query for a fresh random hostname.
fn probe_query() -> Result<Message, ExchangeError> {
    let label = rand::random::<u32>() >> 1;
    let name = Name::from_str(&format!("r{label}{PROBE_SUFFIX}"))?;

    let mut query = Message::new();
    query
        .set_id(rand::random::<u16>())
        .set_message_type(MessageType::Query)
        .set_recursion_desired(true);
    query.add_query(Query::query(name, RecordType::A));

    Ok(query)
}
