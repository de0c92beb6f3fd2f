//! Staggered racing of one nameserver pool.
//!
//! Attempts are launched in address order, one every `interval`, and the
//! first valid reply wins. Address order only decides when an attempt
//! starts; once several are in flight, whichever answers first is taken.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, ResponseCode};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::dns::Question;
use crate::error::ExchangeError;
use crate::fakeip::FakeIpGuard;
use crate::transport::{Exchange, Network};

/// Races a query across the addresses of one pool.
pub struct NameserverRacer {
    exchange: Arc<dyn Exchange>,
    fake_ips: Arc<FakeIpGuard>,
    interval: Duration,
    timeout: Duration,
}

impl NameserverRacer {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        fake_ips: Arc<FakeIpGuard>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            exchange,
            fake_ips,
            interval,
            timeout,
        }
    }

    /// Return the first valid reply from `nameservers`, or `None` if every
    /// attempt failed or `deadline` passed first.
    ///
    /// Attempts still in flight when this returns are aborted.
    pub async fn race(
        &self,
        nameservers: &[SocketAddr],
        query: &Message,
        network: Network,
        deadline: Instant,
    ) -> Option<Message> {
        let qname = Question::from_message(query)
            .map(|q| q.qname)
            .unwrap_or_default();
        let mut attempts = JoinSet::new();

        let session = tokio::time::sleep_until(deadline);
        tokio::pin!(session);

        for (idx, &nameserver) in nameservers.iter().enumerate() {
            attempts.spawn(attempt(
                self.exchange.clone(),
                self.fake_ips.clone(),
                nameserver,
                query.clone(),
                network,
                self.timeout,
            ));

            if idx + 1 == nameservers.len() {
                break;
            }

            let stagger = tokio::time::sleep(self.interval);
            tokio::pin!(stagger);

            loop {
                tokio::select! {
                    _ = &mut session => {
                        debug!(%qname, ?nameservers, "resolve timed out");
                        return None;
                    }
                    Some(joined) = attempts.join_next(), if !attempts.is_empty() => {
                        if let Some(reply) = accept(joined) {
                            return Some(reply);
                        }
                    }
                    _ = &mut stagger => break,
                }
            }
        }

        let drain = async {
            while let Some(joined) = attempts.join_next().await {
                if let Some(reply) = accept(joined) {
                    return Some(reply);
                }
            }
            None
        };

        match tokio::time::timeout_at(deadline, drain).await {
            Ok(Some(reply)) => Some(reply),
            Ok(None) => {
                debug!(%qname, ?nameservers, "no valid answer");
                None
            }
            Err(_) => {
                debug!(%qname, ?nameservers, "resolve timed out");
                None
            }
        }
    }
}

/// One exchange plus the validity filter: rcode must be success and no A
/// record may be a known fake address.
async fn attempt(
    exchange: Arc<dyn Exchange>,
    fake_ips: Arc<FakeIpGuard>,
    nameserver: SocketAddr,
    query: Message,
    network: Network,
    timeout: Duration,
) -> Result<Message, ExchangeError> {
    debug!(%nameserver, %network, "lookup");
    let reply = exchange.exchange(nameserver, &query, network, timeout).await?;

    let rcode = reply.response_code();
    if rcode != ResponseCode::NoError {
        return Err(ExchangeError::Rcode { nameserver, rcode });
    }
    if let Some(ip) = fake_ips.check(&reply) {
        return Err(ExchangeError::FakeIp { nameserver, ip });
    }

    debug!(%nameserver, answers = reply.answers().len(), "lookup succeeded");
    Ok(reply)
}

fn accept(joined: Result<Result<Message, ExchangeError>, JoinError>) -> Option<Message> {
    match joined {
        Ok(Ok(reply)) => Some(reply),
        Ok(Err(e)) => {
            debug!("attempt discarded: {}", e);
            None
        }
        Err(e) => {
            warn!("attempt task failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use hickory_proto::op::{Message, ResponseCode};
    use tokio::time::Instant;

    use crate::dns::test_support::{a_reply, rcode_reply};
    use crate::error::ExchangeError;
    use crate::transport::{Exchange, Network};

    /// How a scripted nameserver behaves.
    #[derive(Debug, Clone)]
    pub enum Script {
        /// Reply with these A records after `delay`.
        Answer { delay: Duration, ips: Vec<Ipv4Addr> },
        /// Reply with an error rcode after `delay`.
        Rcode { delay: Duration, rcode: ResponseCode },
        /// Over UDP, an empty reply with the TC bit set. Over TCP, these A records.
        Truncated { delay: Duration, ips: Vec<Ipv4Addr> },
        /// Never reply; fail once the exchange timeout elapses.
        Silent,
    }

    /// In-memory upstreams keyed by address. Records when each was contacted.
    #[derive(Default)]
    pub struct ScriptedExchange {
        scripts: HashMap<SocketAddr, Script>,
        calls: Mutex<Vec<(SocketAddr, Network, Instant)>>,
    }

    impl ScriptedExchange {
        pub fn with(mut self, nameserver: SocketAddr, script: Script) -> Self {
            self.scripts.insert(nameserver, script);
            self
        }

        pub fn calls(&self) -> Vec<(SocketAddr, Network, Instant)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Exchange for ScriptedExchange {
        async fn exchange(
            &self,
            nameserver: SocketAddr,
            query: &Message,
            network: Network,
            timeout: Duration,
        ) -> Result<Message, ExchangeError> {
            self.calls
                .lock()
                .unwrap()
                .push((nameserver, network, Instant::now()));

            match self.scripts.get(&nameserver).cloned().unwrap_or(Script::Silent) {
                Script::Answer { delay, ips } => {
                    tokio::time::sleep(delay).await;
                    Ok(a_reply(query, &ips))
                }
                Script::Rcode { delay, rcode } => {
                    tokio::time::sleep(delay).await;
                    Ok(rcode_reply(query, rcode))
                }
                Script::Truncated { delay, ips } => {
                    tokio::time::sleep(delay).await;
                    match network {
                        Network::Udp => {
                            let mut reply = a_reply(query, &[]);
                            reply.set_truncated(true);
                            Ok(reply)
                        }
                        Network::Tcp => Ok(a_reply(query, &ips)),
                    }
                }
                Script::Silent => {
                    tokio::time::sleep(timeout).await;
                    Err(ExchangeError::Timeout {
                        nameserver,
                        timeout,
                    })
                }
            }
        }
    }

    pub fn ns(n: u8) -> SocketAddr {
        SocketAddr::from(([192, 0, 2, n], 53))
    }
}
