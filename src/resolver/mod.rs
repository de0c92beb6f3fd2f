//! Multi-pool resolution.
//!
//! A query is raced concurrently over up to three independent nameserver
//! pools:
//! 1. primary: international resolvers
//! 2. regional: in-country resolvers, fast but possibly tampered with
//! 3. tertiary: ISP or enterprise resolvers, used only as a fallback
//!
//! Every launched pool is awaited before the candidates are fused into the
//! one answer returned to the client.

mod racer;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::Message;
use tokio::time::Instant;
use tracing::{debug, info};

pub use racer::NameserverRacer;
#[cfg(test)]
pub(crate) use racer::test_support;

use crate::dns::{Question, first_a_record};
use crate::error::ResolveError;
use crate::geo::GeoClassifier;
use crate::transport::Network;

/// Country whose answers from the regional pool are trusted.
pub const DEFAULT_TRUSTED_COUNTRY: &str = "CN";

/// The three upstream pools. Any of them may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameserverPools {
    pub primary: Vec<SocketAddr>,
    pub regional: Vec<SocketAddr>,
    pub tertiary: Vec<SocketAddr>,
}

impl NameserverPools {
    /// Every address, primary first.
    pub fn all(&self) -> Vec<SocketAddr> {
        self.primary
            .iter()
            .chain(&self.regional)
            .chain(&self.tertiary)
            .copied()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.regional.is_empty() && self.tertiary.is_empty()
    }
}

/// Outcome of racing one pool.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    /// The pool has no servers and was skipped.
    NotAttempted,
    /// The pool was raced but produced no valid answer.
    NoAnswer,
    Answer(Message),
}

impl Candidate {
    pub fn into_message(self) -> Option<Message> {
        match self {
            Candidate::Answer(message) => Some(message),
            Candidate::NotAttempted | Candidate::NoAnswer => None,
        }
    }
}

/// Races all pools and fuses their answers.
pub struct Resolver {
    pools: NameserverPools,
    racer: NameserverRacer,
    session_timeout: Duration,
    geo: Option<Arc<dyn GeoClassifier>>,
    trusted_country: String,
}

impl Resolver {
    pub fn new(
        pools: NameserverPools,
        racer: NameserverRacer,
        session_timeout: Duration,
        geo: Option<Arc<dyn GeoClassifier>>,
    ) -> Self {
        Self {
            pools,
            racer,
            session_timeout,
            geo,
            trusted_country: DEFAULT_TRUSTED_COUNTRY.to_string(),
        }
    }

    pub fn with_trusted_country(mut self, code: &str) -> Self {
        self.trusted_country = code.to_uppercase();
        self
    }

    pub fn pools(&self) -> &NameserverPools {
        &self.pools
    }

    /// Resolve `query` over `network`, sharing one session deadline across all pools.
    pub async fn lookup(&self, network: Network, query: &Message) -> Result<Message, ResolveError> {
        let deadline = Instant::now() + self.session_timeout;

        let (primary, regional, tertiary) = futures::future::join3(
            self.race_pool(&self.pools.primary, query, network, deadline),
            self.race_pool(&self.pools.regional, query, network, deadline),
            self.race_pool(&self.pools.tertiary, query, network, deadline),
        )
        .await;

        let qname = Question::from_message(query)
            .map(|q| q.qname)
            .unwrap_or_default();

        fuse(primary, regional, tertiary, self.geo.as_deref(), &self.trusted_country).ok_or_else(|| {
            ResolveError::ResolutionFailure {
                qname,
                network,
                nameservers: self.pools.all(),
            }
        })
    }

    async fn race_pool(
        &self,
        nameservers: &[SocketAddr],
        query: &Message,
        network: Network,
        deadline: Instant,
    ) -> Candidate {
        if nameservers.is_empty() {
            return Candidate::NotAttempted;
        }

        match self.racer.race(nameservers, query, network, deadline).await {
            Some(message) => Candidate::Answer(message),
            None => Candidate::NoAnswer,
        }
    }
}

/// Combine the pool candidates into one answer.
///
/// 1. Neither primary nor regional answered: the tertiary result, possibly none.
/// 2. Exactly one of them answered: that answer.
/// 3. Both answered: regional if the country of its first A record is
///    `trusted_country`, primary otherwise, including when no geo data is
///    available or the lookup fails. A regional answer without A records is kept.
pub fn fuse(
    primary: Candidate,
    regional: Candidate,
    tertiary: Candidate,
    geo: Option<&dyn GeoClassifier>,
    trusted_country: &str,
) -> Option<Message> {
    match (primary.into_message(), regional.into_message()) {
        (None, None) => tertiary.into_message(),
        (Some(primary), None) => Some(primary),
        (None, Some(regional)) => Some(regional),
        (Some(primary), Some(regional)) => {
            if trust_regional(&regional, geo, trusted_country) {
                Some(regional)
            } else {
                Some(primary)
            }
        }
    }
}

fn trust_regional(regional: &Message, geo: Option<&dyn GeoClassifier>, trusted_country: &str) -> bool {
    let Some(geo) = geo else {
        return false;
    };
    // Only the first A record is consulted.
    let Some(ip) = first_a_record(regional) else {
        return true;
    };

    match geo.country(IpAddr::V4(ip)) {
        Ok(code) if code.eq_ignore_ascii_case(trusted_country) => true,
        Ok(code) => {
            info!(%ip, country = %code, "distrusting regional answer");
            false
        }
        Err(e) => {
            debug!(%ip, "geoip lookup failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use hickory_proto::rr::RecordType;

    use super::racer::test_support::{Script, ScriptedExchange, ns};
    use super::*;
    use crate::dns::test_support::{a_reply, query};
    use crate::error::GeoError;
    use crate::fakeip::FakeIpGuard;
    use crate::geo::CidrGeoTable;

    const SESSION: Duration = Duration::from_secs(2);

    fn answer(ip: [u8; 4]) -> Candidate {
        let request = query(1, "www.example.com.", RecordType::A);
        Candidate::Answer(a_reply(&request, &[Ipv4Addr::from(ip)]))
    }

    fn first_ip(message: Option<Message>) -> Option<Ipv4Addr> {
        message.as_ref().and_then(first_a_record)
    }

    fn table() -> CidrGeoTable {
        CidrGeoTable::from_text("1.2.3.0/24 CN\n8.8.8.0/24 US\n").unwrap()
    }

    struct BrokenGeo;

    impl GeoClassifier for BrokenGeo {
        fn country(&self, _ip: IpAddr) -> Result<String, GeoError> {
            Err(GeoError::NoData)
        }
    }

    #[test]
    fn fuse_falls_back_to_tertiary() {
        let fused = fuse(Candidate::NoAnswer, Candidate::NotAttempted, answer([9, 9, 9, 9]), None, "CN");

        assert_eq!(first_ip(fused), Some(Ipv4Addr::new(9, 9, 9, 9)));
    }

    #[test]
    fn fuse_nothing_is_none() {
        let fused = fuse(Candidate::NoAnswer, Candidate::NoAnswer, Candidate::NoAnswer, None, "CN");

        assert!(fused.is_none());
    }

    #[test]
    fn fuse_ignores_tertiary_once_primary_or_regional_answers() {
        let table = table();
        let primary = fuse(answer([8, 8, 8, 8]), Candidate::NoAnswer, answer([9, 9, 9, 9]), Some(&table), "CN");
        let regional = fuse(Candidate::NoAnswer, answer([8, 8, 8, 8]), answer([9, 9, 9, 9]), Some(&table), "CN");

        assert_eq!(first_ip(primary), Some(Ipv4Addr::new(8, 8, 8, 8)));
        assert_eq!(first_ip(regional), Some(Ipv4Addr::new(8, 8, 8, 8)));
    }

    #[test]
    fn fuse_trusts_in_country_regional_answer() {
        let table = table();
        let fused = fuse(answer([8, 8, 8, 8]), answer([1, 2, 3, 4]), Candidate::NoAnswer, Some(&table), "CN");

        assert_eq!(first_ip(fused), Some(Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[test]
    fn fuse_distrusts_foreign_regional_answer() {
        let table = table();
        let fused = fuse(answer([8, 8, 4, 4]), answer([8, 8, 8, 8]), Candidate::NoAnswer, Some(&table), "CN");

        assert_eq!(first_ip(fused), Some(Ipv4Addr::new(8, 8, 4, 4)));
    }

    #[test]
    fn fuse_prefers_primary_without_geo_data() {
        let none = fuse(answer([8, 8, 8, 8]), answer([1, 2, 3, 4]), Candidate::NoAnswer, None, "CN");
        let broken = fuse(answer([8, 8, 8, 8]), answer([1, 2, 3, 4]), Candidate::NoAnswer, Some(&BrokenGeo), "CN");

        assert_eq!(first_ip(none), Some(Ipv4Addr::new(8, 8, 8, 8)));
        assert_eq!(first_ip(broken), Some(Ipv4Addr::new(8, 8, 8, 8)));
    }

    #[test]
    fn fuse_only_checks_first_a_record() {
        let table = table();
        let request = query(1, "www.example.com.", RecordType::A);
        let mixed = a_reply(&request, &[Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(1, 2, 3, 4)]);

        let fused = fuse(answer([7, 7, 7, 7]), Candidate::Answer(mixed), Candidate::NoAnswer, Some(&table), "CN");

        assert_eq!(first_ip(fused), Some(Ipv4Addr::new(7, 7, 7, 7)));
    }

    #[test]
    fn fuse_keeps_regional_answer_without_a_records() {
        let table = table();
        let request = query(1, "www.example.com.", RecordType::AAAA);
        let regional = a_reply(&request, &[]);

        let fused = fuse(answer([8, 8, 8, 8]), Candidate::Answer(regional), Candidate::NoAnswer, Some(&table), "CN");

        assert_eq!(first_ip(fused), None);
    }

    fn resolver(exchange: ScriptedExchange, pools: NameserverPools, fake_ips: FakeIpGuard) -> Resolver {
        let racer = NameserverRacer::new(
            Arc::new(exchange),
            Arc::new(fake_ips),
            Duration::from_millis(100),
            Duration::from_millis(800),
        );
        Resolver::new(pools, racer, SESSION, Some(Arc::new(table())))
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_returns_regional_when_primary_fails() {
        let exchange = ScriptedExchange::default()
            .with(ns(1), Script::Silent)
            .with(
                ns(2),
                Script::Answer {
                    delay: Duration::from_millis(20),
                    ips: vec![Ipv4Addr::new(1, 2, 3, 4)],
                },
            );
        let pools = NameserverPools {
            primary: vec![ns(1)],
            regional: vec![ns(2)],
            tertiary: Vec::new(),
        };
        let resolver = resolver(exchange, pools, FakeIpGuard::default());

        let reply = resolver
            .lookup(Network::Udp, &query(1, "www.example.cn.", RecordType::A))
            .await
            .unwrap();

        assert_eq!(first_a_record(&reply), Some(Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_waits_for_every_pool() {
        let exchange = ScriptedExchange::default()
            .with(
                ns(1),
                Script::Answer {
                    delay: Duration::from_millis(500),
                    ips: vec![Ipv4Addr::new(8, 8, 4, 4)],
                },
            )
            .with(
                ns(2),
                Script::Answer {
                    delay: Duration::from_millis(10),
                    ips: vec![Ipv4Addr::new(8, 8, 8, 8)],
                },
            );
        let pools = NameserverPools {
            primary: vec![ns(1)],
            regional: vec![ns(2)],
            tertiary: Vec::new(),
        };
        let resolver = resolver(exchange, pools, FakeIpGuard::default());
        let start = Instant::now();

        let reply = resolver
            .lookup(Network::Udp, &query(1, "www.example.com.", RecordType::A))
            .await
            .unwrap();

        // The regional answer arrived first but is foreign, so primary wins.
        assert_eq!(first_a_record(&reply), Some(Ipv4Addr::new(8, 8, 4, 4)));
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_reports_failure_with_every_nameserver() {
        let exchange = ScriptedExchange::default().with(
            ns(1),
            Script::Answer {
                delay: Duration::from_millis(10),
                ips: vec![Ipv4Addr::new(93, 46, 8, 89)],
            },
        );
        let pools = NameserverPools {
            primary: vec![ns(1)],
            regional: Vec::new(),
            tertiary: Vec::new(),
        };
        let resolver = resolver(exchange, pools, FakeIpGuard::new([Ipv4Addr::new(93, 46, 8, 89)]));

        let err = resolver
            .lookup(Network::Udp, &query(1, "www.example.com.", RecordType::A))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ResolveError::ResolutionFailure {
                qname: "www.example.com".to_string(),
                network: Network::Udp,
                nameservers: vec![ns(1)],
            }
        );
    }

    #[test]
    fn pools_all_keeps_order() {
        let pools = NameserverPools {
            primary: vec![ns(1)],
            regional: vec![ns(2), ns(3)],
            tertiary: vec![ns(4)],
        };

        assert_eq!(pools.all(), vec![ns(1), ns(2), ns(3), ns(4)]);
        assert!(!pools.is_empty());
        assert!(NameserverPools::default().is_empty());
    }
}
