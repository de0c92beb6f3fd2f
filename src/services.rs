//! Shared state of a running resolver.
//!
//! Built once at startup and handed to every query by reference.

use std::sync::Arc;

use crate::cache::AnswerCache;
use crate::config::Config;
use crate::dns::NullRoute;
use crate::fakeip::FakeIpGuard;
use crate::filter::BlocklistIndex;
use crate::geo::GeoClassifier;
use crate::question_log::QuestionLog;
use crate::resolver::{NameserverRacer, Resolver};
use crate::stats::Stats;
use crate::transport::Exchange;

pub struct Services {
    pub null_route: NullRoute,
    /// Successful and blocked answers.
    pub cache: AnswerCache,
    /// Questions that recently failed to resolve.
    pub negative_cache: AnswerCache,
    pub blocklist: Arc<BlocklistIndex>,
    pub fake_ips: Arc<FakeIpGuard>,
    pub question_log: Arc<QuestionLog>,
    pub stats: Stats,
    pub resolver: Resolver,
    pub exchange: Arc<dyn Exchange>,
}

impl Services {
    /// Wire up every component from `config`. The blocklist starts empty.
    pub fn from_config(
        config: &Config,
        exchange: Arc<dyn Exchange>,
        geo: Option<Arc<dyn GeoClassifier>>,
    ) -> Self {
        let fake_ips = Arc::new(FakeIpGuard::new(config.fake_ips.iter().copied()));
        let racer = NameserverRacer::new(
            exchange.clone(),
            fake_ips.clone(),
            config.interval(),
            config.timeout(),
        );
        let resolver = Resolver::new(config.pools(), racer, config.session_timeout(), geo)
            .with_trusted_country(&config.trusted_country);

        Self {
            null_route: config.null_route(),
            cache: AnswerCache::new(config.expire(), config.maxcount),
            negative_cache: AnswerCache::new(config.negative_expire(), config.maxcount),
            blocklist: Arc::new(BlocklistIndex::new()),
            fake_ips,
            question_log: Arc::new(QuestionLog::new(config.question_log_capacity)),
            stats: Stats::new(),
            resolver,
            exchange,
        }
    }
}
