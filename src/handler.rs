//! Per-query decision flow.
//!
//! IN A/AAAA questions go through the answer cache, the blocklist and the
//! negative cache before being resolved upstream. Every other question is
//! forwarded as is and never cached.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use hickory_proto::op::{Message, ResponseCode};
use tracing::{debug, info, warn};

use crate::dns::{Question, blocked_response, failure_response, response_from_cache};
use crate::error::ResolveError;
use crate::question_log::QuestionLogEntry;
use crate::services::Services;
use crate::stats::Outcome;
use crate::transport::Network;

/// Turns one client query into exactly one reply.
pub struct QueryHandler {
    services: Arc<Services>,
}

impl QueryHandler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Answer `request` received from `remote` over `network`.
    pub async fn handle(&self, request: Message, remote: IpAddr, network: Network) -> Message {
        let started = Instant::now();
        let services = &self.services;

        let Some(question) = Question::from_message(&request) else {
            debug!(client = %remote, %network, "query without question");
            return failure_response(&request, ResponseCode::FormErr);
        };
        debug!(client = %remote, %network, %question, "lookup");

        let key = question.key();
        let ip_query = question.ip_query();

        if let Some(kind) = ip_query {
            match services.cache.get(&key) {
                Ok(hit) => {
                    if let Some(cached) = hit.message {
                        debug!(%question, blocked = hit.blocked, "cache hit");
                        if hit.blocked {
                            services.stats.record(Outcome::Blocked, started.elapsed());
                        } else {
                            services.stats.record(Outcome::Cached, started.elapsed());
                        }
                        return response_from_cache(&cached, &request);
                    }
                }
                Err(e) => debug!(%question, "{}", e),
            }

            if services.blocklist.exists(&question.qname) {
                let reply = blocked_response(&request, kind, &services.null_route);
                if let Err(e) = services.cache.set(&key, Some(reply.clone()), true) {
                    warn!(%question, "failed to cache blocked answer: {}", e);
                }
                info!(%question, client = %remote, "blocked");
                self.log_question(remote, &question, network, true);
                services.stats.record(Outcome::Blocked, started.elapsed());
                return reply;
            }

            if services.negative_cache.get(&key).is_ok() {
                debug!(%question, "negative cache hit");
                services.stats.record(Outcome::Failed, started.elapsed());
                return failure_response(&request, ResponseCode::ServFail);
            }
        }

        match self.resolve(&request, network).await {
            Ok(mut reply) => {
                if ip_query.is_some() && !reply.answers().is_empty() {
                    match services.cache.set(&key, Some(reply.clone()), false) {
                        Ok(()) => debug!(%question, "cached answer"),
                        Err(e) => warn!(%question, "failed to cache answer: {}", e),
                    }
                }
                self.log_question(remote, &question, network, false);
                services.stats.record(Outcome::Resolved, started.elapsed());

                reply.set_id(request.id());
                reply
            }
            Err(e) => {
                warn!("{}", e);
                if ip_query.is_some() {
                    if let Err(e) = services.negative_cache.set(&key, None, false) {
                        warn!(%question, "failed to cache failure: {}", e);
                    }
                }
                self.log_question(remote, &question, network, false);
                services.stats.record(Outcome::Failed, started.elapsed());

                failure_response(&request, ResponseCode::ServFail)
            }
        }
    }

    /// Resolve upstream, retrying over TCP when a UDP answer comes back truncated.
    async fn resolve(&self, request: &Message, network: Network) -> Result<Message, ResolveError> {
        let resolver = &self.services.resolver;
        let reply = resolver.lookup(network, request).await?;

        if reply.truncated() && network == Network::Udp {
            debug!(id = request.id(), "truncated answer, retrying over tcp");
            return resolver.lookup(Network::Tcp, request).await;
        }

        Ok(reply)
    }

    /// Append to the question log without holding up the reply.
    fn log_question(&self, remote: IpAddr, question: &Question, network: Network, blocked: bool) {
        let log = self.services.question_log.clone();
        let entry = QuestionLogEntry::new(remote, question, network, blocked);
        tokio::spawn(async move { log.add(entry) });
    }
}
