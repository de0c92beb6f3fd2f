//! Resolver orchestration.
//!
//! Builds the shared services from the config, binds transports and runs
//! the background tasks.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::filter::load_blocklist;
use crate::geo::{CidrGeoTable, GeoClassifier};
use crate::handler::QueryHandler;
use crate::services::Services;
use crate::transport::WireExchange;
use crate::transport::{tcp::TcpTransport, udp::UdpTransport};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Build services talking to real nameservers, with the blocklist and GeoIP table loaded.
pub fn build_services(config: &Config) -> Result<Services> {
    let geo: Option<Arc<dyn GeoClassifier>> = match &config.geoip {
        Some(path) => {
            let table = CidrGeoTable::load(path)?;
            info!(path = %path.display(), ranges = table.len(), "loaded geoip table");
            Some(Arc::new(table))
        }
        None => None,
    };

    let services = Services::from_config(config, Arc::new(WireExchange), geo);
    load_blocklist(
        &services.blocklist,
        &config.blocklist,
        &config.sources,
        &config.whitelist,
    )?;

    Ok(services)
}

/// Run the resolver with the given configuration.
///
/// Starts UDP and TCP transports on the bind address. Runs indefinitely.
pub async fn run(config: Config) -> Result<()> {
    let services = Arc::new(build_services(&config)?);
    let handler = Arc::new(QueryHandler::new(services.clone()));

    if let Some(nameserver) = config.fake_probe_target() {
        services.fake_ips.clone().spawn_probe(
            services.exchange.clone(),
            nameserver,
            config.fake_probe_interval(),
            config.timeout(),
        );
    }

    let udp = UdpTransport::bind(config.bind).await?;
    let tcp = TcpTransport::bind(config.bind).await?;

    info!(
        bind = %config.bind,
        blocked = services.blocklist.len(),
        fake_ips = services.fake_ips.len(),
        cache_expire = ?services.cache.expire(),
        negative_expire = ?services.negative_cache.expire(),
        "resolver listening"
    );
    let pools = services.resolver.pools();
    info!(primary = ?pools.primary, regional = ?pools.regional, tertiary = ?pools.tertiary, "nameservers");

    udp.start(handler.clone());
    tcp.start(handler);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_INTERVAL);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let stats = services.stats.snapshot_and_reset();
            info!(
                uptime = stats.uptime_secs,
                cache = services.cache.len(),
                negative_cache = services.negative_cache.len(),
                questions = services.question_log.len(),
                requests = stats.requests,
                resolved = stats.resolved,
                cached = stats.cached,
                blocked = stats.blocked,
                failed = stats.failed,
                avg_response_ms = format_args!("{:.2}", stats.avg_response_ms),
                "stats"
            );
        }
    });

    std::future::pending::<()>().await;

    Ok(())
}
