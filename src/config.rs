//! Resolver configuration.
//!
//! Loaded from a TOML file. Every field has a default, so a partial file is
//! valid; a missing file is created with the defaults.

use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dns::NullRoute;
use crate::error::{Error, Result};
use crate::resolver::{DEFAULT_TRUSTED_COUNTRY, NameserverPools};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UDP/TCP listen address.
    pub bind: SocketAddr,

    /// IPv4 address returned for blocked A queries.
    pub nullroute: Ipv4Addr,
    /// IPv6 address returned for blocked AAAA queries.
    pub nullroute_v6: Ipv6Addr,
    /// TTL of blocked answers, in seconds.
    pub ttl: u32,

    /// International nameservers.
    pub nameservers: Vec<SocketAddr>,
    /// In-country nameservers.
    pub regional_nameservers: Vec<SocketAddr>,
    /// ISP or enterprise nameservers, consulted only when both pools above fail.
    pub tertiary_nameservers: Vec<SocketAddr>,
    /// Country code whose addresses make a regional answer trustworthy.
    pub trusted_country: String,

    /// Delay between launching attempts within one pool.
    pub interval_ms: u64,
    /// Timeout of a single upstream exchange.
    pub timeout_ms: u64,
    /// Deadline shared by all pools for one resolution.
    pub session_timeout_ms: u64,

    /// Lifetime of cached answers; failures are cached for half as long.
    pub expire_secs: u64,
    /// Maximum cache entries, 0 for unbounded.
    pub maxcount: usize,
    /// Maximum question log entries, 0 for unbounded.
    pub question_log_capacity: usize,

    /// Run the periodic fake ip discovery probe.
    pub fake_probe: bool,
    pub fake_probe_interval_secs: u64,
    /// Resolver on the tampered path used for fake ip discovery. Left out of
    /// the file, the built-in default is used; set `fake_probe = false` to
    /// stop probing.
    pub fake_probe_nameserver: Option<SocketAddr>,
    /// Known fake addresses loaded at startup.
    pub fake_ips: Vec<Ipv4Addr>,

    /// Manually blocked domains.
    pub blocklist: Vec<String>,
    /// Domains never blocked by host-file sources.
    pub whitelist: Vec<String>,
    /// Local host-format files to block.
    pub sources: Vec<PathBuf>,
    /// CIDR-to-country table used to vet regional answers.
    pub geoip: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 53)),
            nullroute: Ipv4Addr::UNSPECIFIED,
            nullroute_v6: Ipv6Addr::UNSPECIFIED,
            ttl: 600,
            nameservers: addrs(&[
                "8.8.8.8:53",
                "8.8.4.4:53",
                "208.67.222.222:443",
                "208.67.220.220:443",
                "208.67.222.222:53",
                "208.67.220.220:53",
                "74.82.42.42:53",
            ]),
            regional_nameservers: addrs(&[
                "114.114.114.114:53",
                "114.114.115.115:53",
                "223.5.5.5:53",
                "223.6.6.6:53",
                "182.254.116.116:53",
                "1.2.4.8:53",
            ]),
            tertiary_nameservers: Vec::new(),
            trusted_country: DEFAULT_TRUSTED_COUNTRY.to_string(),
            interval_ms: 100,
            timeout_ms: 800,
            session_timeout_ms: 2000,
            expire_secs: 3600,
            maxcount: 0,
            question_log_capacity: 5000,
            fake_probe: true,
            fake_probe_interval_secs: 30,
            fake_probe_nameserver: Some(SocketAddr::from(([114, 114, 114, 114], 53))),
            fake_ips: vec![
                Ipv4Addr::new(93, 46, 8, 89),
                Ipv4Addr::new(8, 7, 198, 45),
                Ipv4Addr::new(203, 98, 7, 65),
                Ipv4Addr::new(46, 82, 174, 68),
                Ipv4Addr::new(78, 16, 49, 15),
                Ipv4Addr::new(59, 24, 3, 173),
                Ipv4Addr::new(37, 61, 54, 158),
            ],
            blocklist: Vec::new(),
            whitelist: vec![
                "126.com".to_string(),
                "163.com".to_string(),
                "getsentry.com".to_string(),
                "www.getsentry.com".to_string(),
            ],
            sources: Vec::new(),
            geoip: None,
        }
    }
}

impl Config {
    /// Load config from a TOML file, writing the defaults there first if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            Self::default().write(path)?;
            info!(path = %path.display(), "generated default config");
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pools().is_empty() {
            return Err(Error::Config("no nameservers configured".to_string()));
        }
        if self.session_timeout_ms == 0 {
            return Err(Error::Config("session_timeout_ms must be positive".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be positive".to_string()));
        }
        if self.fake_probe_target().is_some() && self.fake_probe_interval_secs == 0 {
            return Err(Error::Config("fake_probe_interval_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn pools(&self) -> NameserverPools {
        NameserverPools {
            primary: self.nameservers.clone(),
            regional: self.regional_nameservers.clone(),
            tertiary: self.tertiary_nameservers.clone(),
        }
    }

    pub fn null_route(&self) -> NullRoute {
        NullRoute {
            v4: self.nullroute,
            v6: self.nullroute_v6,
            ttl: self.ttl,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn expire(&self) -> Duration {
        Duration::from_secs(self.expire_secs)
    }

    pub fn negative_expire(&self) -> Duration {
        self.expire() / 2
    }

    /// Nameserver to probe, or `None` when probing is switched off.
    pub fn fake_probe_target(&self) -> Option<SocketAddr> {
        if self.fake_probe {
            self.fake_probe_nameserver
        } else {
            None
        }
    }

    pub fn fake_probe_interval(&self) -> Duration {
        Duration::from_secs(self.fake_probe_interval_secs)
    }
}

fn addrs(list: &[&str]) -> Vec<SocketAddr> {
    list.iter().filter_map(|a| a.parse().ok()).collect()
}
