//! Error types for the resolver.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use hickory_proto::ProtoError;
use hickory_proto::op::ResponseCode;
use thiserror::Error;

use crate::transport::Network;

/// Lookup failures of the answer cache. Both are routed to the miss path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} expired")]
    Expired(String),

    #[error("cache lock poisoned")]
    Poisoned,
}

/// A single exchange with one nameserver failed or was rejected.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("io error talking to {nameserver}: {source}")]
    Io {
        nameserver: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("{nameserver} did not answer within {timeout:?}")]
    Timeout {
        nameserver: SocketAddr,
        timeout: Duration,
    },

    #[error("malformed message: {0}")]
    Proto(#[from] ProtoError),

    #[error("reply id {got} does not match query id {expected}")]
    IdMismatch { expected: u16, got: u16 },

    #[error("{nameserver} answered with rcode {rcode}")]
    Rcode {
        nameserver: SocketAddr,
        rcode: ResponseCode,
    },

    #[error("{nameserver} returned known fake ip {ip}")]
    FakeIp {
        nameserver: SocketAddr,
        ip: Ipv4Addr,
    },
}

/// GeoIP lookups never abort a resolution; fusion falls back to the primary pool.
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("no geoip data loaded")]
    NoData,

    #[error("no country known for {0}")]
    NotFound(IpAddr),

    #[error("invalid geoip line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("failed to read geoip table: {0}")]
    Io(#[from] io::Error),
}

/// No pool produced a usable answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("failed to resolve {qname} on {nameservers:?} ({network})")]
    ResolutionFailure {
        qname: String,
        network: Network,
        nameservers: Vec<SocketAddr>,
    },
}

/// Writing a reply back to a client failed. Logged, never propagated.
#[derive(Error, Debug)]
pub enum ReplyError {
    #[error("failed to encode reply: {0}")]
    Encode(#[from] ProtoError),

    #[error("reply of {0} bytes does not fit a tcp frame")]
    TooLarge(usize),

    #[error("failed to send reply: {0}")]
    Io(#[from] io::Error),
}

/// Top-level errors raised while starting the server.
#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to load host file {path}: {source}")]
    Blocklist {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("geoip error: {0}")]
    Geo(#[from] GeoError),

    #[error("toml parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("toml encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
