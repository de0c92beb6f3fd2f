//! fusedns - a forwarding DNS resolver that races international and
//! regional nameservers and fuses their answers.
//!
//! Queries pass through a blocklist and two answer caches before being
//! raced upstream. Replies carrying known fake addresses are discarded.

pub mod cache;
pub mod config;
pub mod dns;
pub mod error;
pub mod fakeip;
pub mod filter;
pub mod geo;
pub mod handler;
pub mod proxy;
pub mod question_log;
pub mod resolver;
pub mod services;
pub mod stats;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use handler::QueryHandler;
pub use services::Services;
