//! Country lookup for answer addresses.
//!
//! Fusion only needs to know whether an address is located in-country, so
//! the classifier is a narrow trait. [`CidrGeoTable`] implements it over a
//! plain text table of `<cidr> <country>` lines.

use std::fs;
use std::net::IpAddr;
use std::path::Path;

use ipnet::IpNet;

use crate::error::GeoError;

/// Maps an IP address to its ISO 3166 country code.
pub trait GeoClassifier: Send + Sync {
    fn country(&self, ip: IpAddr) -> Result<String, GeoError>;
}

/// Read-only CIDR table; the most specific matching network wins.
#[derive(Debug, Default)]
pub struct CidrGeoTable {
    ranges: Vec<(IpNet, String)>,
}

impl CidrGeoTable {
    /// Parse a table. Blank lines and `#` comments are ignored.
    pub fn from_text(text: &str) -> Result<Self, GeoError> {
        let mut ranges = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split(|c: char| c == ',' || c.is_whitespace()).filter(|f| !f.is_empty());
            let (Some(cidr), Some(code)) = (fields.next(), fields.next()) else {
                return Err(GeoError::Parse {
                    line: idx + 1,
                    reason: "expected `<cidr> <country>`".to_string(),
                });
            };
            let net: IpNet = cidr.parse().map_err(|e: ipnet::AddrParseError| GeoError::Parse {
                line: idx + 1,
                reason: e.to_string(),
            })?;
            ranges.push((net, code.to_uppercase()));
        }

        // Most specific first, so the first hit during lookup is the longest prefix.
        ranges.sort_by(|a, b| b.0.prefix_len().cmp(&a.0.prefix_len()));

        Ok(Self { ranges })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GeoError> {
        let text = fs::read_to_string(path)?;
        Self::from_text(&text)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl GeoClassifier for CidrGeoTable {
    fn country(&self, ip: IpAddr) -> Result<String, GeoError> {
        if self.ranges.is_empty() {
            return Err(GeoError::NoData);
        }

        self.ranges
            .iter()
            .find(|(net, _)| net.contains(&ip))
            .map(|(_, code)| code.clone())
            .ok_or(GeoError::NotFound(ip))
    }
}
