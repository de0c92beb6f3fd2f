//! DNS query filtering module.
//!
//! Holds the blocklist index and the loader that fills it from the manual
//! list and host-format source files.

mod blocklist;

use std::fs;
use std::path::Path;

use rustc_hash::FxHashSet;
use tracing::info;

pub use blocklist::BlocklistIndex;

use crate::error::{Error, Result};

/// Extract the domain from one host-file line.
///
/// Blank lines and `#` comments yield `None`. The domain is the second
/// whitespace-separated field when present and not a comment, otherwise the first.
pub fn parse_host_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut fields = line.split_whitespace();
    let first = fields.next()?;
    match fields.next() {
        Some(second) if !second.starts_with('#') => Some(second),
        _ => Some(first),
    }
}

/// Add every domain in a host-format text to `blocklist`, skipping whitelisted names.
///
/// Returns how many new domains were added.
pub fn load_host_text(blocklist: &BlocklistIndex, text: &str, whitelist: &FxHashSet<String>) -> usize {
    let mut added = 0;
    for domain in text.lines().filter_map(parse_host_line) {
        if whitelist.contains(&domain.to_lowercase()) || blocklist.exists(domain) {
            continue;
        }
        blocklist.set(domain, true);
        added += 1;
    }
    added
}

/// Populate `blocklist` from the manual list and local host files.
pub fn load_blocklist<P: AsRef<Path>>(
    blocklist: &BlocklistIndex,
    manual: &[String],
    sources: &[P],
    whitelist: &[String],
) -> Result<()> {
    for domain in manual {
        blocklist.set(domain, true);
    }

    let whitelist: FxHashSet<String> = whitelist.iter().map(|d| d.to_lowercase()).collect();

    for source in sources {
        let path = source.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Blocklist {
            path: path.display().to_string(),
            source,
        })?;
        let added = load_host_text(blocklist, &text, &whitelist);
        info!(path = %path.display(), added, "loaded host file");
    }

    info!(domains = blocklist.len(), "blocklist ready");
    Ok(())
}
