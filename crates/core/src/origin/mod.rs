//! Webhook origin validation.
//!
//! Only deliveries whose source address falls inside one of the provider's
//! published hook ranges are processed. Anything that fails to parse is
//! treated as untrusted.

pub mod meta;

use std::net::IpAddr;
use std::sync::{Arc, RwLock};

use ipnet::IpNet;
use tracing::{debug, warn};

use crate::errors::OriginError;

pub use meta::fetch_hook_ranges;

/// An immutable set of permitted network ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginRanges {
    ranges: Vec<IpNet>,
}

impl OriginRanges {
    pub fn new(ranges: Vec<IpNet>) -> Self {
        Self { ranges }
    }

    /// Build a range set from CIDR strings. Entries that do not parse are
    /// logged and skipped.
    pub fn from_cidrs<I, S>(cidrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ranges = cidrs
            .into_iter()
            .filter_map(|cidr| {
                let cidr = cidr.as_ref();
                let parsed = parse_range(cidr);
                if parsed.is_none() {
                    warn!(cidr, "ignoring unparseable origin range");
                }
                parsed
            })
            .collect();
        Self { ranges }
    }

    /// Build a range set from CIDR strings, failing on the first bad entry.
    pub fn parse_strict<I, S>(cidrs: I) -> Result<Self, OriginError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ranges = cidrs
            .into_iter()
            .map(|cidr| {
                parse_range(cidr.as_ref())
                    .ok_or_else(|| OriginError::InvalidRange(cidr.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ranges })
    }

    /// Return a new set containing the ranges of both sets.
    pub fn merged(&self, other: &OriginRanges) -> Self {
        let mut ranges = self.ranges.clone();
        for range in &other.ranges {
            if !ranges.contains(range) {
                ranges.push(*range);
            }
        }
        Self { ranges }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.ranges.iter().any(|net| net.contains(&ip))
    }
}

/// Parse a CIDR range, accepting a bare address as a single-host range.
pub fn parse_range(s: &str) -> Option<IpNet> {
    let s = s.trim();
    s.parse::<IpNet>()
        .ok()
        .or_else(|| s.parse::<IpAddr>().ok().map(IpNet::from))
}

/// Decide whether `candidate` may deliver webhooks.
///
/// Returns `true` only if `candidate` parses as an IP address inside at least
/// one permitted range.
pub fn is_allowed(candidate: &str, ranges: &OriginRanges) -> bool {
    match candidate.trim().parse::<IpAddr>() {
        Ok(ip) => ranges.contains(&ip),
        Err(_) => {
            debug!(candidate, "origin address does not parse");
            false
        }
    }
}

/// Pick the address to validate: the forwarding header when present,
/// otherwise the direct peer.
///
/// A multi-hop header is read from the right, since the rightmost entry is
/// the one appended by the proxy in front of us.
pub fn candidate_address(forwarded_for: Option<&str>, peer: IpAddr) -> String {
    forwarded_for
        .and_then(|header| {
            header
                .rsplit(',')
                .map(str::trim)
                .find(|hop| !hop.is_empty())
        })
        .map(str::to_string)
        .unwrap_or_else(|| peer.to_string())
}

/// Process-wide holder for the current range set.
///
/// Request handlers take a cheap snapshot; the refresher swaps in a whole new
/// set at once.
#[derive(Debug, Default)]
pub struct SharedOriginRanges {
    current: RwLock<Arc<OriginRanges>>,
}

impl SharedOriginRanges {
    pub fn new(ranges: OriginRanges) -> Self {
        Self {
            current: RwLock::new(Arc::new(ranges)),
        }
    }

    pub fn snapshot(&self) -> Arc<OriginRanges> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    pub fn replace(&self, ranges: OriginRanges) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(ranges);
    }
}
