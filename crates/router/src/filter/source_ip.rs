//! Source address filter.
//!
//! Matches the record's `_gl2_remote_ip` against exact addresses and CIDR
//! prefixes. A record without a usable source address never matches.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::Deserialize;

use critical_core::{ComponentSpec, Record};

use super::StaticFilter;
use crate::error::RouterError;

/// CIDR network prefix, IPv4 or IPv6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpPrefix {
    network: IpAddr,
    len: u8,
}

impl IpPrefix {
    /// Whether `ip` lies inside this network. Addresses of the other
    /// family never match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = v4_mask(self.len);
                u32::from(ip) & mask == u32::from(net)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = v6_mask(self.len);
                u128::from(ip) & mask == u128::from(net)
            }
            _ => false,
        }
    }

    pub fn network(&self) -> IpAddr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.len
    }
}

fn v4_mask(len: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(len)).unwrap_or(0)
}

fn v6_mask(len: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(len)).unwrap_or(0)
}

impl FromStr for IpPrefix {
    type Err = String;

    /// Parses `addr/len`. A bare address is a full-length prefix.
    /// Prefixes with host bits set are rejected. IPv4-mapped IPv6 prefixes
    /// of length 96 or more become the equivalent IPv4 prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, len) = match s.split_once('/') {
            Some((addr, len)) => (addr, Some(len)),
            None => (s, None),
        };

        let network: IpAddr = addr
            .parse()
            .map_err(|e| format!("invalid network address '{addr}': {e}"))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let len = match len {
            Some(len) => len
                .parse::<u8>()
                .ok()
                .filter(|len| *len <= max)
                .ok_or_else(|| format!("invalid prefix length '{len}' in '{s}'"))?,
            None => max,
        };

        let host_bits_clear = match network {
            IpAddr::V4(net) => u32::from(net) & !v4_mask(len) == 0,
            IpAddr::V6(net) => u128::from(net) & !v6_mask(len) == 0,
        };
        if !host_bits_clear {
            return Err(format!("'{s}' has host bits set"));
        }

        // Addresses are compared in canonical form, so mapped prefixes are too.
        if let IpAddr::V6(net) = network
            && len >= 96
            && let Some(v4) = net.to_ipv4_mapped()
        {
            return Ok(Self {
                network: IpAddr::V4(v4),
                len: len - 96,
            });
        }

        Ok(Self { network, len })
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.len)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceIpParams {
    #[serde(default)]
    ips: Vec<String>,
    #[serde(default)]
    prefixes: Vec<String>,
    #[serde(default)]
    exclude: bool,
}

/// Passes records whose source address is listed, XOR `exclude`.
///
/// With both lists empty nothing matches, so the filter rejects every
/// record unless `exclude` is set.
#[derive(Debug, Clone)]
pub struct SourceIpFilter {
    ips: Vec<IpAddr>,
    prefixes: Vec<IpPrefix>,
    exclude: bool,
}

impl SourceIpFilter {
    pub const KIND: &'static str = "source_ip";

    pub fn new(ips: Vec<IpAddr>, prefixes: Vec<IpPrefix>, exclude: bool) -> Self {
        Self {
            ips: ips.into_iter().map(|ip| ip.to_canonical()).collect(),
            prefixes,
            exclude,
        }
    }

    pub fn from_spec(spec: &ComponentSpec) -> Result<Self, RouterError> {
        let params: SourceIpParams = spec.params()?;

        let ips = params
            .ips
            .iter()
            .map(|ip| {
                ip.trim()
                    .parse::<IpAddr>()
                    .map_err(|e| RouterError::invalid("source_ip.ips", format!("'{ip}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let prefixes = params
            .prefixes
            .iter()
            .map(|p| p.parse::<IpPrefix>().map_err(|e| RouterError::invalid("source_ip.prefixes", e)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(ips, prefixes, params.exclude))
    }

    fn matches(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.ips.contains(&ip) || self.prefixes.iter().any(|prefix| prefix.contains(ip))
    }
}

impl StaticFilter for SourceIpFilter {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn evaluate(&self, record: &Record) -> bool {
        let matched = record.source_ip().is_some_and(|ip| self.matches(ip));
        matched != self.exclude
    }
}
