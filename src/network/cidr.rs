//! # IPv4 CIDR Blocks
//!
//! Parsing of VPC address blocks and equal-size subnet allocation.

use crate::constants::MIN_SUBNET_PREFIX;
use crate::error::{Result, SynthError};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Network address plus prefix length; host bits are always zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(invalid(format!("{network}/{prefix}"), "prefix must be 0-32"));
        }
        let bits = u32::from(network);
        if bits & !mask(prefix) != 0 {
            return Err(invalid(
                format!("{network}/{prefix}"),
                "host bits must be zero",
            ));
        }
        Ok(Self { network, prefix })
    }

    #[must_use]
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    #[must_use]
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    #[must_use]
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix
            && u32::from(other.network) & mask(self.prefix) == u32::from(self.network)
    }

    /// Carve `count` equal, consecutive subnets from the start of the block
    ///
    /// The subnet size is the largest power of two that fits `count` times.
    /// Fails when that would be smaller than a /28, the smallest subnet a
    /// VPC accepts.
    pub fn split(&self, count: usize) -> Result<Vec<Ipv4Cidr>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let wanted = u32::from(self.prefix) + count.next_power_of_two().trailing_zeros();
        let new_prefix = u8::try_from(wanted)
            .ok()
            .filter(|p| *p <= MIN_SUBNET_PREFIX)
            .ok_or_else(|| {
                invalid(
                    self.to_string(),
                    &format!(
                        "cannot fit {count} subnets: each would be /{wanted}, smaller than /{MIN_SUBNET_PREFIX}"
                    ),
                )
            })?;
        let step = 1u64 << (32 - u64::from(new_prefix));
        let base = u64::from(u32::from(self.network));
        (0u64..)
            .take(count)
            .map(|i| {
                let address = u32::try_from(base + i * step)
                    .map_err(|e| invalid(self.to_string(), &format!("subnet {i} overflows: {e}")))?;
                Ipv4Cidr::new(Ipv4Addr::from(address), new_prefix)
            })
            .collect()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (address, prefix) = trimmed
            .split_once('/')
            .ok_or_else(|| invalid(trimmed, "expected <address>/<prefix>"))?;
        let network: Ipv4Addr = address
            .parse()
            .map_err(|e| invalid(trimmed, &format!("bad address: {e}")))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|e| invalid(trimmed, &format!("bad prefix: {e}")))?;
        Self::new(network, prefix)
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn invalid(cidr: impl Into<String>, reason: &str) -> SynthError {
    SynthError::InvalidCidr {
        cidr: cidr.into(),
        reason: reason.to_string(),
    }
}
