//! Address-family generic network types.
//!
//! One code path serves both IPv4 and IPv6 through the [`Address`] trait;
//! permits, the BGP trie and RIP packet assembly are all generic over it.

use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::XrlParseError;

/// Per-family behavior a routing address must provide.
pub trait Address:
    Copy + Clone + Eq + Ord + std::hash::Hash + Display + FromStr + Send + Sync + 'static
{
    /// Number of bits in an address of this family.
    const BITS: u8;

    /// The all-zeros address.
    fn zero() -> Self;

    /// Keeps the top `prefix_len` bits and clears the rest.
    fn mask(self, prefix_len: u8) -> Self;

    fn is_multicast(self) -> bool;

    fn to_ip_addr(self) -> IpAddr;
}

impl Address for Ipv4Addr {
    const BITS: u8 = 32;

    fn zero() -> Self {
        Ipv4Addr::UNSPECIFIED
    }

    fn mask(self, prefix_len: u8) -> Self {
        let bits = u32::from(self);
        let masked = if prefix_len == 0 {
            0
        } else {
            bits & (u32::MAX << (32 - u32::from(prefix_len.min(32))))
        };
        Ipv4Addr::from(masked)
    }

    fn is_multicast(self) -> bool {
        Ipv4Addr::is_multicast(&self)
    }

    fn to_ip_addr(self) -> IpAddr {
        IpAddr::V4(self)
    }
}

impl Address for Ipv6Addr {
    const BITS: u8 = 128;

    fn zero() -> Self {
        Ipv6Addr::UNSPECIFIED
    }

    fn mask(self, prefix_len: u8) -> Self {
        let bits = u128::from(self);
        let masked = if prefix_len == 0 {
            0
        } else {
            bits & (u128::MAX << (128 - u32::from(prefix_len.min(128))))
        };
        Ipv6Addr::from(masked)
    }

    fn is_multicast(self) -> bool {
        Ipv6Addr::is_multicast(&self)
    }

    fn to_ip_addr(self) -> IpAddr {
        IpAddr::V6(self)
    }
}

/// A network prefix: base address plus prefix length, stored in canonical
/// (masked) form so two spellings of the same network compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IpNet<A: Address> {
    addr: A,
    prefix_len: u8,
}

pub type Ipv4Net = IpNet<Ipv4Addr>;
pub type Ipv6Net = IpNet<Ipv6Addr>;

impl<A: Address> IpNet<A> {
    /// Builds a prefix, masking the host bits away. Prefix lengths beyond the
    /// family width are clamped.
    pub fn new(addr: A, prefix_len: u8) -> Self {
        let prefix_len = prefix_len.min(A::BITS);
        Self {
            addr: addr.mask(prefix_len),
            prefix_len,
        }
    }

    #[must_use]
    pub fn addr(&self) -> A {
        self.addr
    }

    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// True if `host` falls inside this prefix.
    pub fn contains(&self, host: A) -> bool {
        host.mask(self.prefix_len) == self.addr
    }

    /// True if `other` is equal to or more specific than this prefix.
    pub fn covers(&self, other: &Self) -> bool {
        other.prefix_len >= self.prefix_len && other.addr.mask(self.prefix_len) == self.addr
    }
}

impl<A: Address> Display for IpNet<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl<A: Address> FromStr for IpNet<A> {
    type Err = XrlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || XrlParseError::BadValue {
            atom_type: "net".to_string(),
            value: s.to_string(),
        };
        let (addr, len) = s.split_once('/').ok_or_else(bad)?;
        let addr = A::from_str(addr).map_err(|_| bad())?;
        let len = u8::from_str(len).map_err(|_| bad())?;
        if len > A::BITS {
            return Err(bad());
        }
        Ok(Self::new(addr, len))
    }
}

/// Family-erased prefix, for permit lists and Xrl atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnyNet {
    V4(Ipv4Net),
    V6(Ipv6Net),
}

impl AnyNet {
    pub fn contains(&self, host: IpAddr) -> bool {
        match (self, host) {
            (Self::V4(net), IpAddr::V4(h)) => net.contains(h),
            (Self::V6(net), IpAddr::V6(h)) => net.contains(h),
            _ => false,
        }
    }
}

impl Display for AnyNet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4(n) => n.fmt(f),
            Self::V6(n) => n.fmt(f),
        }
    }
}

impl FromStr for AnyNet {
    type Err = XrlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = Ipv4Net::from_str(s) {
            return Ok(Self::V4(n));
        }
        Ipv6Net::from_str(s).map(Self::V6)
    }
}

/// 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mac(pub [u8; 6]);

impl Display for Mac {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for Mac {
    type Err = XrlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || XrlParseError::BadValue {
            atom_type: "mac".to_string(),
            value: s.to_string(),
        };
        let mut out = [0u8; 6];
        let mut parts = s.split(':');
        for slot in &mut out {
            let part = parts.next().ok_or_else(bad)?;
            if part.len() != 2 {
                return Err(bad());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| bad())?;
        }
        if parts.next().is_some() {
            return Err(bad());
        }
        Ok(Mac(out))
    }
}
