//! Network address claimed by a masternode.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use crate::TypesError;

/// An IP address and port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetAddress(SocketAddr);

impl NetAddress {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// Private IPv4 ranges: 10/8, 172.16/12, 192.168/16.
    pub fn is_rfc1918(&self) -> bool {
        match self.0.ip() {
            IpAddr::V4(v4) => v4.is_private(),
            IpAddr::V6(_) => false,
        }
    }

    /// Loopback or unspecified.
    pub fn is_local(&self) -> bool {
        let ip = self.0.ip();
        ip.is_loopback() || ip.is_unspecified()
    }

    /// Addresses that are never relayed to or rate-limited as public peers.
    pub fn is_private(&self) -> bool {
        self.is_rfc1918() || self.is_local()
    }
}

impl Default for NetAddress {
    fn default() -> Self {
        Self(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0))
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NetAddress {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>()
            .map(Self)
            .map_err(|_| TypesError::InvalidAddress(s.to_string()))
    }
}

impl From<SocketAddr> for NetAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}
