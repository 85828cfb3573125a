//! Listen and connect addresses given on the command line
use std::{net::ToSocketAddrs, ops::Deref, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddrError {
    #[error("cannot resolve '{addr}': {reason}")]
    Resolve { addr: String, reason: String },

    #[error("'{0}' resolved to no addresses")]
    NoAddress(String),
}

/// A socket address that may be written as a host name, e.g. `localhost:8181`
///
/// Host names are resolved once, when the argument is parsed; the first address wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketAddr(std::net::SocketAddr);

impl SocketAddr {
    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl Deref for SocketAddr {
    type Target = std::net::SocketAddr;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for SocketAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SocketAddr {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        s.to_socket_addrs()
            .map_err(|e| AddrError::Resolve {
                addr: s.to_string(),
                reason: e.to_string(),
            })?
            .next()
            .map(Self)
            .ok_or_else(|| AddrError::NoAddress(s.to_string()))
    }
}

impl From<std::net::SocketAddr> for SocketAddr {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<SocketAddr> for std::net::SocketAddr {
    fn from(addr: SocketAddr) -> Self {
        addr.0
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_literal_and_named_hosts() {
        let addr: SocketAddr = " 0.0.0.0:8181 ".parse().unwrap();
        assert_eq!(
            std::net::SocketAddr::from(addr),
            std::net::SocketAddr::from(([0, 0, 0, 0], 8181))
        );
        assert_eq!(addr.to_string(), "0.0.0.0:8181");

        // localhost may resolve to either loopback address
        let addr: SocketAddr = "localhost:9000".parse().unwrap();
        assert_eq!(addr.port(), 9000);
        assert!(addr.ip().is_loopback(), "{addr}");
        assert_ne!(addr.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn rejects_garbage() {
        let err = "not an address".parse::<SocketAddr>().unwrap_err();
        assert!(
            matches!(&err, AddrError::Resolve { addr, .. } if addr == "not an address"),
            "{err}"
        );
    }
}
