//! Bind addresses given on the command line.
use std::{net::ToSocketAddrs, ops::Deref, str::FromStr};

/// A socket address that may be given as a host name (`localhost:8888`),
/// resolved once at parse time to its first address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindAddr(std::net::SocketAddr);

impl BindAddr {
    pub fn new(addr: std::net::SocketAddr) -> Self {
        Self(addr)
    }
}

impl Deref for BindAddr {
    type Target = std::net::SocketAddr;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for BindAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for BindAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.to_socket_addrs()
            .map_err(|e| format!("Cannot parse bind address '{s}': {e}"))?
            .next()
            .map(Self)
            .ok_or_else(|| format!("Bind address '{s}' resolved to nothing"))
    }
}

impl From<BindAddr> for std::net::SocketAddr {
    fn from(addr: BindAddr) -> Self {
        addr.0
    }
}
