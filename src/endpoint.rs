//! Server endpoint: hostname + port + address-family preference, resolved
//! once at startup into a concrete socket address.

use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::ClientError;

pub const DEFAULT_PORT: u16 = 7420;

#[derive(Debug, Clone)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    pub ipv4_only: bool,
}

impl ServerEndpoint {
    pub fn new(host: impl Into<String>, port: u16, ipv4_only: bool) -> Self {
        Self { host: host.into(), port, ipv4_only }
    }

    /// Resolve to a single concrete socket address, preferring IPv4 when
    /// `ipv4_only` is set (or simply taking the first result otherwise).
    pub fn resolve(&self) -> Result<SocketAddr, ClientError> {
        let candidates = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ClientError::ResolveFailed(format!("{}:{}: {e}", self.host, self.port)))?
            .collect::<Vec<_>>();

        if candidates.is_empty() {
            return Err(ClientError::ResolveFailed(format!("{}:{} resolved to no addresses", self.host, self.port)));
        }

        if self.ipv4_only {
            candidates
                .iter()
                .copied()
                .find(SocketAddr::is_ipv4)
                .ok_or_else(|| ClientError::ResolveFailed(format!("{}:{} has no IPv4 address", self.host, self.port)))
        } else {
            Ok(candidates[0])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_localhost() {
        let ep = ServerEndpoint::new("127.0.0.1", 7420, true);
        let addr = ep.resolve().unwrap();
        assert!(addr.is_ipv4());
        assert_eq!(addr.port(), 7420);
    }
}
