//! `Address`/`NodeLocation` — the set of interfaces a node advertises
//! itself on, and the type callers use to specify where to connect.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

use slick_util::error::{ErrorType, NetworkError};
use slick_util::wire::{Decode, Encode};
use slick_util::NetworkResult;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Address {
            host: host.into(),
            port,
        }
    }

    /// Resolves this address to the first socket address the platform
    /// resolver returns. `ToSocketAddrs::to_socket_addrs` does the DNS
    /// lookup for hostnames and is infallible for literal IPs.
    pub fn to_socket_addr(&self) -> NetworkResult<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|_| NetworkError::Fatal(ErrorType::AddrParse))?
            .next()
            .ok_or(NetworkError::Fatal(ErrorType::AddrParse))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Encode for Address {
    fn encode(&self, out: &mut Vec<u8>) {
        self.host.encode(out);
        self.port.encode(out);
    }
}

impl Decode for Address {
    fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        let host = String::decode(input)?;
        let port = u16::decode(input)?;
        Ok(Address { host, port })
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::new(addr.ip().to_string(), addr.port())
    }
}

/// An ordered sequence of interfaces a node listens on. Callers try them
/// in order when connecting; the first that accepts wins.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct NodeLocation(pub Vec<Address>);

impl NodeLocation {
    pub fn single(addr: Address) -> Self {
        NodeLocation(vec![addr])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Address> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&Address> {
        self.0.first()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Encode for NodeLocation {
    fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out);
    }
}

impl Decode for NodeLocation {
    fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        Ok(NodeLocation(Vec::decode(input)?))
    }
}

impl fmt::Display for NodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|a| a.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slick_util::wire::encode_to_vec;

    #[test]
    fn address_roundtrips() {
        let addr = Address::new("127.0.0.1", 18888);
        let bytes = encode_to_vec(&addr);
        let mut cursor = &bytes[..];
        assert_eq!(addr, Address::decode(&mut cursor).unwrap());
    }

    #[test]
    fn node_location_roundtrips_and_preserves_order() {
        let loc = NodeLocation(vec![
            Address::new("10.0.0.1", 1),
            Address::new("10.0.0.2", 2),
        ]);
        let bytes = encode_to_vec(&loc);
        let mut cursor = &bytes[..];
        let decoded = NodeLocation::decode(&mut cursor).unwrap();
        assert_eq!(loc, decoded);
        assert_eq!(decoded.first().unwrap().port, 1);
    }

    #[test]
    fn loopback_resolves() {
        let addr = Address::new("127.0.0.1", 9999);
        let resolved = addr.to_socket_addr().unwrap();
        assert_eq!(resolved.port(), 9999);
    }
}
