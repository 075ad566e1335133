//! Addressed peers: a logical ring position paired with a network locator.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::address::Address;

/// A known peer: its logical ring [`Address`] plus the network locator the
/// transport layer uses to reach it.
///
/// Identity is the *locator*: two records with the same locator are the same
/// peer even while address bookkeeping briefly disagrees (a peer that
/// re-hashed its address is still one machine). Ordering is by address first,
/// then by the locator's deterministic byte encoding, so sorted peer sets
/// are stable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddressedPeer {
    /// The peer's logical ring address.
    pub address: Address,
    /// The peer's network address.
    #[serde(with = "socket_addr_serde")]
    pub locator: SocketAddr,
}

impl AddressedPeer {
    /// Create a new addressed peer record.
    pub fn new(address: Address, locator: SocketAddr) -> Self {
        Self { address, locator }
    }
}

impl PartialEq for AddressedPeer {
    fn eq(&self, other: &Self) -> bool {
        self.locator == other.locator
    }
}

impl Eq for AddressedPeer {}

impl Hash for AddressedPeer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.locator.hash(state);
    }
}

impl PartialOrd for AddressedPeer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AddressedPeer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.address
            .cmp(&other.address)
            .then_with(|| locator_bytes(&self.locator).cmp(&locator_bytes(&other.locator)))
    }
}

/// Deterministic byte encoding of a locator: ip octets then port, big-endian.
/// IPv4 encodes as 4 octets, IPv6 as 16, so the two families never collide
/// at equal length.
fn locator_bytes(addr: &SocketAddr) -> Vec<u8> {
    let mut bytes = match addr.ip() {
        std::net::IpAddr::V4(ip) => ip.octets().to_vec(),
        std::net::IpAddr::V6(ip) => ip.octets().to_vec(),
    };
    bytes.extend_from_slice(&addr.port().to_be_bytes());
    bytes
}

/// Serde support for `SocketAddr` as a string.
mod socket_addr_serde {
    use std::net::SocketAddr;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
