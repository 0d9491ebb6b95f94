//! Static next-hop resolution. The cache is populated by the host program
//! and read-only to the forwarding plane.

use crate::protocol::ethernet::MacAddr;
use dashmap::DashMap;
use std::net::Ipv4Addr;

/// IP-to-MAC resolution table shared across the router tasks.
#[derive(Debug, Default)]
pub struct ArpCache {
    entries: DashMap<Ipv4Addr, MacAddr>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ip: Ipv4Addr, mac: MacAddr) {
        self.entries.insert(ip, mac);
    }

    pub fn resolve(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries.get(&ip).map(|entry| *entry.value())
    }
}
