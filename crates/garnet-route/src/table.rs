//! The route table: longest-prefix-match lookups for the forwarder, keyed
//! inserts and aging for the control plane. Destinations are always stored
//! pre-masked.

use crate::INFINITY_METRIC;
use crate::protocol::rip::RipEntry;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::Instant;

/// `addr & mask`.
pub(crate) fn apply_mask(addr: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr) & u32::from(mask))
}

/// What a distance-vector merge did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// The prefix was new and has been installed.
    Installed,
    /// A strictly better metric replaced the incumbent.
    Replaced,
    /// Equal metric: only the timestamp moved.
    Refreshed,
    /// Worse news; the entry was left alone for the expiry sweep to judge.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// Destination network, already masked.
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    /// Next-hop gateway; unspecified (0.0.0.0) on direct routes.
    pub gateway: Ipv4Addr,
    /// Egress interface name.
    pub iface: String,
    pub metric: u32,
    pub refreshed: Instant,
    /// Directly attached prefixes never age out.
    pub direct: bool,
}

impl RouteEntry {
    pub fn matches(&self, ip: Ipv4Addr) -> bool {
        apply_mask(ip, self.mask) == self.destination
    }

    pub fn prefix_len(&self) -> u32 {
        u32::from(self.mask).count_ones()
    }
}

/// Sequence of routes under a single-writer discipline; lookups see whole
/// entries, never torn ones, because every access goes through the owner's
/// lock.
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Longest-prefix match: of the entries matching `ip`, the one whose
    /// mask has the most bits set.
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<&RouteEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.matches(ip))
            .max_by_key(|entry| entry.prefix_len())
    }

    fn position(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.destination == destination && entry.mask == mask)
    }

    /// Inserts or updates the entry keyed by `(destination & mask, mask)`.
    /// Returns whether anything besides the timestamp changed.
    pub fn insert(
        &mut self,
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        iface: &str,
        metric: u32,
        direct: bool,
    ) -> bool {
        let destination = apply_mask(destination, mask);
        let metric = metric.min(INFINITY_METRIC);
        match self.position(destination, mask) {
            Some(index) => {
                let entry = &mut self.entries[index];
                let changed = entry.gateway != gateway
                    || entry.iface != iface
                    || entry.metric != metric
                    || entry.direct != direct;
                if changed {
                    entry.gateway = gateway;
                    entry.iface = iface.to_string();
                    entry.metric = metric;
                    entry.direct = direct;
                }
                entry.refreshed = Instant::now();
                changed
            }
            None => {
                self.entries.push(RouteEntry {
                    destination,
                    mask,
                    gateway,
                    iface: iface.to_string(),
                    metric,
                    refreshed: Instant::now(),
                    direct,
                });
                true
            }
        }
    }

    /// Distance-vector merge of one advertised prefix whose metric has
    /// already been incremented and clamped. A strictly lower metric
    /// replaces the incumbent, an equal one refreshes its timestamp, and
    /// worse news is ignored so the expiry sweep can retire the entry if
    /// the better path really is gone.
    pub fn merge(
        &mut self,
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        iface: &str,
        metric: u32,
    ) -> Merge {
        let destination = apply_mask(destination, mask);
        match self.position(destination, mask) {
            None => {
                self.entries.push(RouteEntry {
                    destination,
                    mask,
                    gateway,
                    iface: iface.to_string(),
                    metric,
                    refreshed: Instant::now(),
                    direct: false,
                });
                Merge::Installed
            }
            Some(index) => {
                let entry = &mut self.entries[index];
                if metric < entry.metric {
                    entry.gateway = gateway;
                    entry.iface = iface.to_string();
                    entry.metric = metric;
                    entry.direct = false;
                    entry.refreshed = Instant::now();
                    Merge::Replaced
                } else if metric == entry.metric {
                    entry.refreshed = Instant::now();
                    Merge::Refreshed
                } else {
                    Merge::Ignored
                }
            }
        }
    }

    /// Pins the matched learned entry at infinity so the sweeper retires
    /// it. Only the advertising gateway may kill its own route.
    pub fn mark_unreachable(
        &mut self,
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        iface: &str,
    ) -> bool {
        let destination = apply_mask(destination, mask);
        match self.position(destination, mask) {
            Some(index) => {
                let entry = &mut self.entries[index];
                if entry.direct || entry.gateway != gateway || entry.iface != iface {
                    return false;
                }
                entry.metric = INFINITY_METRIC;
                entry.refreshed = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Removes learned entries older than `max_age`. Direct entries are
    /// immune. Returns how many were dropped.
    pub fn expire(&mut self, max_age: Duration, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.direct || now.saturating_duration_since(entry.refreshed) <= max_age);
        before - self.entries.len()
    }

    /// Snapshots the table as advertisement tuples.
    pub fn export(&self) -> Vec<RipEntry> {
        self.entries
            .iter()
            .map(|entry| RipEntry {
                address: entry.destination,
                mask: entry.mask,
                next_hop: Ipv4Addr::UNSPECIFIED,
                metric: entry.metric,
            })
            .collect()
    }
}
