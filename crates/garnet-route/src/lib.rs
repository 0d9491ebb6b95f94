//! # Garnet Route
//!
//! Distance-vector routing control plane and IPv4 forwarding plane for a
//! virtual network: a route table with longest-prefix match, a RIPv2-style
//! engine with periodic, triggered and solicited advertisements plus route
//! aging, and a per-datagram forwarder that rewrites link-layer headers.

use std::net::Ipv4Addr;
use std::time::Duration;

pub mod arp;
pub mod device;
pub mod error;
pub mod forward;
pub mod protocol;
pub mod rip;
pub mod router;
pub mod table;

pub use arp::ArpCache;
pub use device::{DataLink, Interface, UdpDataLink};
pub use error::RouteError;
pub use forward::Forwarder;
pub use rip::RipEngine;
pub use router::Router;
pub use table::{RouteEntry, RouteTable};

/// Metric value meaning "unreachable".
pub const INFINITY_METRIC: u32 = 16;

/// UDP port the routing protocol speaks on.
pub const RIP_PORT: u16 = 520;

/// Multicast group for unsolicited advertisements and requests.
pub const RIP_MULTICAST: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 9);

/// Interval between unsolicited full-table advertisements.
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Age past which a learned route is retired.
pub const ROUTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between expiry sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
