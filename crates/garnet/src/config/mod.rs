//! Router configuration: interfaces with their virtual-wire endpoints,
//! optional static routes, and the ARP entries the forwarder resolves
//! next hops against. Loaded from TOML and validated before anything
//! binds a socket.

use garnet_route::protocol::ethernet::MacAddr;
use garnet_route::{ArpCache, Interface, RouteTable};
use serde::Deserialize;
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

pub mod error;

pub use error::{ConfigError, Result};

#[derive(Debug, Deserialize)]
pub struct RouterConfig {
    pub interfaces: Vec<InterfaceConfig>,
    /// When present the router runs a fixed table and no control plane.
    #[serde(default)]
    pub routes: Vec<StaticRouteConfig>,
    #[serde(default)]
    pub arp: Vec<ArpEntryConfig>,
}

#[derive(Debug, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    pub ip: String,
    pub mask: String,
    pub mac: String,
    /// Local UDP address carrying this interface's frames.
    pub bind: String,
    /// Remote UDP endpoint on the far end of the virtual wire.
    pub peer: String,
}

#[derive(Debug, Deserialize)]
pub struct StaticRouteConfig {
    pub destination: String,
    pub mask: String,
    /// `0.0.0.0` means directly attached.
    pub gateway: String,
    pub interface: String,
    #[serde(default)]
    pub metric: u32,
}

#[derive(Debug, Deserialize)]
pub struct ArpEntryConfig {
    pub ip: String,
    pub mac: String,
}

/// Reads and validates the router configuration at `path`.
pub fn load(path: &Path) -> Result<RouterConfig> {
    let raw = fs::read_to_string(path)?;
    let config: RouterConfig = toml::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}

fn parse_ip(field: &str, value: &str) -> Result<Ipv4Addr> {
    Ipv4Addr::from_str(value)
        .map_err(|_| ConfigError::Validation(format!("{field}: invalid IPv4 address '{value}'")))
}

fn parse_mac(field: &str, value: &str) -> Result<MacAddr> {
    MacAddr::parse(value)
        .map_err(|_| ConfigError::Validation(format!("{field}: invalid MAC address '{value}'")))
}

fn parse_sockaddr(field: &str, value: &str) -> Result<SocketAddr> {
    SocketAddr::from_str(value)
        .map_err(|_| ConfigError::Validation(format!("{field}: invalid socket address '{value}'")))
}

impl RouterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interfaces.is_empty() {
            return Err(ConfigError::Validation(
                "at least one interface is required".to_string(),
            ));
        }
        for iface in &self.interfaces {
            if iface.name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "interface names cannot be empty".to_string(),
                ));
            }
            if self
                .interfaces
                .iter()
                .filter(|other| other.name == iface.name)
                .count()
                > 1
            {
                return Err(ConfigError::Validation(format!(
                    "duplicate interface name '{}'",
                    iface.name
                )));
            }
            parse_ip(&iface.name, &iface.ip)?;
            parse_ip(&iface.name, &iface.mask)?;
            parse_mac(&iface.name, &iface.mac)?;
            parse_sockaddr(&iface.name, &iface.bind)?;
            parse_sockaddr(&iface.name, &iface.peer)?;
        }
        for route in &self.routes {
            parse_ip("routes", &route.destination)?;
            parse_ip("routes", &route.mask)?;
            parse_ip("routes", &route.gateway)?;
            if !self.interfaces.iter().any(|i| i.name == route.interface) {
                return Err(ConfigError::Validation(format!(
                    "route references unknown interface '{}'",
                    route.interface
                )));
            }
        }
        for entry in &self.arp {
            parse_ip("arp", &entry.ip)?;
            parse_mac("arp", &entry.mac)?;
        }
        Ok(())
    }

    /// Typed interface descriptors.
    pub fn interfaces(&self) -> Result<Vec<Interface>> {
        self.interfaces
            .iter()
            .map(|iface| {
                Ok(Interface {
                    name: iface.name.clone(),
                    ip: parse_ip(&iface.name, &iface.ip)?,
                    mask: parse_ip(&iface.name, &iface.mask)?,
                    mac: parse_mac(&iface.name, &iface.mac)?,
                })
            })
            .collect()
    }

    /// `(interface, local bind, far endpoint)` triples for the links.
    pub fn endpoints(&self) -> Result<Vec<(String, SocketAddr, SocketAddr)>> {
        self.interfaces
            .iter()
            .map(|iface| {
                Ok((
                    iface.name.clone(),
                    parse_sockaddr(&iface.name, &iface.bind)?,
                    parse_sockaddr(&iface.name, &iface.peer)?,
                ))
            })
            .collect()
    }

    pub fn arp_cache(&self) -> Result<ArpCache> {
        let cache = ArpCache::new();
        for entry in &self.arp {
            cache.insert(parse_ip("arp", &entry.ip)?, parse_mac("arp", &entry.mac)?);
        }
        Ok(cache)
    }

    /// The fixed table, if static routes were configured: directly
    /// attached prefixes first, then the configured routes.
    pub fn route_table(&self, interfaces: &[Interface]) -> Result<Option<RouteTable>> {
        if self.routes.is_empty() {
            return Ok(None);
        }
        let mut table = RouteTable::new();
        for iface in interfaces {
            table.insert(
                iface.network(),
                iface.mask,
                Ipv4Addr::UNSPECIFIED,
                &iface.name,
                0,
                true,
            );
        }
        for route in &self.routes {
            let gateway = parse_ip("routes", &route.gateway)?;
            table.insert(
                parse_ip("routes", &route.destination)?,
                parse_ip("routes", &route.mask)?,
                gateway,
                &route.interface,
                route.metric,
                gateway.is_unspecified(),
            );
        }
        Ok(Some(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[interfaces]]
        name = "eth0"
        ip = "192.168.0.1"
        mask = "255.255.255.0"
        mac = "02:00:00:00:00:01"
        bind = "127.0.0.1:9001"
        peer = "127.0.0.1:9002"

        [[interfaces]]
        name = "lan0"
        ip = "10.0.1.1"
        mask = "255.255.255.0"
        mac = "02:00:00:00:00:02"
        bind = "127.0.0.1:9003"
        peer = "127.0.0.1:9004"

        [[routes]]
        destination = "10.0.2.0"
        mask = "255.255.255.0"
        gateway = "192.168.0.2"
        interface = "eth0"
        metric = 1

        [[arp]]
        ip = "192.168.0.2"
        mac = "02:00:00:00:00:99"
    "#;

    #[test]
    fn parses_and_validates_a_full_config() {
        let config: RouterConfig = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        let interfaces = config.interfaces().unwrap();
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces[0].network(), "192.168.0.0".parse::<Ipv4Addr>().unwrap());

        let table = config.route_table(&interfaces).unwrap().unwrap();
        assert_eq!(table.len(), 3);
        let hit = table.lookup("10.0.2.9".parse().unwrap()).unwrap();
        assert_eq!(hit.gateway, "192.168.0.2".parse::<Ipv4Addr>().unwrap());
        assert!(!hit.direct);

        let arp = config.arp_cache().unwrap();
        assert!(arp.resolve("192.168.0.2".parse().unwrap()).is_some());
    }

    #[test]
    fn dynamic_mode_when_no_routes_are_given() {
        let trimmed = SAMPLE.split("[[routes]]").next().unwrap();
        let config: RouterConfig = toml::from_str(trimmed).unwrap();
        config.validate().unwrap();
        let interfaces = config.interfaces().unwrap();
        assert!(config.route_table(&interfaces).unwrap().is_none());
    }

    #[test]
    fn rejects_bad_fields() {
        let bad_mac = SAMPLE.replace("02:00:00:00:00:01", "not-a-mac");
        let config: RouterConfig = toml::from_str(&bad_mac).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let bad_route = SAMPLE.replace("interface = \"eth0\"", "interface = \"eth9\"");
        let config: RouterConfig = toml::from_str(&bad_route).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }
}
