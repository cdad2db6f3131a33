//! Network configuration

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use capsule_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Bridge the host-side interface is attached to
pub const DEFAULT_BRIDGE: &str = "br0";
/// Host-side end of the veth pair
pub const DEFAULT_HOST_INTERFACE: &str = "veth0";
/// Container-side end of the veth pair
pub const DEFAULT_PEER_INTERFACE: &str = "veth1";
/// Subnet served by the bridge
pub const DEFAULT_SUBNET: Ipv4Cidr = Ipv4Cidr::new_unchecked(Ipv4Addr::new(172, 16, 0, 0), 24);
/// Bridge-side address used as the container's default gateway
pub const DEFAULT_GATEWAY: Ipv4Addr = Ipv4Addr::new(172, 16, 0, 100);
/// Address of the single container
pub const DEFAULT_ADDRESS: Ipv4Cidr =
    Ipv4Cidr::new_unchecked(Ipv4Addr::new(172, 16, 0, 101), 24);

/// Longest interface name the kernel accepts (`IFNAMSIZ - 1`)
pub const MAX_INTERFACE_NAME: usize = 15;

/// IPv4 address with prefix length, e.g. `172.16.0.101/24`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    address: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Create from address and prefix length
    ///
    /// # Errors
    /// Returns error if the prefix is longer than 32 bits
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::invalid_config(format!(
                "Prefix length {prefix} exceeds 32"
            )));
        }
        Ok(Self { address, prefix })
    }

    const fn new_unchecked(address: Ipv4Addr, prefix: u8) -> Self {
        Self { address, prefix }
    }

    /// Host address
    #[must_use]
    pub const fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// Prefix length
    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Netmask for the prefix
    #[must_use]
    pub const fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.mask_bits())
    }

    /// First address of the subnet
    #[must_use]
    pub const fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.address.to_bits() & self.mask_bits())
    }

    /// Last address of the subnet
    #[must_use]
    pub const fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.address.to_bits() | !self.mask_bits())
    }

    /// Whether `addr` lies in this subnet
    #[must_use]
    pub const fn contains(&self, addr: Ipv4Addr) -> bool {
        addr.to_bits() & self.mask_bits() == self.network().to_bits()
    }

    /// Same prefix, different host address
    #[must_use]
    pub const fn with_address(&self, address: Ipv4Addr) -> Self {
        Self {
            address,
            prefix: self.prefix,
        }
    }

    const fn mask_bits(&self) -> u32 {
        match self.prefix {
            0 => 0,
            p => u32::MAX << (32 - p),
        }
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (address, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::invalid_config(format!("Expected address/prefix, got {s:?}")))?;

        let address = address
            .parse::<Ipv4Addr>()
            .map_err(|e| Error::invalid_config(format!("Invalid address {address:?}: {e}")))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|e| Error::invalid_config(format!("Invalid prefix {prefix:?}: {e}")))?;

        Self::new(address, prefix)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(cidr: Ipv4Cidr) -> Self {
        cidr.to_string()
    }
}

/// Addressing and interface names for one container's link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Pre-existing bridge on the host
    pub bridge: String,

    /// veth end that stays on the host
    pub host_interface: String,

    /// veth end moved into the container
    pub peer_interface: String,

    /// Container address and prefix
    pub address: Ipv4Cidr,

    /// Default gateway inside the container
    pub gateway: Ipv4Addr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bridge: DEFAULT_BRIDGE.to_string(),
            host_interface: DEFAULT_HOST_INTERFACE.to_string(),
            peer_interface: DEFAULT_PEER_INTERFACE.to_string(),
            address: DEFAULT_ADDRESS,
            gateway: DEFAULT_GATEWAY,
        }
    }
}

impl NetworkConfig {
    /// Create a configuration with the default single-container values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bridge name
    #[must_use]
    pub fn with_bridge(mut self, bridge: impl Into<String>) -> Self {
        self.bridge = bridge.into();
        self
    }

    /// Set both veth endpoint names
    #[must_use]
    pub fn with_interfaces(mut self, host: impl Into<String>, peer: impl Into<String>) -> Self {
        self.host_interface = host.into();
        self.peer_interface = peer.into();
        self
    }

    /// Set the container address
    #[must_use]
    pub const fn with_address(mut self, address: Ipv4Cidr) -> Self {
        self.address = address;
        self
    }

    /// Set the default gateway
    #[must_use]
    pub const fn with_gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = gateway;
        self
    }

    /// Check names and addressing before touching the host
    ///
    /// # Errors
    /// Returns error describing the first problem found
    pub fn validate(&self) -> Result<()> {
        for name in [&self.bridge, &self.host_interface, &self.peer_interface] {
            validate_interface_name(name)?;
        }

        if self.host_interface == self.peer_interface {
            return Err(Error::invalid_config(format!(
                "veth endpoints must differ, both are {}",
                self.host_interface
            )));
        }

        if self.bridge == self.host_interface || self.bridge == self.peer_interface {
            return Err(Error::invalid_config(format!(
                "veth endpoint cannot reuse the bridge name {}",
                self.bridge
            )));
        }

        if !self.address.contains(self.gateway) {
            return Err(Error::invalid_config(format!(
                "Gateway {} is outside {}",
                self.gateway, self.address
            )));
        }

        if self.address.address() == self.gateway {
            return Err(Error::invalid_config(format!(
                "Container address {} equals the gateway",
                self.address
            )));
        }

        let host = self.address.address();
        if self.address.prefix() <= 30
            && (host == self.address.network() || host == self.address.broadcast())
        {
            return Err(Error::invalid_config(format!(
                "Container address {} is not a host address of its subnet",
                self.address
            )));
        }

        Ok(())
    }
}

fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_INTERFACE_NAME {
        return Err(Error::invalid_config(format!(
            "Interface name {name:?} must be 1-{MAX_INTERFACE_NAME} bytes"
        )));
    }

    if name.contains(['/', ' ', '\0']) || name == "." || name == ".." {
        return Err(Error::invalid_config(format!(
            "Interface name {name:?} contains invalid characters"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_parse_and_display() {
        let cidr: Ipv4Cidr = "172.16.0.101/24".parse().unwrap();

        assert_eq!(cidr.address(), Ipv4Addr::new(172, 16, 0, 101));
        assert_eq!(cidr.prefix(), 24);
        assert_eq!(cidr.to_string(), "172.16.0.101/24");
    }

    #[test]
    fn test_cidr_rejects_garbage() {
        assert!("172.16.0.101".parse::<Ipv4Cidr>().is_err());
        assert!("172.16.0.101/33".parse::<Ipv4Cidr>().is_err());
        assert!("172.16.0/24".parse::<Ipv4Cidr>().is_err());
        assert!("host/24".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn test_cidr_math() {
        let cidr: Ipv4Cidr = "172.16.0.101/24".parse().unwrap();

        assert_eq!(cidr.netmask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(cidr.network(), Ipv4Addr::new(172, 16, 0, 0));
        assert_eq!(cidr.broadcast(), Ipv4Addr::new(172, 16, 0, 255));
        assert!(cidr.contains(Ipv4Addr::new(172, 16, 0, 100)));
        assert!(!cidr.contains(Ipv4Addr::new(172, 16, 1, 100)));

        let any: Ipv4Cidr = "0.0.0.0/0".parse().unwrap();
        assert_eq!(any.netmask(), Ipv4Addr::UNSPECIFIED);
        assert!(any.contains(Ipv4Addr::new(8, 8, 8, 8)));

        let host: Ipv4Cidr = "10.0.0.1/32".parse().unwrap();
        assert_eq!(host.netmask(), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_default_config_matches_single_container_layout() {
        let config = NetworkConfig::default();

        assert_eq!(config.bridge, "br0");
        assert_eq!(config.host_interface, "veth0");
        assert_eq!(config.peer_interface, "veth1");
        assert_eq!(config.address.to_string(), "172.16.0.101/24");
        assert_eq!(config.gateway, Ipv4Addr::new(172, 16, 0, 100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_layouts() {
        let long_name = NetworkConfig::new().with_interfaces("a-very-long-interface", "veth1");
        assert!(long_name.validate().is_err());

        let same_name = NetworkConfig::new().with_interfaces("veth0", "veth0");
        assert!(same_name.validate().is_err());

        let far_gateway = NetworkConfig::new().with_gateway(Ipv4Addr::new(10, 0, 0, 1));
        assert!(far_gateway.validate().is_err());

        let gateway_clash = NetworkConfig::new().with_gateway(Ipv4Addr::new(172, 16, 0, 101));
        assert!(gateway_clash.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bridge_as_endpoint() {
        let host_is_bridge = NetworkConfig::new().with_interfaces("br0", "veth1");
        let err = host_is_bridge.validate().unwrap_err();
        assert!(err.to_string().contains("bridge name br0"));

        let peer_is_bridge = NetworkConfig::new().with_interfaces("veth0", "br0");
        assert!(peer_is_bridge.validate().is_err());

        let renamed = NetworkConfig::new()
            .with_bridge("uplink0")
            .with_interfaces("uplink0", "veth1");
        assert!(renamed.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_network_and_broadcast_address() {
        let network: Ipv4Cidr = "172.16.0.0/24".parse().unwrap();
        let err = NetworkConfig::new().with_address(network).validate().unwrap_err();
        assert!(err.to_string().contains("not a host address"));

        let broadcast: Ipv4Cidr = "172.16.0.255/24".parse().unwrap();
        assert!(NetworkConfig::new().with_address(broadcast).validate().is_err());

        let first_host: Ipv4Cidr = "172.16.0.1/24".parse().unwrap();
        assert!(NetworkConfig::new().with_address(first_host).validate().is_ok());
    }

    #[test]
    fn test_config_serde() {
        let config = NetworkConfig::new().with_bridge("br1");
        let json = serde_json::to_string(&config).unwrap();

        assert!(json.contains("\"address\":\"172.16.0.101/24\""));
        let back: NetworkConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
