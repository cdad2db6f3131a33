//! Child-side half of the network attachment

use std::net::Ipv4Addr;

use capsule_core::Result;
use serde::{Deserialize, Serialize};

use crate::config::Ipv4Cidr;
use crate::iface;

/// What the container configures on its end of the link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerNetwork {
    /// Interface received from the host
    pub interface: String,
    /// Address and prefix to assign
    pub address: Ipv4Cidr,
    /// Default gateway
    pub gateway: Ipv4Addr,
}

impl ContainerNetwork {
    /// Configure loopback and the peer interface, then route through the
    /// gateway. Must run inside the container's network namespace after the
    /// host has moved the interface in.
    ///
    /// # Errors
    /// Returns error naming the first ioctl that failed
    pub fn configure(&self) -> Result<()> {
        tracing::info!(
            interface = %self.interface,
            address = %self.address,
            gateway = %self.gateway,
            "Configuring container network"
        );

        iface::set_link_up("lo")?;
        iface::set_link_up(&self.interface)?;
        iface::set_ipv4_address(&self.interface, self.address)?;
        iface::add_default_route(self.gateway, &self.interface)?;

        tracing::debug!(interface = %self.interface, "Container network ready");
        Ok(())
    }
}
