//! Container address allocation within the bridge subnet

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use capsule_core::{ContainerId, Error, Result};

use crate::config::Ipv4Cidr;

/// Hands out host addresses of one subnet, one per container
///
/// The network, broadcast and gateway addresses are never handed out.
/// Allocation starts right after the gateway and wraps around, so with the
/// default layout the first container gets `172.16.0.101`.
#[derive(Debug, Clone)]
pub struct AddressAllocator {
    subnet: Ipv4Cidr,
    gateway: Ipv4Addr,
    leases: BTreeMap<ContainerId, Ipv4Addr>,
}

impl AddressAllocator {
    /// Create an allocator for `subnet` routed through `gateway`
    ///
    /// # Errors
    /// Returns error if the gateway is outside the subnet or the subnet has
    /// no room for a container
    pub fn new(subnet: Ipv4Cidr, gateway: Ipv4Addr) -> Result<Self> {
        if subnet.prefix() > 30 {
            return Err(Error::invalid_config(format!(
                "Subnet {subnet} is too small for a gateway and a container"
            )));
        }

        if !subnet.contains(gateway) || gateway == subnet.network() || gateway == subnet.broadcast()
        {
            return Err(Error::invalid_config(format!(
                "Gateway {gateway} is not a host address of {subnet}"
            )));
        }

        Ok(Self {
            subnet: Ipv4Cidr::new(subnet.network(), subnet.prefix())?,
            gateway,
            leases: BTreeMap::new(),
        })
    }

    /// Subnet addresses are taken from
    #[must_use]
    pub const fn subnet(&self) -> Ipv4Cidr {
        self.subnet
    }

    /// Gateway address, never handed out
    #[must_use]
    pub const fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    /// Address for `id`, allocating one on first use
    ///
    /// Asking again for the same container returns the same address.
    ///
    /// # Errors
    /// Returns error if every host address is leased
    pub fn allocate(&mut self, id: &ContainerId) -> Result<Ipv4Cidr> {
        if let Some(lease) = self.lease(id) {
            return Ok(lease);
        }

        let address = self
            .candidates()
            .find(|addr| !self.leases.values().any(|leased| leased == addr))
            .ok_or_else(|| Error::network(format!("Address pool {} exhausted", self.subnet)))?;

        tracing::debug!(container_id = %id, address = %address, "Allocated container address");
        self.leases.insert(id.clone(), address);

        Ok(self.subnet.with_address(address))
    }

    /// Current lease of `id`
    #[must_use]
    pub fn lease(&self, id: &ContainerId) -> Option<Ipv4Cidr> {
        self.leases
            .get(id)
            .map(|addr| self.subnet.with_address(*addr))
    }

    /// Return the address of `id` to the pool
    pub fn release(&mut self, id: &ContainerId) -> Option<Ipv4Addr> {
        let released = self.leases.remove(id);
        if let Some(addr) = released {
            tracing::debug!(container_id = %id, address = %addr, "Released container address");
        }
        released
    }

    /// Number of leased addresses
    #[must_use]
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    /// Whether nothing is leased
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    /// Host addresses after the gateway, then the ones before it
    fn candidates(&self) -> impl Iterator<Item = Ipv4Addr> {
        let first = self.subnet.network().to_bits() + 1;
        let last = self.subnet.broadcast().to_bits() - 1;
        let gateway = self.gateway.to_bits();

        (gateway + 1..=last)
            .chain(first..gateway)
            .map(Ipv4Addr::from_bits)
    }
}
