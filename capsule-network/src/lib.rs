//! Virtual ethernet attachment for containers
//!
//! The host creates a veth pair, keeps one end on a pre-existing bridge and
//! moves the other into the container's network namespace. The container
//! then brings its end up, assigns its address and routes through the
//! bridge-side gateway.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod allocator;
pub mod config;
pub mod container;
pub mod coordinator;
pub mod iface;
pub mod link;

pub use allocator::AddressAllocator;
pub use config::{Ipv4Cidr, NetworkConfig};
pub use container::ContainerNetwork;
pub use coordinator::{LinkState, NetworkCoordinator};
pub use link::{IpCommand, LinkDriver};
