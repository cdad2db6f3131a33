//! Host-side half of the network attachment

use capsule_core::{Error, ProcessId, Result};

use crate::config::NetworkConfig;
use crate::container::ContainerNetwork;
use crate::link::{IpCommand, LinkDriver};

/// Where the host side of the link is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Nothing created yet
    Absent,
    /// veth pair exists, host end up and on the bridge
    Prepared,
    /// Peer end handed to the container's network namespace
    Attached {
        /// Container the peer now belongs to
        pid: ProcessId,
    },
}

/// Creates the veth pair on the host and hands the peer to the container
#[derive(Debug)]
pub struct NetworkCoordinator<D = IpCommand> {
    config: NetworkConfig,
    driver: D,
    state: LinkState,
}

impl NetworkCoordinator<IpCommand> {
    /// Coordinator driving the host through `ip`
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self::with_driver(config, IpCommand::new())
    }
}

impl<D: LinkDriver> NetworkCoordinator<D> {
    /// Coordinator with a custom link driver
    #[must_use]
    pub const fn with_driver(config: NetworkConfig, driver: D) -> Self {
        Self {
            config,
            driver,
            state: LinkState::Absent,
        }
    }

    /// Network configuration
    #[must_use]
    pub const fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Link driver
    #[must_use]
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    /// Current host-side state
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// Settings the container applies to its end
    #[must_use]
    pub fn container_network(&self) -> ContainerNetwork {
        ContainerNetwork {
            interface: self.config.peer_interface.clone(),
            address: self.config.address,
            gateway: self.config.gateway,
        }
    }

    /// Create the veth pair, bring the host end up and put it on the bridge
    ///
    /// Must run before the container is cloned. A veth left over with the
    /// host-side name is removed first; any other kind of link with that
    /// name is left alone and the call fails. If a later step fails the
    /// pair is deleted again.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid, the bridge is missing,
    /// the host-side name belongs to a non-veth link, or an `ip` call fails
    pub fn prepare_host(&mut self) -> Result<()> {
        if self.state != LinkState::Absent {
            return Err(Error::network("Host link already prepared"));
        }

        self.config.validate()?;
        let NetworkConfig {
            bridge,
            host_interface: host,
            peer_interface: peer,
            ..
        } = &self.config;

        if !self.driver.link_exists(bridge) {
            return Err(Error::network(format!("Bridge '{bridge}' does not exist")));
        }

        if self.driver.link_exists(host) {
            match self.driver.link_kind(host)?.as_deref() {
                Some("veth") => {
                    tracing::warn!(interface = %host, "Removing stale veth link");
                    self.driver.delete_link(host)?;
                }
                kind => {
                    return Err(Error::network(format!(
                        "Link '{host}' already exists and is not a veth ({})",
                        kind.unwrap_or("physical device")
                    )));
                }
            }
        }

        tracing::debug!(host = %host, peer = %peer, bridge = %bridge, "Creating veth pair");
        self.driver.create_veth_pair(host, peer)?;

        let attached = self
            .driver
            .set_link_up(host)
            .and_then(|()| self.driver.set_master(host, bridge));

        if let Err(e) = attached {
            self.delete_pair();
            return Err(e);
        }

        self.state = LinkState::Prepared;
        tracing::info!(interface = %host, bridge = %bridge, "Host link ready");
        Ok(())
    }

    /// Move the peer end into the network namespace of `pid`
    ///
    /// Must run after the child exists and before it configures the
    /// interface. Happens at most once.
    ///
    /// # Errors
    /// Returns error if the host link is not prepared or the move fails
    pub fn attach_peer(&mut self, pid: ProcessId) -> Result<()> {
        match self.state {
            LinkState::Prepared => {}
            LinkState::Absent => return Err(Error::network("Host link not prepared")),
            LinkState::Attached { pid: owner } => {
                return Err(Error::network(format!(
                    "Peer {} already attached to PID {owner}",
                    self.config.peer_interface
                )));
            }
        }

        let peer = &self.config.peer_interface;
        tracing::debug!(interface = %peer, pid = %pid, "Moving peer into container namespace");
        self.driver.move_to_netns(peer, pid)?;

        self.state = LinkState::Attached { pid };
        Ok(())
    }

    /// Remove the veth pair after a failed launch
    ///
    /// Best effort: failures are logged, not returned. After a normal exit
    /// there is nothing to do, the kernel drops the pair along with the
    /// container's network namespace.
    pub fn teardown(&mut self) {
        if self.state != LinkState::Absent {
            self.delete_pair();
            self.state = LinkState::Absent;
        }
    }

    fn delete_pair(&self) {
        let host = &self.config.host_interface;
        if let Err(e) = self.driver.delete_link(host) {
            tracing::warn!(interface = %host, error = %e, "Failed to delete veth pair");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct RecordingDriver {
        // name -> kind, `None` for physical devices
        links: RefCell<HashMap<String, Option<String>>>,
        calls: RefCell<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingDriver {
        fn with_links(links: &[(&str, Option<&str>)]) -> Self {
            let driver = Self::default();
            driver.links.borrow_mut().extend(
                links
                    .iter()
                    .map(|(name, kind)| ((*name).to_string(), kind.map(ToString::to_string))),
            );
            driver
        }

        fn record(&self, call: String) -> Result<()> {
            let op = call.split(' ').next().unwrap_or_default().to_string();
            self.calls.borrow_mut().push(call);
            if self.fail_on == Some(op.as_str()) {
                return Err(Error::network(format!("{op} failed")));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl LinkDriver for RecordingDriver {
        fn link_exists(&self, name: &str) -> bool {
            self.links.borrow().contains_key(name)
        }

        fn link_kind(&self, name: &str) -> Result<Option<String>> {
            self.links
                .borrow()
                .get(name)
                .cloned()
                .ok_or_else(|| Error::network(format!("Link {name} not found")))
        }

        fn create_veth_pair(&self, host: &str, peer: &str) -> Result<()> {
            self.record(format!("create {host} {peer}"))?;
            let veth = Some("veth".to_string());
            self.links
                .borrow_mut()
                .extend([(host.to_string(), veth.clone()), (peer.to_string(), veth)]);
            Ok(())
        }

        fn set_link_up(&self, name: &str) -> Result<()> {
            self.record(format!("up {name}"))
        }

        fn set_master(&self, name: &str, bridge: &str) -> Result<()> {
            self.record(format!("master {name} {bridge}"))
        }

        fn move_to_netns(&self, name: &str, pid: ProcessId) -> Result<()> {
            self.record(format!("netns {name} {pid}"))?;
            self.links.borrow_mut().remove(name);
            Ok(())
        }

        fn delete_link(&self, name: &str) -> Result<()> {
            self.record(format!("delete {name}"))?;
            self.links.borrow_mut().remove(name);
            Ok(())
        }
    }

    const BRIDGE: (&str, Option<&str>) = ("br0", Some("bridge"));

    fn coordinator(driver: RecordingDriver) -> NetworkCoordinator<RecordingDriver> {
        NetworkCoordinator::with_driver(NetworkConfig::default(), driver)
    }

    #[test]
    fn test_host_setup_order() {
        let mut net = coordinator(RecordingDriver::with_links(&[BRIDGE]));

        net.prepare_host().unwrap();
        net.attach_peer(ProcessId::from_raw(4242)).unwrap();

        assert_eq!(
            net.driver().calls(),
            vec![
                "create veth0 veth1",
                "up veth0",
                "master veth0 br0",
                "netns veth1 4242",
            ]
        );
        assert_eq!(
            net.state(),
            LinkState::Attached {
                pid: ProcessId::from_raw(4242)
            }
        );
        assert!(!net.driver().link_exists("veth1"));
    }

    #[test]
    fn test_missing_bridge_fails_before_any_change() {
        let mut net = coordinator(RecordingDriver::default());
        let err = net.prepare_host().unwrap_err();

        assert!(err.to_string().contains("Bridge 'br0' does not exist"));
        assert!(net.driver().calls().is_empty());
        assert_eq!(net.state(), LinkState::Absent);
    }

    #[test]
    fn test_stale_link_removed_first() {
        let driver = RecordingDriver::with_links(&[BRIDGE, ("veth0", Some("veth"))]);
        let mut net = coordinator(driver);
        net.prepare_host().unwrap();

        assert_eq!(net.driver().calls()[0], "delete veth0");
        assert_eq!(net.driver().calls()[1], "create veth0 veth1");
    }

    #[test]
    fn test_existing_non_veth_link_is_never_deleted() {
        for kind in [Some("bridge"), None] {
            let config = NetworkConfig::new().with_interfaces("uplink0", "veth1");
            let driver = RecordingDriver::with_links(&[BRIDGE, ("uplink0", kind)]);
            let mut net = NetworkCoordinator::with_driver(config, driver);

            let err = net.prepare_host().unwrap_err();

            assert!(err.to_string().contains("not a veth"));
            assert!(net.driver().calls().is_empty());
            assert!(net.driver().link_exists("uplink0"));
            assert_eq!(net.state(), LinkState::Absent);
        }
    }

    #[test]
    fn test_bridge_name_as_host_end_is_rejected() {
        let config = NetworkConfig::new().with_interfaces("br0", "veth1");
        let driver = RecordingDriver::with_links(&[BRIDGE]);
        let mut net = NetworkCoordinator::with_driver(config, driver);

        assert!(net.prepare_host().is_err());
        assert!(net.driver().calls().is_empty());
        assert!(net.driver().link_exists("br0"));
    }

    #[test]
    fn test_failed_bridge_attach_removes_pair() {
        let driver = RecordingDriver {
            fail_on: Some("master"),
            ..RecordingDriver::with_links(&[BRIDGE])
        };
        let mut net = coordinator(driver);

        assert!(net.prepare_host().is_err());
        assert_eq!(net.driver().calls().last().unwrap(), "delete veth0");
        assert!(!net.driver().link_exists("veth0"));
        assert_eq!(net.state(), LinkState::Absent);
    }

    #[test]
    fn test_attach_requires_prepared_link_and_happens_once() {
        let mut net = coordinator(RecordingDriver::with_links(&[BRIDGE]));
        let pid = ProcessId::from_raw(7);

        assert!(net.attach_peer(pid).is_err());

        net.prepare_host().unwrap();
        net.attach_peer(pid).unwrap();
        let err = net.attach_peer(pid).unwrap_err();

        assert!(err.to_string().contains("already attached"));
    }

    #[test]
    fn test_teardown_after_failed_launch() {
        let mut net = coordinator(RecordingDriver::with_links(&[BRIDGE]));

        net.teardown();
        assert!(net.driver().calls().is_empty());

        net.prepare_host().unwrap();
        net.teardown();
        assert_eq!(net.driver().calls().last().unwrap(), "delete veth0");
        assert_eq!(net.state(), LinkState::Absent);
    }

    #[test]
    fn test_container_network_mirrors_config() {
        let net = coordinator(RecordingDriver::default());
        let child = net.container_network();

        assert_eq!(child.interface, "veth1");
        assert_eq!(child.address.to_string(), "172.16.0.101/24");
        assert_eq!(child.gateway.to_string(), "172.16.0.100");
    }
}
