//! Namespace configuration

use std::fmt;

use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};

/// Hostname given to the container when none is configured
pub const DEFAULT_HOSTNAME: &str = "capsule";

/// Kernel namespaces a container is isolated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceKind {
    /// Mount table
    Mount,
    /// Hostname and domain name
    Uts,
    /// Process tree
    Pid,
    /// System V IPC and POSIX message queues
    Ipc,
    /// Network stack
    Network,
}

impl NamespaceKind {
    /// Every namespace a container gets, in clone(2) flag order
    pub const ALL: [Self; 5] = [Self::Mount, Self::Uts, Self::Pid, Self::Ipc, Self::Network];

    /// The clone(2) flag creating this namespace
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Mount => CloneFlags::CLONE_NEWNS,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Network => CloneFlags::CLONE_NEWNET,
        }
    }

    /// Name of the namespace link under `/proc/<pid>/ns`
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Mount => "mnt",
            Self::Uts => "uts",
            Self::Pid => "pid",
            Self::Ipc => "ipc",
            Self::Network => "net",
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proc_name())
    }
}

/// Namespace configuration
///
/// The set of namespaces is fixed; only the UTS identity is configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Hostname for UTS namespace
    pub hostname: String,

    /// Domain name for UTS namespace
    pub domainname: Option<String>,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            domainname: None,
        }
    }
}

impl NamespaceConfig {
    /// Create a new namespace configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set hostname for UTS namespace
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set domain name for UTS namespace
    #[must_use]
    pub fn with_domainname(mut self, domainname: impl Into<String>) -> Self {
        self.domainname = Some(domainname.into());
        self
    }

    /// Namespaces the container is created in
    #[must_use]
    pub const fn kinds(&self) -> &'static [NamespaceKind] {
        &NamespaceKind::ALL
    }

    /// Convert to clone flags for clone(2)
    #[must_use]
    pub fn to_clone_flags(&self) -> CloneFlags {
        self.kinds()
            .iter()
            .fold(CloneFlags::empty(), |flags, kind| flags | kind.clone_flag())
    }

    /// Get list of enabled namespace names
    #[must_use]
    pub fn enabled_namespaces(&self) -> Vec<&'static str> {
        self.kinds().iter().map(|kind| kind.proc_name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NamespaceConfig::default();
        assert_eq!(config.hostname, DEFAULT_HOSTNAME);
        assert!(config.domainname.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = NamespaceConfig::new()
            .with_hostname("test-container")
            .with_domainname("example.com");

        assert_eq!(config.hostname, "test-container");
        assert_eq!(config.domainname.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_clone_flags_conversion() {
        let flags = NamespaceConfig::new().to_clone_flags();

        assert!(flags.contains(CloneFlags::CLONE_NEWNS));
        assert!(flags.contains(CloneFlags::CLONE_NEWUTS));
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWIPC));
        assert!(flags.contains(CloneFlags::CLONE_NEWNET));
        assert!(!flags.contains(CloneFlags::CLONE_NEWUSER));
        assert!(!flags.contains(CloneFlags::CLONE_NEWCGROUP));
    }

    #[test]
    fn test_enabled_namespaces() {
        let enabled = NamespaceConfig::new().enabled_namespaces();

        assert_eq!(enabled, vec!["mnt", "uts", "pid", "ipc", "net"]);
    }
}
