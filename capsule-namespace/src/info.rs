//! Namespace identity inspection through `/proc/<pid>/ns`

use std::fmt;

use capsule_core::{Error, ProcessId, Result};

use crate::config::NamespaceKind;

/// Namespace identifiers of one process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceInfo {
    /// PID namespace ID
    pub pid: Option<String>,
    /// Network namespace ID
    pub net: Option<String>,
    /// Mount namespace ID
    pub mnt: Option<String>,
    /// UTS namespace ID
    pub uts: Option<String>,
    /// IPC namespace ID
    pub ipc: Option<String>,
}

impl NamespaceInfo {
    /// Namespace IDs of the current process
    ///
    /// # Errors
    /// Returns error if `/proc/self/ns` cannot be read
    pub fn current() -> Result<Self> {
        Self::for_pid(ProcessId::current())
    }

    /// Namespace IDs for a specific PID
    ///
    /// # Errors
    /// Returns error if the process has no readable namespace links
    pub fn for_pid(pid: ProcessId) -> Result<Self> {
        let base_path = format!("/proc/{pid}/ns");

        let read_ns = |name: &str| -> Option<String> {
            std::fs::read_link(format!("{base_path}/{name}"))
                .map(|p| p.to_string_lossy().into_owned())
                .ok()
        };

        let info = Self {
            pid: read_ns("pid"),
            net: read_ns("net"),
            mnt: read_ns("mnt"),
            uts: read_ns("uts"),
            ipc: read_ns("ipc"),
        };

        if info == Self::default() {
            return Err(Error::Namespace {
                message: format!("Cannot read namespaces of PID {pid}"),
            });
        }

        Ok(info)
    }

    /// Identifier for one namespace kind
    #[must_use]
    pub fn get(&self, kind: NamespaceKind) -> Option<&str> {
        let id = match kind {
            NamespaceKind::Pid => &self.pid,
            NamespaceKind::Network => &self.net,
            NamespaceKind::Mount => &self.mnt,
            NamespaceKind::Uts => &self.uts,
            NamespaceKind::Ipc => &self.ipc,
        };
        id.as_deref()
    }

    /// Namespace kinds that are known for both processes and not shared
    #[must_use]
    pub fn isolated_from(&self, other: &Self) -> Vec<NamespaceKind> {
        NamespaceKind::ALL
            .into_iter()
            .filter(|kind| match (self.get(*kind), other.get(*kind)) {
                (Some(a), Some(b)) => a != b,
                _ => false,
            })
            .collect()
    }
}

impl fmt::Display for NamespaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Namespace Info:")?;
        for kind in NamespaceKind::ALL {
            if let Some(id) = self.get(kind) {
                writeln!(f, "  {:<4} {id}", kind.proc_name().to_uppercase())?;
            }
        }
        Ok(())
    }
}
