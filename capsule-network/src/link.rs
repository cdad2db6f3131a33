//! Host-side link management through iproute2

use std::ffi::OsString;
use std::process::Command;

use capsule_core::{Error, ProcessId, Result};
use serde::Deserialize;

/// Host-side link operations the coordinator needs
pub trait LinkDriver {
    /// Whether a link with this name exists in the host namespace
    fn link_exists(&self, name: &str) -> bool;

    /// Driver kind of an existing link (`veth`, `bridge`, ...), `None` for
    /// physical devices
    fn link_kind(&self, name: &str) -> Result<Option<String>>;

    /// Create a veth pair
    fn create_veth_pair(&self, host: &str, peer: &str) -> Result<()>;

    /// Bring a link up
    fn set_link_up(&self, name: &str) -> Result<()>;

    /// Enslave a link to a bridge
    fn set_master(&self, name: &str, bridge: &str) -> Result<()>;

    /// Move a link into the network namespace of `pid`
    fn move_to_netns(&self, name: &str, pid: ProcessId) -> Result<()>;

    /// Delete a link (for a veth end, both ends go)
    fn delete_link(&self, name: &str) -> Result<()>;
}

/// [`LinkDriver`] backed by the `ip` command
#[derive(Debug, Clone)]
pub struct IpCommand {
    program: OsString,
}

impl Default for IpCommand {
    fn default() -> Self {
        Self {
            program: OsString::from("ip"),
        }
    }
}

impl IpCommand {
    /// Use `ip` from `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `ip` binary
    #[must_use]
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        self.query(args).map(drop)
    }

    fn query(&self, args: &[&str]) -> Result<Vec<u8>> {
        tracing::trace!(args = ?args, "Running ip");

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| Error::network(format!("Failed to execute ip {}: {e}", args.join(" "))))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::network(format!(
                "ip {} failed ({}): {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

// Subset of `ip -json -details link show`
#[derive(Debug, Deserialize)]
struct LinkDetails {
    #[serde(default)]
    linkinfo: Option<LinkInfo>,
}

#[derive(Debug, Deserialize)]
struct LinkInfo {
    #[serde(default)]
    info_kind: Option<String>,
}

fn parse_link_kind(name: &str, json: &[u8]) -> Result<Option<String>> {
    let links: Vec<LinkDetails> = serde_json::from_slice(json)
        .map_err(|e| Error::network(format!("Unexpected ip output for {name}: {e}")))?;

    let link = links
        .into_iter()
        .next()
        .ok_or_else(|| Error::network(format!("Link {name} not found")))?;

    Ok(link.linkinfo.and_then(|info| info.info_kind))
}

impl LinkDriver for IpCommand {
    fn link_exists(&self, name: &str) -> bool {
        Command::new(&self.program)
            .args(["link", "show", name])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn link_kind(&self, name: &str) -> Result<Option<String>> {
        let json = self.query(&["-json", "-details", "link", "show", name])?;
        parse_link_kind(name, &json)
    }

    fn create_veth_pair(&self, host: &str, peer: &str) -> Result<()> {
        self.run(&["link", "add", host, "type", "veth", "peer", "name", peer])
    }

    fn set_link_up(&self, name: &str) -> Result<()> {
        self.run(&["link", "set", name, "up"])
    }

    fn set_master(&self, name: &str, bridge: &str) -> Result<()> {
        self.run(&["link", "set", name, "master", bridge])
    }

    fn move_to_netns(&self, name: &str, pid: ProcessId) -> Result<()> {
        self.run(&["link", "set", name, "netns", &pid.to_string()])
    }

    fn delete_link(&self, name: &str) -> Result<()> {
        self.run(&["link", "delete", name])
    }
}
