//! CLI argument definitions

use std::net::Ipv4Addr;
use std::path::PathBuf;

use capsule_network::Ipv4Cidr;
use capsule_network::config::{
    DEFAULT_BRIDGE, DEFAULT_GATEWAY, DEFAULT_HOST_INTERFACE, DEFAULT_PEER_INTERFACE,
    DEFAULT_SUBNET,
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "capsule")]
#[command(about = "Run a command in an isolated container", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Container ID (default: capsule-<pid>)
    #[arg(long)]
    pub id: Option<String>,

    /// Directory that becomes the container's root
    #[arg(long, default_value = "rootfs")]
    pub rootfs: PathBuf,

    /// Hostname inside the container
    #[arg(long)]
    pub hostname: Option<String>,

    /// NIS domain name inside the container
    #[arg(long)]
    pub domainname: Option<String>,

    /// Existing host bridge to attach to
    #[arg(long, default_value = DEFAULT_BRIDGE)]
    pub bridge: String,

    /// Name of the veth end kept on the host
    #[arg(long, default_value = DEFAULT_HOST_INTERFACE)]
    pub host_veth: String,

    /// Name of the veth end moved into the container
    #[arg(long, default_value = DEFAULT_PEER_INTERFACE)]
    pub peer_veth: String,

    /// Subnet container addresses are allocated from
    #[arg(long, default_value_t = DEFAULT_SUBNET)]
    pub subnet: Ipv4Cidr,

    /// Default gateway inside the container
    #[arg(long, default_value_t = DEFAULT_GATEWAY)]
    pub gateway: Ipv4Addr,

    /// Fixed container address, e.g. 172.16.0.101/24
    #[arg(long)]
    pub address: Option<Ipv4Cidr>,

    /// Leave the container with only a loopback device
    #[arg(long, conflicts_with = "address")]
    pub no_network: bool,

    /// Command to run, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}
