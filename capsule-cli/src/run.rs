//! Container launch: host-side orchestration and the child entry point

use anyhow::{Context, Result};
use capsule_core::{ContainerEvent, ContainerExit, ContainerId, Error, ProcessId, exit_codes};
use capsule_namespace::sync::close_inherited;
use capsule_namespace::{
    Bootstrapper, ChildEnd, ContainerProcess, HostEnd, NamespaceConfig, RootFilesystem,
    exec_command, exit_code_for, handshake,
};
use capsule_network::{
    AddressAllocator, ContainerNetwork, NetworkConfig, NetworkCoordinator, iface,
};
use nix::sys::signal::{Signal, kill};
use std::os::fd::RawFd;
use tracing::{debug, error, info, warn};

use crate::cli::Cli;

pub async fn execute(args: Cli) -> Result<ContainerExit> {
    // Validate we're running as root before touching host state
    if !nix::unistd::geteuid().is_root() {
        return Err(Error::PermissionDenied {
            operation: "container launch".to_string(),
        })
        .context("Must run as root. Try: sudo capsule ...");
    }

    let container_id = match &args.id {
        Some(id) => ContainerId::new(id).context("Invalid container ID")?,
        None => ContainerId::for_current_process(),
    };
    info!(container_id = %container_id, command = ?args.command, "Starting container");

    let rootfs = RootFilesystem::new(&args.rootfs)
        .with_context(|| format!("Invalid root filesystem {}", args.rootfs.display()))?;

    let mut namespaces = NamespaceConfig::new();
    if let Some(hostname) = &args.hostname {
        namespaces = namespaces.with_hostname(hostname);
    }
    if let Some(domainname) = &args.domainname {
        namespaces = namespaces.with_domainname(domainname);
    }

    let mut process = ContainerProcess::new(
        container_id.clone(),
        args.command.clone(),
        namespaces.clone(),
    )?;

    let mut network = if args.no_network {
        info!("Networking disabled, container gets loopback only");
        None
    } else {
        Some(NetworkCoordinator::new(network_config(&args, &container_id)?))
    };

    // === HOST NETWORK (must exist before clone) ===
    if let Some(net) = network.as_mut() {
        net.prepare_host().context("Failed to prepare host network")?;
    }
    ContainerEvent::created(&container_id).emit_trace();

    let (mut host, mut child) = match handshake() {
        Ok(ends) => ends,
        Err(e) => {
            teardown(network.as_mut());
            return Err(e).context("Failed to create handshake pipes");
        }
    };

    let bootstrapper = Bootstrapper::new(rootfs, namespaces);
    let container_net = network.as_ref().map(|net| net.container_network());
    let host_fds = host.raw_fds();
    let command = args.command.clone();

    // === CLONE ===
    let spawned = process.spawn(move || {
        container_main(
            &mut child,
            host_fds,
            &bootstrapper,
            container_net.as_ref(),
            &command,
        ) as isize
    });

    let pid = match spawned {
        Ok(pid) => pid,
        Err(e) => {
            ContainerEvent::error(&container_id, &e).emit_trace();
            teardown(network.as_mut());
            return Err(e.into());
        }
    };
    ContainerEvent::started(&container_id, pid).emit_trace();

    // === HANDSHAKE ===
    if let Err(e) = attach(&mut host, network.as_mut(), pid) {
        ContainerEvent::error(&container_id, &e).emit_trace();
        // Closing our ends makes the child abort instead of configuring
        // an interface that never arrived.
        drop(host);
        teardown(network.as_mut());
        if let Err(reap) = process.await_exit() {
            warn!(pid = %pid, error = %reap, "Failed to reap container");
        }
        return Err(e).context("Failed to attach container network");
    }

    if let Some(net) = &network {
        ContainerEvent::network_attached(&container_id, &net.config().peer_interface)
            .emit_trace();
    }
    if let Err(e) = host.signal_attached() {
        // The child is already gone; its exit status says why.
        warn!(pid = %pid, error = %e, "Container closed the handshake early");
    }

    // === WAIT ===
    let exit = wait_with_forwarding(process, pid).await?;
    ContainerEvent::exited(&container_id, exit).emit_trace();

    if exit.is_success() {
        info!("Container stopped successfully");
    } else {
        warn!(%exit, "Container did not exit cleanly");
    }

    Ok(exit)
}

fn network_config(args: &Cli, id: &ContainerId) -> Result<NetworkConfig> {
    let address = match args.address {
        Some(address) => address,
        None => AddressAllocator::new(args.subnet, args.gateway)
            .context("Invalid subnet or gateway")?
            .allocate(id)
            .context("Failed to allocate container address")?,
    };

    let config = NetworkConfig::new()
        .with_bridge(&args.bridge)
        .with_interfaces(&args.host_veth, &args.peer_veth)
        .with_address(address)
        .with_gateway(args.gateway);

    debug!(
        bridge = %config.bridge,
        host = %config.host_interface,
        peer = %config.peer_interface,
        address = %config.address,
        gateway = %config.gateway,
        "Network configuration"
    );

    Ok(config)
}

/// Wait for READY, then hand the peer interface to the child's namespace
fn attach(
    host: &mut HostEnd,
    network: Option<&mut NetworkCoordinator>,
    pid: ProcessId,
) -> capsule_core::Result<()> {
    host.wait_ready()?;
    debug!(pid = %pid, "Container reported READY");

    if let Some(net) = network {
        net.attach_peer(pid)?;
    }
    Ok(())
}

fn teardown(network: Option<&mut NetworkCoordinator>) {
    if let Some(net) = network {
        net.teardown();
    }
}

/// Reap the container on a blocking thread while forwarding Ctrl+C to it
async fn wait_with_forwarding(
    mut process: ContainerProcess,
    pid: ProcessId,
) -> Result<ContainerExit> {
    let mut waiter = tokio::task::spawn_blocking(move || process.await_exit());
    let mut interrupts = 0u32;

    let status = loop {
        tokio::select! {
            joined = &mut waiter => {
                break joined.context("Wait task panicked")??;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                interrupts = interrupts.saturating_add(1);

                let forwarded = forwarded_signal(interrupts);
                info!(pid = %pid, signal = %forwarded, "Forwarding signal to container");
                if forwarded == Signal::SIGTERM {
                    info!("Press Ctrl+C again to kill the container");
                }
                if let Err(e) = kill(pid.as_nix_pid(), forwarded) {
                    warn!(pid = %pid, error = %e, "Failed to signal container");
                }
            }
        }
    };

    Ok(ContainerExit::from(status))
}

/// Signal sent on the n-th Ctrl+C
///
/// The workload is PID 1 of its namespace, so the kernel drops SIGTERM
/// unless it installed a handler. Every Ctrl+C after the first kills it.
const fn forwarded_signal(interrupts: u32) -> Signal {
    if interrupts <= 1 {
        Signal::SIGTERM
    } else {
        Signal::SIGKILL
    }
}

/// Entry point of the cloned child; the return value is its exit code
///
/// Runs in the new namespaces on a copy of the host's memory. Nothing here
/// may unwind back into clone(2), so every failure maps to an exit code.
fn container_main(
    handshake: &mut ChildEnd,
    host_fds: [RawFd; 2],
    bootstrapper: &Bootstrapper,
    network: Option<&ContainerNetwork>,
    command: &[String],
) -> i32 {
    // SAFETY: the host's pipe ends were duplicated by clone(2) and their
    // owning values live on the host's stack, which never runs here.
    unsafe { close_inherited(host_fds) };

    if let Err(e) = handshake.signal_ready() {
        error!(error = %e, "Failed to report READY");
        return exit_codes::BOOTSTRAP_FAILURE;
    }

    if let Err(e) = bootstrapper.run() {
        error!(error = %e, "Container bootstrap failed");
        return exit_codes::BOOTSTRAP_FAILURE;
    }

    if let Err(e) = handshake.wait_attached() {
        error!(error = %e, "Host did not attach the network");
        return exit_codes::BOOTSTRAP_FAILURE;
    }

    let configured = match network {
        Some(network) => network.configure(),
        None => iface::set_link_up("lo"),
    };
    if let Err(e) = configured {
        error!(error = %e, "Container network setup failed");
        return exit_codes::BOOTSTRAP_FAILURE;
    }

    match exec_command(command) {
        Ok(never) => match never {},
        Err(e) => {
            error!(error = %e, "Failed to execute command");
            exit_code_for(&e)
        }
    }
}
