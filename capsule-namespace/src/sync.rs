//! Host/child handshake
//!
//! Two pipes carry one byte each way:
//!
//! 1. the child writes `READY` as soon as it runs, i.e. once its network
//!    namespace exists;
//! 2. the host moves the peer interface into that namespace and writes
//!    `ATTACHED`;
//! 3. the child blocks on `ATTACHED` before configuring the interface.
//!
//! A side that goes away closes its pipe ends, so the other side sees
//! end-of-file instead of blocking forever.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use capsule_core::{Error, Result};
use nix::fcntl::OFlag;
use nix::unistd::pipe2;

const READY: u8 = b'R';
const ATTACHED: u8 = b'A';

/// Create a connected pair of handshake ends
///
/// Both pipes are close-on-exec so neither end leaks into the workload.
///
/// # Errors
/// Returns error if the pipes cannot be created
pub fn handshake() -> Result<(HostEnd, ChildEnd)> {
    let (host_read, child_write) = pipe2(OFlag::O_CLOEXEC)?;
    let (child_read, host_write) = pipe2(OFlag::O_CLOEXEC)?;

    let host = HostEnd {
        from_child: File::from(host_read),
        to_child: File::from(host_write),
    };
    let child = ChildEnd {
        from_host: File::from(child_read),
        to_host: File::from(child_write),
    };

    Ok((host, child))
}

/// Host side of the handshake
#[derive(Debug)]
pub struct HostEnd {
    from_child: File,
    to_child: File,
}

impl HostEnd {
    /// Block until the child reports that its namespaces exist
    ///
    /// # Errors
    /// Returns error if the child exits or closes its end first
    pub fn wait_ready(&mut self) -> Result<()> {
        tracing::debug!("Waiting for child to report READY");
        expect_message(&mut self.from_child, READY, "READY")
    }

    /// Tell the child its network peer is in place
    ///
    /// Consumes the end; the pipes close when it drops.
    ///
    /// # Errors
    /// Returns error if the child already closed its end
    pub fn signal_attached(mut self) -> Result<()> {
        tracing::debug!("Signalling ATTACHED to child");
        send_message(&mut self.to_child, ATTACHED, "ATTACHED")
    }

    /// Raw descriptors the child inherits and must close
    #[must_use]
    pub fn raw_fds(&self) -> [RawFd; 2] {
        [self.from_child.as_raw_fd(), self.to_child.as_raw_fd()]
    }
}

/// Child side of the handshake
#[derive(Debug)]
pub struct ChildEnd {
    from_host: File,
    to_host: File,
}

impl ChildEnd {
    /// Report that the child is running inside its namespaces
    ///
    /// # Errors
    /// Returns error if the host closed its end
    pub fn signal_ready(&mut self) -> Result<()> {
        send_message(&mut self.to_host, READY, "READY")
    }

    /// Block until the host has moved the network peer into our namespace
    ///
    /// # Errors
    /// Returns error if the host closes its end without sending `ATTACHED`
    pub fn wait_attached(&mut self) -> Result<()> {
        expect_message(&mut self.from_host, ATTACHED, "ATTACHED")
    }

    /// Raw descriptors the host holds and must close
    #[must_use]
    pub fn raw_fds(&self) -> [RawFd; 2] {
        [self.from_host.as_raw_fd(), self.to_host.as_raw_fd()]
    }
}

/// Close descriptors duplicated into this process by clone(2)
///
/// # Safety
/// The descriptors must be open in this process and owned by nothing that
/// will close them again. This holds for the other side's pipe ends in the
/// freshly cloned child, whose owning values are never dropped there.
pub unsafe fn close_inherited(fds: [RawFd; 2]) {
    for fd in fds {
        // SAFETY: guaranteed by the caller
        drop(unsafe { OwnedFd::from_raw_fd(fd) });
    }
}

fn send_message(pipe: &mut File, message: u8, name: &str) -> Result<()> {
    pipe.write_all(&[message]).map_err(|e| Error::Handshake {
        message: format!("Failed to send {name}: {e}"),
    })
}

fn expect_message(pipe: &mut File, expected: u8, name: &str) -> Result<()> {
    let mut buf = [0u8; 1];

    match pipe.read_exact(&mut buf) {
        Ok(()) if buf[0] == expected => Ok(()),
        Ok(()) => Err(Error::Handshake {
            message: format!("Expected {name}, got byte {:#04x}", buf[0]),
        }),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(Error::Handshake {
            message: format!("Peer closed the channel before {name}"),
        }),
        Err(e) => Err(Error::Handshake {
            message: format!("Failed to receive {name}: {e}"),
        }),
    }
}
