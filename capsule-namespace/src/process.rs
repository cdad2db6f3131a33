//! Process lifecycle: clone the isolated child, track it, reap it
//!
//! This module uses `unsafe` for clone(2), which is inherently unsafe
//! but necessary to create the child directly inside its namespaces.

#![allow(unsafe_code)]

use capsule_core::{ContainerId, ContainerState, Error, ExitStatus, ProcessId, Result};
use nix::errno::Errno;
use nix::sched::{CloneCb, CloneFlags, clone};
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};

use crate::config::NamespaceConfig;

/// Stack reserved for the child's bootstrap routine
pub const STACK_SIZE: usize = 30 * 1024 * 1024;

/// One container launch as seen from the host
#[derive(Debug)]
pub struct ContainerProcess {
    id: ContainerId,
    command: Vec<String>,
    namespaces: NamespaceConfig,
    stack: Option<Vec<u8>>,
    pid: Option<ProcessId>,
    state: ContainerState,
}

impl ContainerProcess {
    /// Describe a container that will run `command`
    ///
    /// # Errors
    /// Returns error if the command vector is empty
    pub fn new(id: ContainerId, command: Vec<String>, namespaces: NamespaceConfig) -> Result<Self> {
        if command.is_empty() || command[0].is_empty() {
            return Err(Error::invalid_config("Command cannot be empty"));
        }

        Ok(Self {
            id,
            command,
            namespaces,
            stack: None,
            pid: None,
            state: ContainerState::Created,
        })
    }

    /// Container ID
    #[must_use]
    pub const fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Command and arguments executed in the container
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Namespace configuration
    #[must_use]
    pub const fn namespaces(&self) -> &NamespaceConfig {
        &self.namespaces
    }

    /// Host-side PID, once spawned
    #[must_use]
    pub const fn pid(&self) -> Option<ProcessId> {
        self.pid
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> ContainerState {
        self.state
    }

    /// Whether the execution stack is still held
    #[must_use]
    pub const fn holds_stack(&self) -> bool {
        self.stack.is_some()
    }

    /// Flags passed to clone(2)
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        self.namespaces.to_clone_flags()
    }

    /// Create the isolated child running `entry`
    ///
    /// The child starts in fresh mount, UTS, PID, IPC and network
    /// namespaces, with `SIGCHLD` delivered to the host when it ends. Its
    /// address space is a copy of ours, so `entry` can use anything it
    /// captured. The return value of `entry` becomes the child's exit code.
    ///
    /// # Errors
    /// Returns [`Error::Spawn`] with the errno if clone(2) fails; nothing has
    /// been changed on the host at that point.
    pub fn spawn<'a, F>(&mut self, entry: F) -> Result<ProcessId>
    where
        F: FnMut() -> isize + 'a,
    {
        if self.state != ContainerState::Created {
            return Err(Error::invalid_config(format!(
                "Container {} cannot be spawned (state: {})",
                self.id, self.state
            )));
        }

        let flags = self.clone_flags();
        tracing::debug!(
            container_id = %self.id,
            namespaces = ?self.namespaces.enabled_namespaces(),
            stack_size = STACK_SIZE,
            "Cloning container process"
        );

        let mut stack = vec![0u8; STACK_SIZE];
        let callback: CloneCb<'a> = Box::new(entry);

        // SAFETY: no CLONE_VM, so the child runs on a private copy of the
        // address space and the stack cannot be freed underneath it.
        let pid = unsafe { clone(callback, &mut stack, flags, Some(Signal::SIGCHLD as i32)) }
            .map_err(|errno| {
                tracing::error!(container_id = %self.id, error = %errno, "clone failed");
                Error::Spawn { errno }
            })?;

        let pid = ProcessId::from(pid);
        self.stack = Some(stack);
        self.pid = Some(pid);
        self.state = ContainerState::Running;

        tracing::debug!(container_id = %self.id, pid = %pid, "Container process cloned");
        Ok(pid)
    }

    /// Send a signal to the running child
    ///
    /// # Errors
    /// Returns error if the child is not running or kill(2) fails
    pub fn signal(&self, signal: Signal) -> Result<()> {
        let pid = self.running_pid()?;
        kill(pid.as_nix_pid(), signal)?;
        Ok(())
    }

    /// Block until the child terminates, reap it, and release its stack
    ///
    /// # Errors
    /// Returns error if the child is not running or waitpid(2) fails
    pub fn await_exit(&mut self) -> Result<ExitStatus> {
        let pid = self.running_pid()?;
        let status = wait_for_exit(pid)?;

        self.state = ContainerState::Terminated;
        self.stack = None;

        Ok(status)
    }

    fn running_pid(&self) -> Result<ProcessId> {
        match (self.state, self.pid) {
            (ContainerState::Running, Some(pid)) => Ok(pid),
            _ => Err(Error::invalid_config(format!(
                "Container {} is not running (state: {})",
                self.id, self.state
            ))),
        }
    }
}

/// Wait for `pid` to exit or be killed
fn wait_for_exit(pid: ProcessId) -> Result<ExitStatus> {
    tracing::debug!(pid = %pid, "Waiting for container to exit");

    loop {
        match waitpid(pid.as_nix_pid(), None) {
            Ok(WaitStatus::Exited(_, code)) => {
                tracing::debug!(pid = %pid, code, "Container exited");
                return Ok(ExitStatus::Exited(code));
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                tracing::debug!(pid = %pid, signal = ?signal, "Container killed by signal");
                return Ok(ExitStatus::Signaled(signal as i32));
            }
            Ok(status) => {
                tracing::debug!(pid = %pid, status = ?status, "Ignoring wait status");
            }
            Err(Errno::EINTR) => {}
            Err(e) => {
                tracing::error!(pid = %pid, error = %e, "Wait failed");
                return Err(e.into());
            }
        }
    }
}
