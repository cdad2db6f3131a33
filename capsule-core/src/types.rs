//! Core type definitions with strong typing and validation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Exit codes the container's init process uses to report its own failures
pub mod exit_codes {
    /// A namespace, root filesystem, handshake, or network step failed
    pub const BOOTSTRAP_FAILURE: i32 = 125;
    /// The command exists but could not be executed
    pub const EXEC_FAILURE: i32 = 126;
    /// The command was not found inside the container
    pub const COMMAND_NOT_FOUND: i32 = 127;
    /// Offset added to a signal number when a process is killed by it
    pub const SIGNAL_OFFSET: i32 = 128;
}

/// Container identifier with validation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    /// Maximum length for container IDs
    pub const MAX_LENGTH: usize = 64;

    /// Create a new `ContainerId` with validation
    ///
    /// # Errors
    /// Returns error if ID is invalid (empty, too long, or contains invalid characters)
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Identifier derived from the launching process, unique per host run
    #[must_use]
    pub fn for_current_process() -> Self {
        Self(format!("capsule-{}", std::process::id()))
    }

    fn validate(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::invalid_config("Container ID cannot be empty"));
        }

        if id.len() > Self::MAX_LENGTH {
            return Err(Error::invalid_config(format!(
                "Container ID too long (max {} chars)",
                Self::MAX_LENGTH
            )));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::invalid_config(
                "Container ID can only contain alphanumeric, dash, and underscore",
            ));
        }

        Ok(())
    }

    /// Get the container ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContainerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ProcessId(i32);

impl ProcessId {
    /// Create from raw PID
    #[must_use]
    pub const fn from_raw(pid: i32) -> Self {
        Self(pid)
    }

    /// Get the current process ID
    #[must_use]
    pub fn current() -> Self {
        Self(nix::unistd::getpid().as_raw())
    }

    /// Convert to `nix::unistd::Pid`
    #[must_use]
    pub const fn as_nix_pid(self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.0)
    }

    /// Get raw PID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<nix::unistd::Pid> for ProcessId {
    fn from(pid: nix::unistd::Pid) -> Self {
        Self(pid.as_raw())
    }
}

impl From<ProcessId> for nix::unistd::Pid {
    fn from(pid: ProcessId) -> Self {
        Self::from_raw(pid.0)
    }
}

/// Lifecycle of a single container launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    /// Configured, child not spawned yet
    Created,
    /// Child spawned and not reaped
    Running,
    /// Child reaped by the host
    Terminated,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Raw termination status observed by the host's wait call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExitStatus {
    /// Process called exit with this code
    Exited(i32),
    /// Process was killed by this signal number
    Signaled(i32),
}

/// Container termination mapped through the launcher's exit taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContainerExit {
    /// The workload ran and exited on its own
    Normal {
        /// Workload exit code
        code: i32,
    },
    /// The workload was killed by a signal
    Signaled {
        /// Signal number
        signal: i32,
    },
    /// The container never reached exec
    BootstrapFailed,
    /// The target command could not be executed
    ExecFailed {
        /// 126 (not executable) or 127 (not found)
        code: i32,
    },
}

impl ContainerExit {
    /// Exit code the host process should terminate with
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Normal { code } | Self::ExecFailed { code } => code,
            Self::Signaled { signal } => exit_codes::SIGNAL_OFFSET + signal,
            Self::BootstrapFailed => exit_codes::BOOTSTRAP_FAILURE,
        }
    }

    /// Whether the workload ran and exited with status 0
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Normal { code: 0 })
    }
}

// A workload that exits 125-127 on its own is indistinguishable from a
// launcher failure here and gets the failure label. The exit code passes
// through unchanged either way.
impl From<ExitStatus> for ContainerExit {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Exited(exit_codes::BOOTSTRAP_FAILURE) => Self::BootstrapFailed,
            ExitStatus::Exited(
                code @ (exit_codes::EXEC_FAILURE | exit_codes::COMMAND_NOT_FOUND),
            ) => Self::ExecFailed { code },
            ExitStatus::Exited(code) => Self::Normal { code },
            ExitStatus::Signaled(signal) => Self::Signaled { signal },
        }
    }
}

impl fmt::Display for ContainerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal { code } => write!(f, "exited with code {code}"),
            Self::Signaled { signal } => write!(f, "killed by signal {signal}"),
            Self::BootstrapFailed => write!(f, "bootstrap failed"),
            Self::ExecFailed { code } => write!(f, "exec failed (code {code})"),
        }
    }
}
