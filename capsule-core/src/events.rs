//! Container lifecycle events with structured tracing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::{ContainerExit, ContainerId, ProcessId};

/// Events emitted during a container launch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContainerEvent {
    /// Launch requested, host-side preparation starting
    Created {
        /// Container ID
        id: ContainerId,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Isolated child spawned
    Started {
        /// Container ID
        id: ContainerId,
        /// Child PID in the host namespace
        pid: ProcessId,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Peer interface moved into the child's network namespace
    NetworkAttached {
        /// Container ID
        id: ContainerId,
        /// Interface handed over
        interface: String,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Child reaped
    Exited {
        /// Container ID
        id: ContainerId,
        /// Classified termination
        exit: ContainerExit,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Error occurred
    Error {
        /// Container ID
        id: ContainerId,
        /// Error message
        message: String,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },
}

impl ContainerEvent {
    /// Launch requested
    #[must_use]
    pub fn created(id: &ContainerId) -> Self {
        Self::Created {
            id: id.clone(),
            timestamp: SystemTime::now(),
        }
    }

    /// Child spawned
    #[must_use]
    pub fn started(id: &ContainerId, pid: ProcessId) -> Self {
        Self::Started {
            id: id.clone(),
            pid,
            timestamp: SystemTime::now(),
        }
    }

    /// Peer interface handed over
    #[must_use]
    pub fn network_attached(id: &ContainerId, interface: impl Into<String>) -> Self {
        Self::NetworkAttached {
            id: id.clone(),
            interface: interface.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Child reaped
    #[must_use]
    pub fn exited(id: &ContainerId, exit: ContainerExit) -> Self {
        Self::Exited {
            id: id.clone(),
            exit,
            timestamp: SystemTime::now(),
        }
    }

    /// Launch failed
    #[must_use]
    pub fn error(id: &ContainerId, message: impl fmt::Display) -> Self {
        Self::Error {
            id: id.clone(),
            message: message.to_string(),
            timestamp: SystemTime::now(),
        }
    }

    /// Get the container ID from any event
    #[must_use]
    pub const fn container_id(&self) -> &ContainerId {
        match self {
            Self::Created { id, .. }
            | Self::Started { id, .. }
            | Self::NetworkAttached { id, .. }
            | Self::Exited { id, .. }
            | Self::Error { id, .. } => id,
        }
    }

    /// Get the timestamp from any event
    #[must_use]
    pub const fn timestamp(&self) -> SystemTime {
        match self {
            Self::Created { timestamp, .. }
            | Self::Started { timestamp, .. }
            | Self::NetworkAttached { timestamp, .. }
            | Self::Exited { timestamp, .. }
            | Self::Error { timestamp, .. } => *timestamp,
        }
    }

    /// Check if this is a critical event
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        match self {
            Self::Error { .. } => true,
            Self::Exited { exit, .. } => {
                matches!(
                    exit,
                    ContainerExit::BootstrapFailed | ContainerExit::ExecFailed { .. }
                )
            }
            _ => false,
        }
    }

    /// Emit structured tracing event
    pub fn emit_trace(&self) {
        match self {
            Self::Created { id, .. } => {
                tracing::info!(container_id = %id, event = "created", "Container created");
            }
            Self::Started { id, pid, .. } => {
                tracing::info!(
                    container_id = %id,
                    pid = %pid,
                    event = "started",
                    "Container started"
                );
            }
            Self::NetworkAttached { id, interface, .. } => {
                tracing::debug!(
                    container_id = %id,
                    interface = %interface,
                    event = "network_attached",
                    "Network peer attached"
                );
            }
            Self::Exited { id, exit, .. } => {
                if self.is_critical() {
                    tracing::warn!(
                        container_id = %id,
                        exit_code = exit.exit_code(),
                        event = "exited",
                        "Container {exit}"
                    );
                } else {
                    tracing::info!(
                        container_id = %id,
                        exit_code = exit.exit_code(),
                        event = "exited",
                        "Container {exit}"
                    );
                }
            }
            Self::Error { id, message, .. } => {
                tracing::error!(
                    container_id = %id,
                    message = %message,
                    event = "error",
                    "Container error"
                );
            }
        }
    }
}

impl fmt::Display for ContainerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { id, .. } => write!(f, "Container {id} created"),
            Self::Started { id, pid, .. } => write!(f, "Container {id} started as PID {pid}"),
            Self::NetworkAttached { id, interface, .. } => {
                write!(f, "Container {id} attached to {interface}")
            }
            Self::Exited { id, exit, .. } => write!(f, "Container {id} {exit}"),
            Self::Error { id, message, .. } => write!(f, "Container {id} error: {message}"),
        }
    }
}

// Seconds since the epoch
mod systemtime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(since_epoch.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + std::time::Duration::from_secs(secs))
    }
}
