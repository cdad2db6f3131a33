//! Capsule Core - Foundation types, events, and errors
//!
//! This crate provides the core abstractions shared by the namespace,
//! network, and CLI crates.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
pub use events::ContainerEvent;
pub use types::{ContainerExit, ContainerId, ContainerState, ExitStatus, ProcessId, exit_codes};
