//! Namespace isolation and process lifecycle for containers
//!
//! This crate covers everything about the container process itself:
//! - Process lifecycle - clone(2) into new namespaces, wait, reap
//! - Root bootstrap - private mounts, `pivot_root`, fresh `/proc`, hostname
//! - Handshake - READY/ATTACHED ordering between host and child
//! - Command execution - the final execvp(3)

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod bootstrap;
pub mod command;
pub mod config;
pub mod info;
pub mod process;
pub mod rootfs;
pub mod sync;

pub use bootstrap::{BootstrapStep, Bootstrapper, detach_mount_namespace};
pub use command::{exec_command, exit_code_for};
pub use config::{NamespaceConfig, NamespaceKind};
pub use info::NamespaceInfo;
pub use process::{ContainerProcess, STACK_SIZE};
pub use rootfs::RootFilesystem;
pub use sync::{ChildEnd, HostEnd, handshake};
