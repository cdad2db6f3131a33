//! Namespace and root filesystem bootstrap
//!
//! Runs inside the freshly cloned child. Steps execute strictly in
//! [`BootstrapStep::ORDER`]; the first failure aborts the sequence and no
//! step is retried or undone.

use std::ffi::CString;
use std::fmt;
use std::path::Path;

use capsule_core::{Error, Result};
use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags, mount, umount2};
use nix::sched::{CloneFlags, unshare};
use nix::unistd::{chdir, sethostname};

use crate::config::NamespaceConfig;
use crate::rootfs::RootFilesystem;

/// One step of the child-side bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
    /// Private mount namespace with no propagation back to the host
    DetachMountNamespace,
    /// Lazy unmount of the host's `/proc`
    DropInheritedProc,
    /// Recursive self bind mount of the root filesystem
    BindRootfs,
    /// Directory receiving the old root
    CreateOldRoot,
    /// `pivot_root(2)`
    PivotRoot,
    /// `chdir("/")` inside the new root
    EnterNewRoot,
    /// Lazy unmount and removal of the old root
    DiscardOldRoot,
    /// Fresh `/proc` for the new PID namespace
    MountProc,
    /// Container hostname and domain name
    SetHostname,
}

impl BootstrapStep {
    /// Execution order
    pub const ORDER: [Self; 9] = [
        Self::DetachMountNamespace,
        Self::DropInheritedProc,
        Self::BindRootfs,
        Self::CreateOldRoot,
        Self::PivotRoot,
        Self::EnterNewRoot,
        Self::DiscardOldRoot,
        Self::MountProc,
        Self::SetHostname,
    ];

    /// Short name used in logs and errors
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DetachMountNamespace => "detach-mount-namespace",
            Self::DropInheritedProc => "drop-inherited-proc",
            Self::BindRootfs => "bind-rootfs",
            Self::CreateOldRoot => "create-old-root",
            Self::PivotRoot => "pivot-root",
            Self::EnterNewRoot => "enter-new-root",
            Self::DiscardOldRoot => "discard-old-root",
            Self::MountProc => "mount-proc",
            Self::SetHostname => "set-hostname",
        }
    }
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Child-side namespace and root filesystem bootstrapper
#[derive(Debug, Clone)]
pub struct Bootstrapper {
    rootfs: RootFilesystem,
    config: NamespaceConfig,
}

impl Bootstrapper {
    /// Create a bootstrapper for the given root filesystem
    #[must_use]
    pub const fn new(rootfs: RootFilesystem, config: NamespaceConfig) -> Self {
        Self { rootfs, config }
    }

    /// Root filesystem being switched to
    #[must_use]
    pub const fn rootfs(&self) -> &RootFilesystem {
        &self.rootfs
    }

    /// Run every step in order
    ///
    /// # Errors
    /// Returns [`Error::Bootstrap`] naming the first step that failed
    pub fn run(&self) -> Result<()> {
        tracing::info!(
            rootfs = %self.rootfs.path().display(),
            hostname = %self.config.hostname,
            "Bootstrapping container root"
        );

        for step in BootstrapStep::ORDER {
            self.run_step(step)?;
        }

        tracing::debug!("Container root ready");
        Ok(())
    }

    /// Run a single step
    ///
    /// # Errors
    /// Returns [`Error::Bootstrap`] if the step fails
    pub fn run_step(&self, step: BootstrapStep) -> Result<()> {
        tracing::debug!(step = %step, "Bootstrap step");

        let result = match step {
            BootstrapStep::DetachMountNamespace => detach_mount_namespace(),
            BootstrapStep::DropInheritedProc => drop_inherited_proc(),
            BootstrapStep::BindRootfs => self.rootfs.bind_to_self(),
            BootstrapStep::CreateOldRoot => self.rootfs.create_old_root(),
            BootstrapStep::PivotRoot => self.rootfs.pivot(),
            BootstrapStep::EnterNewRoot => chdir("/").map_err(Error::from),
            BootstrapStep::DiscardOldRoot => RootFilesystem::discard_old_root(),
            BootstrapStep::MountProc => mount_proc(),
            BootstrapStep::SetHostname => self.set_identity(),
        };

        result.map_err(|e| {
            tracing::error!(step = %step, error = %e, "Bootstrap step failed");
            match e {
                Error::Bootstrap { .. } => e,
                other => Error::bootstrap(step, other),
            }
        })
    }

    fn set_identity(&self) -> Result<()> {
        sethostname(&self.config.hostname)?;

        if let Some(ref domainname) = self.config.domainname {
            set_domainname(domainname)?;
        }

        Ok(())
    }
}

/// Give this process a private mount namespace
///
/// The process was cloned into a new mount namespace already; unsharing
/// again is harmless and keeps the step safe to repeat. Marking `/`
/// recursively private stops the unmounts that follow from propagating to
/// the host and is required by `pivot_root(2)`.
///
/// # Errors
/// Returns error if `unshare(2)` or the propagation change fails
pub fn detach_mount_namespace() -> Result<()> {
    unshare(CloneFlags::CLONE_NEWNS)?;
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )?;
    Ok(())
}

fn drop_inherited_proc() -> Result<()> {
    match umount2("/proc", MntFlags::MNT_DETACH) {
        Ok(()) => Ok(()),
        // Nothing mounted there
        Err(Errno::EINVAL) => {
            tracing::debug!("No /proc mount to drop");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn mount_proc() -> Result<()> {
    let target = Path::new("/proc");
    if !target.is_dir() {
        std::fs::create_dir_all(target)?;
    }

    mount(
        Some("proc"),
        target,
        Some("proc"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
        None::<&str>,
    )?;
    Ok(())
}

fn set_domainname(domainname: &str) -> Result<()> {
    let c_domainname = CString::new(domainname)
        .map_err(|e| Error::invalid_config(format!("Invalid domain name: {e}")))?;

    // nix does not wrap setdomainname(2)
    let ret = unsafe { libc::setdomainname(c_domainname.as_ptr(), domainname.len()) };
    if ret != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }

    Ok(())
}
