//! Root filesystem switching via `pivot_root(2)`

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use capsule_core::{Error, Result};
use nix::mount::{MntFlags, MsFlags, mount, umount2};
use nix::unistd::pivot_root;

/// Directory beneath the new root that receives the old root during the pivot
pub const OLD_ROOT_DIR: &str = ".oldroot";

/// Directory the container sees as `/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootFilesystem {
    path: PathBuf,
}

impl RootFilesystem {
    /// Resolve and validate a root filesystem directory
    ///
    /// Relative paths are resolved against the current working directory.
    ///
    /// # Errors
    /// Returns error if the path does not exist or is not a directory
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path = path.canonicalize().map_err(|e| {
            Error::invalid_config(format!("Root filesystem {}: {e}", path.display()))
        })?;

        if !path.is_dir() {
            return Err(Error::invalid_config(format!(
                "Root filesystem {} is not a directory",
                path.display()
            )));
        }

        Ok(Self { path })
    }

    /// Absolute host path of the root filesystem
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Old root location as seen before the pivot
    #[must_use]
    pub fn old_root(&self) -> PathBuf {
        self.path.join(OLD_ROOT_DIR)
    }

    /// Old root location as seen after the pivot
    #[must_use]
    pub fn old_root_after_pivot() -> PathBuf {
        Path::new("/").join(OLD_ROOT_DIR)
    }

    /// Recursively bind-mount the directory onto itself so it becomes a
    /// mount point `pivot_root(2)` accepts.
    pub(crate) fn bind_to_self(&self) -> Result<()> {
        mount(
            Some(self.path.as_path()),
            self.path.as_path(),
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None::<&str>,
        )?;
        Ok(())
    }

    /// Create the directory receiving the old root. A leftover from an
    /// interrupted launch is reused.
    pub(crate) fn create_old_root(&self) -> Result<()> {
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(self.old_root())?;
        Ok(())
    }

    /// Make this directory the process root, moving the previous root
    /// beneath [`OLD_ROOT_DIR`].
    pub(crate) fn pivot(&self) -> Result<()> {
        pivot_root(self.path.as_path(), self.old_root().as_path())?;
        Ok(())
    }

    /// Lazily unmount the relocated old root and remove its directory.
    /// Only valid after [`Self::pivot`].
    pub(crate) fn discard_old_root() -> Result<()> {
        let old_root = Self::old_root_after_pivot();
        umount2(old_root.as_path(), MntFlags::MNT_DETACH)?;
        std::fs::remove_dir(&old_root)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rootfs_resolves_directory() {
        let dir = tempfile::tempdir().unwrap();
        let rootfs = RootFilesystem::new(dir.path()).unwrap();

        assert_eq!(rootfs.path(), dir.path().canonicalize().unwrap());
        assert!(rootfs.path().is_absolute());
    }

    #[test]
    fn test_rootfs_rejects_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = RootFilesystem::new(dir.path().join("missing")).unwrap_err();

        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_rootfs_rejects_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(RootFilesystem::new(file.path()).is_err());
    }

    #[test]
    fn test_old_root_paths() {
        let dir = tempfile::tempdir().unwrap();
        let rootfs = RootFilesystem::new(dir.path()).unwrap();

        assert!(rootfs.old_root().starts_with(rootfs.path()));
        assert_eq!(
            RootFilesystem::old_root_after_pivot(),
            PathBuf::from("/.oldroot")
        );
    }

    #[test]
    fn test_create_old_root_is_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        let rootfs = RootFilesystem::new(dir.path()).unwrap();

        rootfs.create_old_root().unwrap();
        rootfs.create_old_root().unwrap();
        assert!(rootfs.old_root().is_dir());
    }
}
