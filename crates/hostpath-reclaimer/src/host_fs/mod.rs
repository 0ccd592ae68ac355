//! The narrow filesystem surface the reclaimer needs.
//!
//! Every operation is a blocking call. Metadata never follows symlinks, and
//! [`HostFs::remove_empty_dir`] has `rmdir(2)` semantics: it cannot remove a
//! directory that still has entries.

mod memory;
mod os;

pub use memory::MemoryHostFs;
pub use os::OsHostFs;

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use hostpath_types::UtcTime;

/// The subset of `lstat` the reclaimer looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    pub is_dir: bool,
    pub modified: UtcTime,
    /// Device id; differs from the parent's across a mount boundary.
    pub dev: u64,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirChild {
    pub name: OsString,
    /// True only for real directories, never for symlinks to directories.
    pub is_dir: bool,
}

pub trait HostFs: Send + Sync {
    /// `lstat(path)`.
    fn metadata(&self, path: &Path) -> io::Result<EntryMeta>;

    /// Immediate children of `path`, excluding `.` and `..`.
    fn list_children(&self, path: &Path) -> io::Result<Vec<DirChild>>;

    /// Remove `path` only if it is an empty directory.
    fn remove_empty_dir(&self, path: &Path) -> io::Result<()>;

    /// Raw contents of a mount table file.
    fn read_mount_table(&self, source: &Path) -> io::Result<String>;

    /// Absolute path with every symlink resolved.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
}

impl<T: HostFs + ?Sized> HostFs for std::sync::Arc<T> {
    fn metadata(&self, path: &Path) -> io::Result<EntryMeta> {
        (**self).metadata(path)
    }

    fn list_children(&self, path: &Path) -> io::Result<Vec<DirChild>> {
        (**self).list_children(path)
    }

    fn remove_empty_dir(&self, path: &Path) -> io::Result<()> {
        (**self).remove_empty_dir(path)
    }

    fn read_mount_table(&self, source: &Path) -> io::Result<String> {
        (**self).read_mount_table(source)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        (**self).canonicalize(path)
    }
}

/// Names of the child directories of `path`, sorted, skipping non-UTF-8
/// names.
pub(crate) fn child_dir_names<F: HostFs + ?Sized>(fs: &F, path: &Path) -> io::Result<Vec<String>> {
    let mut names: Vec<String> = fs
        .list_children(path)?
        .into_iter()
        .filter(|c| c.is_dir)
        .filter_map(|c| match c.name.into_string() {
            Ok(name) => Some(name),
            Err(raw) => {
                tracing::warn!(
                    parent = %path.display(),
                    name = ?raw,
                    "Skipping non-UTF8 directory name"
                );
                None
            }
        })
        .collect();
    names.sort();
    Ok(names)
}
