use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use hostpath_types::UtcTime;

use super::{DirChild, EntryMeta, HostFs};

/// [`HostFs`] backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsHostFs;

impl HostFs for OsHostFs {
    fn metadata(&self, path: &Path) -> io::Result<EntryMeta> {
        let meta = fs::symlink_metadata(path)?;
        Ok(EntryMeta {
            is_dir: meta.is_dir(),
            modified: UtcTime::from_system_time(meta.modified()?),
            dev: meta.dev(),
        })
    }

    fn list_children(&self, path: &Path) -> io::Result<Vec<DirChild>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            children.push(DirChild {
                name: entry.file_name(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        Ok(children)
    }

    fn remove_empty_dir(&self, path: &Path) -> io::Result<()> {
        // rmdir(2): fails with ENOTEMPTY instead of recursing.
        fs::remove_dir(path)
    }

    fn read_mount_table(&self, source: &Path) -> io::Result<String> {
        fs::read_to_string(source)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }
}
