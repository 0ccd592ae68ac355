//! Conservative "is this directory a live mount?" probe.
//!
//! Any doubt is answered with "mounted". A false positive only delays
//! reclamation to a later run; a false negative would let `rmdir` race a
//! live FUSE mount.

use std::ffi::OsString;
use std::fmt;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ReclaimerConfig;
use crate::host_fs::HostFs;

/// Why a directory was judged mounted, or that it was not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountVerdict {
    NotMounted,
    /// Listed as a mount point in the mount table.
    MountTable,
    /// Contains a FUSE hidden file.
    Sentinel,
    /// Lives on a different device than its parent.
    DeviceBoundary,
    /// The probe itself failed.
    Unknown,
}

impl MountVerdict {
    pub fn is_mounted(self) -> bool {
        !matches!(self, MountVerdict::NotMounted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MountVerdict::NotMounted => "not_mounted",
            MountVerdict::MountTable => "mount_table",
            MountVerdict::Sentinel => "sentinel",
            MountVerdict::DeviceBoundary => "device_boundary",
            MountVerdict::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MountVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probes mount state through a [`HostFs`].
#[derive(Debug, Clone)]
pub struct MountProbe {
    primary: PathBuf,
    fallback: PathBuf,
    sentinel_prefix: String,
}

impl MountProbe {
    pub fn new(
        primary: impl Into<PathBuf>,
        fallback: impl Into<PathBuf>,
        sentinel_prefix: impl Into<String>,
    ) -> Self {
        Self {
            primary: primary.into(),
            fallback: fallback.into(),
            sentinel_prefix: sentinel_prefix.into(),
        }
    }

    pub fn from_config(config: &ReclaimerConfig) -> Self {
        Self::new(
            config.mount_tables.primary.clone(),
            config.mount_tables.fallback.clone(),
            config.fuse_sentinel_prefix.clone(),
        )
    }

    /// Mount points listed in the first readable mount table, or `None` if
    /// neither table can be read.
    pub fn mount_points<F: HostFs + ?Sized>(&self, fs: &F) -> Option<Vec<PathBuf>> {
        match fs.read_mount_table(&self.primary) {
            Ok(contents) => return Some(parse_mountinfo(&contents)),
            Err(e) => {
                tracing::debug!(
                    source = %self.primary.display(),
                    error = %e,
                    "Primary mount table unreadable, trying fallback"
                );
            }
        }
        match fs.read_mount_table(&self.fallback) {
            Ok(contents) => Some(parse_proc_mounts(&contents)),
            Err(e) => {
                tracing::warn!(
                    source = %self.fallback.display(),
                    error = %e,
                    "No mount table readable"
                );
                None
            }
        }
    }

    /// Probe `path`. Never fails; errors become [`MountVerdict::Unknown`].
    pub fn probe<F: HostFs + ?Sized>(&self, fs: &F, path: &Path) -> MountVerdict {
        let canonical = match fs.canonicalize(path) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Cannot canonicalize");
                return MountVerdict::Unknown;
            }
        };

        let Some(mount_points) = self.mount_points(fs) else {
            return MountVerdict::Unknown;
        };
        if mount_points.iter().any(|m| m == &canonical) {
            return MountVerdict::MountTable;
        }

        match fs.list_children(&canonical) {
            Ok(children) => {
                let prefix = self.sentinel_prefix.as_bytes();
                if children
                    .iter()
                    .any(|c| c.name.as_bytes().starts_with(prefix))
                {
                    return MountVerdict::Sentinel;
                }
            }
            Err(e) => {
                tracing::debug!(path = %canonical.display(), error = %e, "Cannot list");
                return MountVerdict::Unknown;
            }
        }

        let Some(parent) = canonical.parent() else {
            return MountVerdict::Unknown;
        };
        match (fs.metadata(&canonical), fs.metadata(parent)) {
            (Ok(own), Ok(up)) if own.dev != up.dev => MountVerdict::DeviceBoundary,
            (Ok(_), Ok(_)) => MountVerdict::NotMounted,
            (Err(e), _) | (_, Err(e)) => {
                tracing::debug!(path = %canonical.display(), error = %e, "Cannot stat");
                MountVerdict::Unknown
            }
        }
    }
}

/// Mount points from `/proc/self/mountinfo` (fifth field).
pub fn parse_mountinfo(contents: &str) -> Vec<PathBuf> {
    parse_field(contents, 4)
}

/// Mount points from `/proc/mounts` (second field).
pub fn parse_proc_mounts(contents: &str) -> Vec<PathBuf> {
    parse_field(contents, 1)
}

fn parse_field(contents: &str, index: usize) -> Vec<PathBuf> {
    contents
        .lines()
        .filter_map(|line| line.split_whitespace().nth(index))
        .map(unescape_mount_path)
        .collect()
}

/// Decode the kernel's `\ooo` octal escapes (space, tab, newline, backslash).
fn unescape_mount_path(field: &str) -> PathBuf {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    PathBuf::from(OsString::from_vec(out))
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_fs::MemoryHostFs;
    use hostpath_types::UtcTime;

    const MOUNTINFO: &str = "/proc/self/mountinfo";
    const MOUNTS: &str = "/proc/mounts";
    const LEAF: &str = "/runtime-mnt/pod-a/0000000000000001-abcdefgh/data-fuse-mount";

    fn probe() -> MountProbe {
        MountProbe::new(MOUNTINFO, MOUNTS, ".fuse_hidden")
    }

    fn fs_with_leaf() -> MemoryHostFs {
        let fs = MemoryHostFs::new();
        fs.mkdir_all(LEAF, UtcTime::default());
        fs.set_mount_table(
            MOUNTINFO,
            "22 1 0:21 / /proc rw,nosuid - proc proc rw\n",
        );
        fs
    }

    #[test]
    fn test_parse_mountinfo() {
        let contents = "\
36 35 98:0 /mnt1 /mnt2 rw,noatime master:1 - ext3 /dev/root rw,errors=continue
412 30 0:52 / /runtime-mnt/with\\040space rw - fuse.juicefs JuiceFS:vol rw
";
        assert_eq!(
            parse_mountinfo(contents),
            vec![
                PathBuf::from("/mnt2"),
                PathBuf::from("/runtime-mnt/with space"),
            ]
        );
    }

    #[test]
    fn test_parse_proc_mounts() {
        let contents = "proc /proc proc rw 0 0\nJuiceFS:vol /mnt/a\\011b fuse.juicefs rw 0 0\n\n";
        assert_eq!(
            parse_proc_mounts(contents),
            vec![PathBuf::from("/proc"), PathBuf::from("/mnt/a\tb")]
        );
    }

    #[test]
    fn test_unescape_leaves_invalid_sequences() {
        assert_eq!(unescape_mount_path("a\\9b"), PathBuf::from("a\\9b"));
        assert_eq!(unescape_mount_path("tail\\04"), PathBuf::from("tail\\04"));
        assert_eq!(unescape_mount_path("back\\134slash"), PathBuf::from("back\\slash"));
    }

    #[test]
    fn test_plain_directory_not_mounted() {
        let fs = fs_with_leaf();
        let verdict = probe().probe(&fs, Path::new(LEAF));
        assert_eq!(verdict, MountVerdict::NotMounted);
        assert!(!verdict.is_mounted());
    }

    #[test]
    fn test_mount_table_match() {
        let fs = fs_with_leaf();
        fs.set_mount_table(
            MOUNTINFO,
            format!("412 30 0:52 / {} rw - fuse.juicefs JuiceFS:vol rw\n", LEAF),
        );
        assert_eq!(probe().probe(&fs, Path::new(LEAF)), MountVerdict::MountTable);
    }

    #[test]
    fn test_mount_table_match_through_symlink() {
        let fs = fs_with_leaf();
        fs.mkdir_all("/alias", UtcTime::default());
        fs.symlink("/alias/leaf", LEAF);
        fs.set_mount_table(
            MOUNTINFO,
            format!("412 30 0:52 / {} rw - fuse.juicefs JuiceFS:vol rw\n", LEAF),
        );
        assert_eq!(
            probe().probe(&fs, Path::new("/alias/leaf")),
            MountVerdict::MountTable
        );
    }

    #[test]
    fn test_fallback_table_used() {
        let fs = fs_with_leaf();
        fs.remove_mount_table(MOUNTINFO);
        fs.set_mount_table(MOUNTS, format!("JuiceFS:vol {} fuse.juicefs rw 0 0\n", LEAF));
        assert_eq!(probe().probe(&fs, Path::new(LEAF)), MountVerdict::MountTable);
    }

    #[test]
    fn test_no_table_is_unknown() {
        let fs = fs_with_leaf();
        fs.remove_mount_table(MOUNTINFO);
        let verdict = probe().probe(&fs, Path::new(LEAF));
        assert_eq!(verdict, MountVerdict::Unknown);
        assert!(verdict.is_mounted());
    }

    #[test]
    fn test_sentinel_file() {
        let fs = fs_with_leaf();
        fs.create_file(format!("{}/.fuse_hidden0000000a00000001", LEAF));
        assert_eq!(probe().probe(&fs, Path::new(LEAF)), MountVerdict::Sentinel);
    }

    #[test]
    fn test_device_boundary() {
        let fs = fs_with_leaf();
        fs.set_dev(LEAF, 99);
        assert_eq!(
            probe().probe(&fs, Path::new(LEAF)),
            MountVerdict::DeviceBoundary
        );
    }

    #[test]
    fn test_missing_path_is_unknown() {
        let fs = fs_with_leaf();
        assert_eq!(
            probe().probe(&fs, Path::new("/runtime-mnt/ghost")),
            MountVerdict::Unknown
        );
    }

    #[test]
    fn test_verdict_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&MountVerdict::DeviceBoundary).unwrap(),
            "\"device_boundary\""
        );
        assert_eq!(MountVerdict::MountTable.to_string(), "mount_table");
    }
}
