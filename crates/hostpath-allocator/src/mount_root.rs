//! Operator-wide mount root and per-runtime base paths.

use std::path::{Path, PathBuf};

/// Environment variable holding the operator-wide mount root.
pub const MOUNT_ROOT_ENV: &str = "MOUNT_ROOT";

/// The directory all runtime base paths hang off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRoot {
    root: PathBuf,
}

impl MountRoot {
    /// Read [`MOUNT_ROOT_ENV`]. An unset or invalid value falls back to `/`.
    pub fn from_env() -> Self {
        let value = std::env::var(MOUNT_ROOT_ENV).ok();
        Self::from_value(value.as_deref())
    }

    /// Resolve a mount root from a raw value. Only non-empty absolute paths
    /// are accepted; anything else means `/`.
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() && Path::new(v).is_absolute() => Self {
                root: PathBuf::from(v),
            },
            Some(v) => {
                tracing::warn!(
                    value = v,
                    "Ignoring invalid {}, falling back to /",
                    MOUNT_ROOT_ENV
                );
                Self::default()
            }
            None => Self::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<runtime_type>`, e.g. `/runtime-mnt/juicefs`.
    pub fn base_path(&self, runtime_type: &str) -> PathBuf {
        self.root.join(runtime_type)
    }
}

impl Default for MountRoot {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }
}
