//! Configuration for the reclaimer.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use hostpath_logging::LogConfig;
use hostpath_types::{Error, Result};

/// Where mount tables are read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountTableConfig {
    /// Mount table of the current mount namespace.
    #[serde(default = "default_primary_mount_table")]
    pub primary: PathBuf,

    /// Read when the primary table is unreadable.
    #[serde(default = "default_fallback_mount_table")]
    pub fallback: PathBuf,
}

fn default_primary_mount_table() -> PathBuf {
    PathBuf::from("/proc/self/mountinfo")
}

fn default_fallback_mount_table() -> PathBuf {
    PathBuf::from("/proc/mounts")
}

impl Default for MountTableConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_mount_table(),
            fallback: default_fallback_mount_table(),
        }
    }
}

/// Configuration for the reclaimer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclaimerConfig {
    /// Base path holding `<PodIdentity>/<AllocationId>/<dataset>-fuse-mount`.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Minimum number of allocation directories before anything is deleted.
    #[serde(default = "default_threshold")]
    pub threshold: usize,

    /// Minimum leaf age, in whole days, before it may be deleted.
    #[serde(default = "default_age_days")]
    pub age_days: u64,

    /// Evaluate every gate but delete nothing.
    #[serde(default)]
    pub dry_run: bool,

    /// Scan interval. If zero, scan once and exit.
    #[serde(default)]
    pub interval_secs: u64,

    /// Refuse to start unless running as root.
    #[serde(default = "default_true")]
    pub require_privilege: bool,

    #[serde(default)]
    pub mount_tables: MountTableConfig,

    /// File name prefix FUSE uses for hidden files of a live mount.
    #[serde(default = "default_sentinel_prefix")]
    pub fuse_sentinel_prefix: String,

    #[serde(default)]
    pub log: LogConfig,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/runtime-mnt")
}

fn default_threshold() -> usize {
    1000
}

fn default_age_days() -> u64 {
    90
}

fn default_true() -> bool {
    true
}

fn default_sentinel_prefix() -> String {
    ".fuse_hidden".to_string()
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            threshold: default_threshold(),
            age_days: default_age_days(),
            dry_run: false,
            interval_secs: 0,
            require_privilege: true,
            mount_tables: MountTableConfig::default(),
            fuse_sentinel_prefix: default_sentinel_prefix(),
            log: LogConfig::default(),
        }
    }
}

impl ReclaimerConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("parse {}: {}", path.display(), e)))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded reclaimer configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if !self.base_dir.is_absolute() {
            errors.push(format!(
                "base_dir '{}' must be an absolute path",
                self.base_dir.display()
            ));
        }
        if self.mount_tables.primary.as_os_str().is_empty()
            || self.mount_tables.fallback.as_os_str().is_empty()
        {
            errors.push("mount table paths must not be empty".to_string());
        }
        if self.fuse_sentinel_prefix.is_empty() {
            errors.push("fuse_sentinel_prefix must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(errors.join("; ")))
        }
    }

    /// Render as TOML, for `--dump-default-config`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Return the scan interval as a `Duration`, or `None` if the reclaimer
    /// should run once and exit.
    pub fn interval(&self) -> Option<Duration> {
        if self.interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.interval_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReclaimerConfig::default();
        assert_eq!(config.base_dir, PathBuf::from("/runtime-mnt"));
        assert_eq!(config.threshold, 1000);
        assert_eq!(config.age_days, 90);
        assert!(!config.dry_run);
        assert!(config.require_privilege);
        assert_eq!(config.mount_tables.primary, PathBuf::from("/proc/self/mountinfo"));
        assert_eq!(config.mount_tables.fallback, PathBuf::from("/proc/mounts"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_interval_none_when_zero() {
        let config = ReclaimerConfig::default();
        assert!(config.interval().is_none());
    }

    #[test]
    fn test_interval_some_when_nonzero() {
        let config = ReclaimerConfig {
            interval_secs: 600,
            ..Default::default()
        };
        assert_eq!(config.interval(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_from_toml() {
        let config: ReclaimerConfig = toml::from_str(
            r#"
            base_dir = "/mnt/fluid/juicefs"
            threshold = 10
            age_days = 7
            dry_run = true

            [mount_tables]
            fallback = "/etc/mtab"

            [log]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/mnt/fluid/juicefs"));
        assert_eq!(config.threshold, 10);
        assert_eq!(config.age_days, 7);
        assert!(config.dry_run);
        assert_eq!(config.mount_tables.primary, PathBuf::from("/proc/self/mountinfo"));
        assert_eq!(config.mount_tables.fallback, PathBuf::from("/etc/mtab"));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.fuse_sentinel_prefix, ".fuse_hidden");
    }

    #[test]
    fn test_validate_rejects_relative_base() {
        let config = ReclaimerConfig {
            base_dir: PathBuf::from("runtime-mnt"),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reclaimer.toml");
        std::fs::write(&path, "threshold = 5\nage_days = 1\n").unwrap();

        let config = ReclaimerConfig::load(&path).unwrap();
        assert_eq!(config.threshold, 5);
        assert_eq!(config.age_days, 1);

        std::fs::write(&path, "threshold = \"many\"\n").unwrap();
        assert!(matches!(ReclaimerConfig::load(&path), Err(Error::Config(_))));
        assert!(ReclaimerConfig::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_dump_roundtrip() {
        let rendered = ReclaimerConfig::default().to_toml().unwrap();
        let parsed: ReclaimerConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.threshold, 1000);
        assert_eq!(parsed.mount_tables, MountTableConfig::default());
    }
}
