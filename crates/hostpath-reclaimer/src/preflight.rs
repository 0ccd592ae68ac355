//! Start-up checks. Any failure means no scan happens at all.

use hostpath_types::{Error, Result};

use crate::config::ReclaimerConfig;
use crate::host_fs::HostFs;
use crate::mount::MountProbe;

/// Verify the host can be reclaimed safely with `config`.
pub fn preflight<F: HostFs + ?Sized>(fs: &F, config: &ReclaimerConfig) -> Result<()> {
    let base = &config.base_dir;

    let meta = fs.metadata(base).map_err(|e| {
        Error::Precondition(format!("base dir {} unavailable: {}", base.display(), e))
    })?;
    if !meta.is_dir {
        return Err(Error::Precondition(format!(
            "base dir {} is not a directory",
            base.display()
        )));
    }
    fs.list_children(base).map_err(|e| {
        Error::Precondition(format!("base dir {} cannot be listed: {}", base.display(), e))
    })?;

    if MountProbe::from_config(config).mount_points(fs).is_none() {
        return Err(Error::Precondition(format!(
            "no mount table readable ({} or {})",
            config.mount_tables.primary.display(),
            config.mount_tables.fallback.display()
        )));
    }

    if config.require_privilege {
        let euid = effective_uid();
        if euid != 0 {
            return Err(Error::Precondition(format!(
                "must run as root (effective uid {})",
                euid
            )));
        }
    }

    tracing::debug!(base = %base.display(), "Preflight checks passed");
    Ok(())
}

fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}
