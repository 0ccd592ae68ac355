//! Reclaim candidates and the per-leaf decisions made about them.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use hostpath_allocator::{AllocatedPathParts, PathFormatValidator};
use hostpath_types::UtcTime;

use crate::mount::MountVerdict;

/// Why a leaf was left in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Not a path the allocator could have produced.
    InvalidFormat,
    /// Younger than the age threshold (or dated in the future).
    TooNew { age_days: i64 },
    /// `lstat` failed, so the age is unknown.
    MetadataUnavailable,
    Mounted { verdict: MountVerdict },
    /// Had entries at the final recheck.
    NotEmpty,
}

impl SkipReason {
    /// Stable key used for per-reason counts.
    pub fn key(&self) -> &'static str {
        match self {
            SkipReason::InvalidFormat => "invalid_format",
            SkipReason::TooNew { .. } => "too_new",
            SkipReason::MetadataUnavailable => "metadata_unavailable",
            SkipReason::Mounted { .. } => "mounted",
            SkipReason::NotEmpty => "not_empty",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TooNew { age_days } => write!(f, "too_new({}d)", age_days),
            SkipReason::Mounted { verdict } => write!(f, "mounted({})", verdict),
            other => f.write_str(other.key()),
        }
    }
}

/// Final decision for one leaf directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LeafOutcome {
    Deleted,
    /// Passed every gate during a dry run.
    WouldDelete,
    Skipped { reason: SkipReason },
    /// Passed every gate but `rmdir` failed.
    Failed { error: String },
}

impl LeafOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        LeafOutcome::Skipped { reason }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            LeafOutcome::Skipped { reason } => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for LeafOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafOutcome::Deleted => f.write_str("deleted"),
            LeafOutcome::WouldDelete => f.write_str("would_delete"),
            LeafOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            LeafOutcome::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// A leaf whose path passed the format gate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub parts: AllocatedPathParts,
}

impl Candidate {
    /// Apply the format gate.
    pub fn parse(validator: &PathFormatValidator, path: &Path) -> Result<Self, SkipReason> {
        validator
            .decompose(path)
            .map(|parts| Self {
                path: path.to_path_buf(),
                parts,
            })
            .ok_or(SkipReason::InvalidFormat)
    }

    /// The AllocationId directory holding this leaf.
    pub fn allocation_dir(&self) -> Option<&Path> {
        self.path.parent()
    }
}

/// Apply the age gate: whole days (floor) from `modified` to `now` must be at
/// least `min_age_days`. Returns the age on success.
pub fn check_age(now: &UtcTime, modified: &UtcTime, min_age_days: u64) -> Result<i64, SkipReason> {
    let age_days = now.whole_days_since(modified);
    match u64::try_from(age_days) {
        Ok(age) if age >= min_age_days => Ok(age_days),
        _ => Err(SkipReason::TooNew { age_days }),
    }
}
