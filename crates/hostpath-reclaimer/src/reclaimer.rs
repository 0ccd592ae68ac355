//! Scan-and-sweep over the allocated host-path tree.
//!
//! A run is idempotent and can be interrupted at any point; whatever is left
//! is picked up by the next run.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use hostpath_allocator::PathFormatValidator;
use hostpath_types::{Clock, Error, Result, FUSE_MOUNT_SUFFIX};

use crate::candidate::{check_age, Candidate, LeafOutcome, SkipReason};
use crate::config::ReclaimerConfig;
use crate::host_fs::{child_dir_names, HostFs};
use crate::mount::MountProbe;
use crate::report::{LeafDecision, PodIdentityReport, ReclaimReport};

/// AllocationId directory counts under the base path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Census {
    /// Per PodIdentity directory name.
    pub per_identity: BTreeMap<String, usize>,
    pub total: usize,
}

/// Reclaims abandoned `-fuse-mount` leaves under one base path.
pub struct DirectoryReclaimer<F, C> {
    fs: F,
    clock: C,
    config: ReclaimerConfig,
    validator: PathFormatValidator,
    probe: MountProbe,
}

impl<F: HostFs, C: Clock> DirectoryReclaimer<F, C> {
    pub fn new(fs: F, clock: C, config: ReclaimerConfig) -> Self {
        let validator = PathFormatValidator::new(&config.base_dir);
        let probe = MountProbe::from_config(&config);
        Self {
            fs,
            clock,
            config,
            validator,
            probe,
        }
    }

    pub fn config(&self) -> &ReclaimerConfig {
        &self.config
    }

    fn base(&self) -> &Path {
        &self.config.base_dir
    }

    /// Count the AllocationId directories under every PodIdentity directory.
    ///
    /// An unlistable base path is an error; an unlistable PodIdentity
    /// directory counts as zero.
    pub fn census(&self) -> Result<Census> {
        let base = self.base();
        let identities = child_dir_names(&self.fs, base).map_err(|e| Error::io(base, e))?;

        let mut census = Census::default();
        for identity in identities {
            let dir = base.join(&identity);
            let count = match self.fs.list_children(&dir) {
                Ok(children) => children.iter().filter(|c| c.is_dir).count(),
                Err(e) => {
                    tracing::warn!(
                        path = %dir.display(),
                        error = %e,
                        "Cannot list PodIdentity directory, counting as empty"
                    );
                    0
                }
            };
            census.total += count;
            census.per_identity.insert(identity, count);
        }
        Ok(census)
    }

    /// Execute one full run.
    pub fn run(&self) -> Result<ReclaimReport> {
        let mut report = ReclaimReport::new(
            self.base().to_path_buf(),
            self.config.dry_run,
            self.config.threshold,
            self.config.age_days,
            self.clock.now(),
        );

        let census = self.census()?;
        report.total_before = census.total;
        tracing::info!(
            base = %self.base().display(),
            total = census.total,
            threshold = self.config.threshold,
            dry_run = self.config.dry_run,
            "Census complete"
        );

        if census.total < self.config.threshold {
            tracing::info!(
                total = census.total,
                threshold = self.config.threshold,
                "Below threshold, nothing to reclaim"
            );
            report.gated = true;
            report.total_after = census.total;
            report.identities = census
                .per_identity
                .into_iter()
                .map(|(identity, n)| PodIdentityReport::new(identity, n))
                .collect();
            report.finished_at = self.clock.now();
            return Ok(report);
        }

        let mut emptied = Vec::with_capacity(census.per_identity.len());
        for (index, (identity, allocations)) in census.per_identity.iter().enumerate() {
            report
                .identities
                .push(PodIdentityReport::new(identity.clone(), *allocations));
            emptied.push(self.sweep_identity(index, identity, &mut report));
        }

        for (identity, emptied) in census.per_identity.keys().zip(emptied) {
            self.cleanup_identity_dir(&self.base().join(identity), emptied, &mut report);
        }

        report.total_after = if self.config.dry_run {
            census.total.saturating_sub(report.parents_removed)
        } else {
            self.census()?.total
        };
        report.finished_at = self.clock.now();

        tracing::info!(
            deleted = report.deleted(),
            would_delete = report.would_delete(),
            skipped = report.skipped(),
            failed = report.failed(),
            total_after = report.total_after,
            "Reclaim run finished"
        );
        Ok(report)
    }

    /// Sweep every leaf under one PodIdentity directory.
    ///
    /// Returns the number of AllocationId directories a dry run predicts
    /// would be emptied and removed; always zero for a real run.
    fn sweep_identity(&self, index: usize, identity: &str, report: &mut ReclaimReport) -> usize {
        let identity_dir = self.base().join(identity);
        let allocations = match child_dir_names(&self.fs, &identity_dir) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(
                    path = %identity_dir.display(),
                    error = %e,
                    "Cannot list PodIdentity directory, skipping"
                );
                return 0;
            }
        };

        let mut emptied = 0;
        for allocation in allocations {
            let allocation_dir = identity_dir.join(&allocation);
            let leaves = match child_dir_names(&self.fs, &allocation_dir) {
                Ok(names) => names,
                Err(e) => {
                    tracing::warn!(
                        path = %allocation_dir.display(),
                        error = %e,
                        "Cannot list AllocationId directory, skipping"
                    );
                    continue;
                }
            };

            let mut would_delete = 0;
            for leaf in leaves.iter().filter(|n| n.ends_with(FUSE_MOUNT_SUFFIX)) {
                let path = allocation_dir.join(leaf);
                let outcome = self.process_leaf(&path, report);
                if matches!(outcome, LeafOutcome::WouldDelete) {
                    would_delete += 1;
                }
                report.record(
                    index,
                    LeafDecision {
                        path,
                        identity: identity.to_string(),
                        outcome,
                    },
                );
            }

            if would_delete > 0 && self.would_empty(&allocation_dir, would_delete) {
                tracing::info!(
                    path = %allocation_dir.display(),
                    "Would remove AllocationId directory"
                );
                report.parents_removed += 1;
                emptied += 1;
            }
        }
        emptied
    }

    /// Dry-run emptiness: `dir` holds nothing beyond `removable` entries that
    /// the run would have removed.
    fn would_empty(&self, dir: &Path, removable: usize) -> bool {
        self.config.dry_run
            && self
                .fs
                .list_children(dir)
                .map_or(false, |children| children.len() == removable)
    }

    fn process_leaf(&self, path: &Path, report: &mut ReclaimReport) -> LeafOutcome {
        let candidate = match self.evaluate_leaf(path) {
            Ok(candidate) => candidate,
            Err(reason) => {
                tracing::debug!(path = %path.display(), reason = %reason, "Skipping leaf");
                return LeafOutcome::skipped(reason);
            }
        };

        if self.config.dry_run {
            tracing::info!(path = %path.display(), "Would delete leaf");
            if candidate.allocation_dir().is_some() {
                report.parents_attempted += 1;
            }
            return LeafOutcome::WouldDelete;
        }

        match self.safe_remove(&candidate.path) {
            Ok(LeafOutcome::Deleted) => {
                tracing::info!(path = %path.display(), "Deleted leaf");
                if let Some(parent) = candidate.allocation_dir() {
                    self.cleanup_allocation_dir(parent, report);
                }
                LeafOutcome::Deleted
            }
            Ok(other) => other,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete leaf");
                LeafOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Run every gate short of deletion, in order: format, age, mount state,
    /// emptiness.
    fn evaluate_leaf(&self, path: &Path) -> std::result::Result<Candidate, SkipReason> {
        let candidate = Candidate::parse(&self.validator, path)?;

        let meta = self
            .fs
            .metadata(path)
            .map_err(|_| SkipReason::MetadataUnavailable)?;
        check_age(&self.clock.now(), &meta.modified, self.config.age_days)?;

        let verdict = self.probe.probe(&self.fs, path);
        if verdict.is_mounted() {
            return Err(SkipReason::Mounted { verdict });
        }

        match self.fs.list_children(path) {
            Ok(children) if children.is_empty() => Ok(candidate),
            Ok(_) => Err(SkipReason::NotEmpty),
            Err(_) => Err(SkipReason::MetadataUnavailable),
        }
    }

    /// Re-probe mount state, then `rmdir`.
    fn safe_remove(&self, path: &Path) -> Result<LeafOutcome> {
        let verdict = self.probe.probe(&self.fs, path);
        if verdict.is_mounted() {
            tracing::warn!(
                path = %path.display(),
                verdict = %verdict,
                "Leaf became mounted before removal"
            );
            return Ok(LeafOutcome::skipped(SkipReason::Mounted { verdict }));
        }
        self.fs
            .remove_empty_dir(path)
            .map_err(|e| Error::deletion(path, e))?;
        Ok(LeafOutcome::Deleted)
    }

    fn cleanup_allocation_dir(&self, dir: &Path, report: &mut ReclaimReport) {
        report.parents_attempted += 1;
        match self.fs.remove_empty_dir(dir) {
            Ok(()) => {
                report.parents_removed += 1;
                tracing::debug!(path = %dir.display(), "Removed empty AllocationId directory");
            }
            Err(e) => log_cleanup_miss(dir, &e),
        }
    }

    fn cleanup_identity_dir(&self, dir: &Path, emptied: usize, report: &mut ReclaimReport) {
        report.identity_dirs_attempted += 1;
        if self.config.dry_run {
            if self.would_empty(dir, emptied) {
                tracing::info!(path = %dir.display(), "Would remove PodIdentity directory");
                report.identity_dirs_removed += 1;
            }
            return;
        }
        match self.fs.remove_empty_dir(dir) {
            Ok(()) => {
                report.identity_dirs_removed += 1;
                tracing::debug!(path = %dir.display(), "Removed empty PodIdentity directory");
            }
            Err(e) => log_cleanup_miss(dir, &e),
        }
    }
}

fn log_cleanup_miss(dir: &Path, e: &io::Error) {
    // Non-empty is the common case for shared parents.
    tracing::debug!(path = %dir.display(), error = %e, "Directory left in place");
}
