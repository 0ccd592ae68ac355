//! What a reclaim run decided and did.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use hostpath_types::UtcTime;

use crate::candidate::LeafOutcome;

/// Decision for a single leaf directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafDecision {
    pub path: PathBuf,
    pub identity: String,
    #[serde(flatten)]
    pub outcome: LeafOutcome,
}

/// Counts for one PodIdentity directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PodIdentityReport {
    pub identity: String,
    /// AllocationId directories counted by the census.
    pub allocations: usize,
    pub deleted: usize,
    pub would_delete: usize,
    pub skipped: usize,
    pub failed: usize,
    pub skip_reasons: BTreeMap<&'static str, usize>,
}

impl PodIdentityReport {
    pub fn new(identity: impl Into<String>, allocations: usize) -> Self {
        Self {
            identity: identity.into(),
            allocations,
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: &LeafOutcome) {
        match outcome {
            LeafOutcome::Deleted => self.deleted += 1,
            LeafOutcome::WouldDelete => self.would_delete += 1,
            LeafOutcome::Skipped { reason } => {
                self.skipped += 1;
                *self.skip_reasons.entry(reason.key()).or_insert(0) += 1;
            }
            LeafOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Result of one [`DirectoryReclaimer::run`](crate::DirectoryReclaimer::run).
#[derive(Debug, Clone, Serialize)]
pub struct ReclaimReport {
    pub base_dir: PathBuf,
    pub dry_run: bool,
    pub threshold: usize,
    pub age_days: u64,
    /// AllocationId directories before the run.
    pub total_before: usize,
    /// AllocationId directories after the run, from a fresh census. A dry
    /// run predicts it from the directories it would have removed.
    pub total_after: usize,
    /// True if the census was below the threshold and nothing was evaluated.
    pub gated: bool,
    pub identities: Vec<PodIdentityReport>,
    pub decisions: Vec<LeafDecision>,
    pub parents_attempted: usize,
    /// Directories removed; in a dry run, directories that would be.
    pub parents_removed: usize,
    pub identity_dirs_attempted: usize,
    pub identity_dirs_removed: usize,
    pub started_at: UtcTime,
    pub finished_at: UtcTime,
}

impl ReclaimReport {
    pub fn new(
        base_dir: PathBuf,
        dry_run: bool,
        threshold: usize,
        age_days: u64,
        started_at: UtcTime,
    ) -> Self {
        Self {
            base_dir,
            dry_run,
            threshold,
            age_days,
            total_before: 0,
            total_after: 0,
            gated: false,
            identities: Vec::new(),
            decisions: Vec::new(),
            parents_attempted: 0,
            parents_removed: 0,
            identity_dirs_attempted: 0,
            identity_dirs_removed: 0,
            started_at,
            finished_at: started_at,
        }
    }

    /// Record a leaf decision against the identity at `identity_index`.
    pub(crate) fn record(&mut self, identity_index: usize, decision: LeafDecision) {
        if let Some(identity) = self.identities.get_mut(identity_index) {
            identity.record(&decision.outcome);
        }
        self.decisions.push(decision);
    }

    fn count(&self, pred: impl Fn(&LeafOutcome) -> bool) -> usize {
        self.decisions.iter().filter(|d| pred(&d.outcome)).count()
    }

    pub fn deleted(&self) -> usize {
        self.count(|o| matches!(o, LeafOutcome::Deleted))
    }

    pub fn would_delete(&self) -> usize {
        self.count(|o| matches!(o, LeafOutcome::WouldDelete))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, LeafOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, LeafOutcome::Failed { .. }))
    }

    /// Leaves that passed every gate: deleted, would be deleted, or failed at
    /// `rmdir`.
    pub fn planned_deletions(&self) -> Vec<&PathBuf> {
        self.decisions
            .iter()
            .filter(|d| {
                matches!(
                    d.outcome,
                    LeafOutcome::Deleted | LeafOutcome::WouldDelete | LeafOutcome::Failed { .. }
                )
            })
            .map(|d| &d.path)
            .collect()
    }

    /// Skip counts per reason across all identities.
    pub fn skip_reasons(&self) -> BTreeMap<&'static str, usize> {
        let mut totals = BTreeMap::new();
        for identity in &self.identities {
            for (reason, n) in &identity.skip_reasons {
                *totals.entry(*reason).or_insert(0) += n;
            }
        }
        totals
    }
}
