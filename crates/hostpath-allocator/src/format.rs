//! Acceptor for the allocated-path grammar.
//!
//! A path is accepted iff, relative to the base path, it has exactly three
//! components:
//!
//! 1. a non-empty pod identity,
//! 2. an allocation id `^[0-9]{16}-[a-z0-9]{8}$`,
//! 3. `<dataset>-fuse-mount` with a non-empty dataset name.
//!
//! This is the outermost gate of the reclaimer: nothing it rejects is ever
//! stat'ed for age, probed, or removed.

use std::path::{Path, PathBuf};

use hostpath_types::{AllocationId, PodIdentity, FUSE_MOUNT_SUFFIX};
use hostpath_utils::{normalize_path, relative_components};

/// Number of components an allocated path has below its base.
const ALLOCATED_DEPTH: usize = 3;

/// A decomposed, accepted allocated path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedPathParts {
    pub identity: PodIdentity,
    pub allocation_id: AllocationId,
    pub dataset_name: String,
}

/// Validates candidate paths against one base path.
#[derive(Debug, Clone)]
pub struct PathFormatValidator {
    base: PathBuf,
}

impl PathFormatValidator {
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: normalize_path(base.as_ref()),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Whether `candidate` is exactly a path the allocator could have produced.
    pub fn validate(&self, candidate: &Path) -> bool {
        self.decompose(candidate).is_some()
    }

    /// Split an accepted path into its typed parts; `None` if rejected.
    pub fn decompose(&self, candidate: &Path) -> Option<AllocatedPathParts> {
        let components = relative_components(&self.base, candidate)?;
        if components.len() != ALLOCATED_DEPTH {
            return None;
        }

        let identity = &components[0];
        let allocation_id = &components[1];
        let leaf = &components[2];

        if identity.is_empty() {
            return None;
        }
        if !AllocationId::is_well_formed(allocation_id) {
            return None;
        }
        let dataset_name = leaf.strip_suffix(FUSE_MOUNT_SUFFIX)?;
        if dataset_name.is_empty() {
            return None;
        }

        Some(AllocatedPathParts {
            identity: PodIdentity::resolve(identity, ""),
            allocation_id: allocation_id.parse().ok()?,
            dataset_name: dataset_name.to_string(),
        })
    }
}

/// Free-function form of [`PathFormatValidator::validate`].
pub fn validate(candidate: &Path, base: &Path) -> bool {
    PathFormatValidator::new(base).validate(candidate)
}
