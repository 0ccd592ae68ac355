//! Unique host-path allocation.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use hostpath_types::{
    dataset_mount_dir, AllocationId, Clock, Error, PodIdentity, Result, SystemClock,
    ALLOCATION_SUFFIX_LEN,
};
use hostpath_utils::final_component;

use crate::format::PathFormatValidator;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Source of randomness for the allocation suffix.
pub trait EntropySource: Send + Sync {
    /// Return `len` characters drawn from `[a-z0-9]`.
    fn random_suffix(&self, len: usize) -> String;
}

fn draw_suffix<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())]))
        .collect()
}

/// Per-thread OS-seeded generator. Concurrent admissions running on
/// different threads or processes draw from independent streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngEntropy;

impl EntropySource for ThreadRngEntropy {
    fn random_suffix(&self, len: usize) -> String {
        draw_suffix(&mut rand::thread_rng(), len)
    }
}

/// Deterministic generator for tests and reproducible runs.
#[derive(Debug)]
pub struct SeededEntropy {
    rng: Mutex<StdRng>,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl EntropySource for SeededEntropy {
    fn random_suffix(&self, len: usize) -> String {
        draw_suffix(&mut *self.rng.lock(), len)
    }
}

/// The outcome of one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    /// Full host path to embed in the Pod's hostPath volume.
    pub path: PathBuf,
    pub identity: PodIdentity,
    pub allocation_id: AllocationId,
    /// `<dataset>-fuse-mount`.
    pub dataset_dir: String,
}

impl Allocation {
    /// `<pod identity>/<allocation id>`: the part of the path unique to this
    /// allocation.
    pub fn unique_segment(&self) -> PathBuf {
        Path::new(self.identity.as_str()).join(self.allocation_id.to_string())
    }
}

/// Produces a fresh host path per sidecar injection.
///
/// Holds no state besides its injected clock and entropy source, so a single
/// instance can be shared across concurrent admission requests.
pub struct PathAllocator<C = SystemClock, E = ThreadRngEntropy> {
    clock: C,
    entropy: E,
}

impl PathAllocator<SystemClock, ThreadRngEntropy> {
    /// Allocator backed by the wall clock and a per-thread RNG.
    pub fn system() -> Self {
        Self::new(SystemClock, ThreadRngEntropy)
    }
}

impl Default for PathAllocator<SystemClock, ThreadRngEntropy> {
    fn default() -> Self {
        Self::system()
    }
}

impl<C: Clock, E: EntropySource> PathAllocator<C, E> {
    pub fn new(clock: C, entropy: E) -> Self {
        Self { clock, entropy }
    }

    /// Allocate `base/<identity>/<allocation id>/<dataset>-fuse-mount`.
    ///
    /// `legacy_dataset_path` is the pre-existing per-dataset mount path; only
    /// its final component is used. Fails with [`Error::InvalidInput`] when it
    /// has none, in which case the webhook must reject the admission.
    pub fn allocate(
        &self,
        base: &Path,
        pod_name: &str,
        pod_generate_name: &str,
        legacy_dataset_path: &str,
    ) -> Result<Allocation> {
        let dataset_name = final_component(legacy_dataset_path).ok_or_else(|| {
            Error::InvalidInput(format!(
                "dataset path {:?} has no usable final component",
                legacy_dataset_path
            ))
        })?;

        let identity = PodIdentity::resolve(pod_name, pod_generate_name);
        identity.check_segment()?;
        let allocation_id = AllocationId::new(
            self.clock.now().timestamp_nanos(),
            self.entropy.random_suffix(ALLOCATION_SUFFIX_LEN),
        )?;
        let dataset_dir = dataset_mount_dir(dataset_name);

        let path = base
            .join(identity.as_str())
            .join(allocation_id.to_string())
            .join(&dataset_dir);

        if !PathFormatValidator::new(base).validate(&path) {
            return Err(Error::InvalidInput(format!(
                "allocated path {} does not match the host-path grammar under {}",
                path.display(),
                base.display()
            )));
        }

        tracing::debug!(
            pod = %identity,
            generated = identity.is_generated(),
            path = %path.display(),
            "Allocated unique host path"
        );

        Ok(Allocation {
            path,
            identity,
            allocation_id,
            dataset_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hostpath_types::{FixedClock, UtcTime};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn fixed_allocator(seed: u64) -> PathAllocator<FixedClock, SeededEntropy> {
        let clock = FixedClock::new(UtcTime::from_chrono(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        PathAllocator::new(clock, SeededEntropy::new(seed))
    }

    #[test]
    fn test_allocate_with_pod_name() {
        let allocator = PathAllocator::system();
        let base = Path::new("/runtime-mnt/juicefs/default");
        let alloc = allocator
            .allocate(base, "test", "", "/runtime-mnt/juicefs/default/jfsdemo")
            .unwrap();

        assert_eq!(alloc.identity.as_str(), "test");
        assert_eq!(alloc.dataset_dir, "jfsdemo-fuse-mount");
        assert!(alloc.path.starts_with("/runtime-mnt/juicefs/default/test"));
        assert!(alloc.path.ends_with("jfsdemo-fuse-mount"));
        assert!(PathFormatValidator::new(base).validate(&alloc.path));
    }

    #[test]
    fn test_allocate_strips_trailing_separator() {
        let allocator = fixed_allocator(1);
        let alloc = allocator
            .allocate(Path::new("/base"), "test", "", "/runtime-mnt/juicefs/default/jfsdemo/")
            .unwrap();
        assert_eq!(alloc.dataset_dir, "jfsdemo-fuse-mount");
    }

    #[test]
    fn test_allocate_with_generate_name() {
        let allocator = fixed_allocator(2);
        let alloc = allocator
            .allocate(Path::new("/base"), "", "test", "/data/jfsdemo")
            .unwrap();
        assert_eq!(alloc.identity.as_str(), "test--generate-name");
        assert!(alloc.path.starts_with("/base/test--generate-name"));
    }

    #[test]
    fn test_allocate_rejects_unusable_dataset_path() {
        let allocator = fixed_allocator(3);
        for bad in ["", "/", "/data/.."] {
            let err = allocator
                .allocate(Path::new("/base"), "pod", "", bad)
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{:?}: {}", bad, err);
        }
    }

    #[test]
    fn test_allocate_rejects_identity_outside_base() {
        let allocator = fixed_allocator(7);
        let base = Path::new("/runtime-mnt/juicefs");
        for (name, generate_name) in [("/etc", ""), ("a/b", ""), ("..", ""), (".", ""), ("", "/")] {
            let err = allocator
                .allocate(base, name, generate_name, "/data/ds")
                .unwrap_err();
            assert!(
                matches!(err, Error::InvalidInput(_)),
                "{:?}/{:?}: {}",
                name,
                generate_name,
                err
            );
        }
    }

    #[test]
    fn test_allocate_rejects_base_with_parent_component() {
        let allocator = fixed_allocator(8);
        let err = allocator
            .allocate(Path::new("/runtime-mnt/../etc"), "pod", "", "/data/ds")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_allocated_paths_always_validate() {
        let allocator = fixed_allocator(9);
        let base = Path::new("/runtime-mnt/juicefs");
        let validator = PathFormatValidator::new(base);
        for (name, generate_name) in [("web-0", ""), ("", "job-"), ("", ""), ("a.b", "")] {
            let alloc = allocator
                .allocate(base, name, generate_name, "/data/ds")
                .unwrap();
            assert!(validator.validate(&alloc.path), "{}", alloc.path.display());
        }
    }

    #[test]
    fn test_unique_segment() {
        let allocator = fixed_allocator(4);
        let alloc = allocator
            .allocate(Path::new("/base"), "pod", "", "/data/ds")
            .unwrap();
        let expected = PathBuf::from(format!("pod/{}", alloc.allocation_id));
        assert_eq!(alloc.unique_segment(), expected);
        assert_eq!(
            alloc.path,
            Path::new("/base").join(&expected).join("ds-fuse-mount")
        );
    }

    #[test]
    fn test_identical_inputs_yield_distinct_ids_at_same_instant() {
        // Time is frozen: distinctness comes from the random suffix alone.
        let allocator = fixed_allocator(5);
        let a = allocator.allocate(Path::new("/b"), "p", "", "/d/x").unwrap();
        let b = allocator.allocate(Path::new("/b"), "p", "", "/d/x").unwrap();
        assert_eq!(a.allocation_id.timestamp(), b.allocation_id.timestamp());
        assert_ne!(a.allocation_id, b.allocation_id);
        assert_ne!(a.path, b.path);
    }

    #[test]
    fn test_timestamp_comes_from_clock() {
        let clock = FixedClock::new(UtcTime::from_chrono(Utc.timestamp_opt(0, 1234).unwrap()));
        let allocator = PathAllocator::new(clock.clone(), SeededEntropy::new(6));
        let a = allocator.allocate(Path::new("/b"), "p", "", "/d/x").unwrap();
        assert_eq!(a.allocation_id.timestamp(), 1234);
        assert!(a.allocation_id.to_string().starts_with("0000000000001234-"));

        clock.advance_nanos(1);
        let b = allocator.allocate(Path::new("/b"), "p", "", "/d/x").unwrap();
        assert_eq!(b.allocation_id.timestamp(), 1235);
    }

    #[test]
    fn test_seeded_entropy_is_reproducible() {
        let a = SeededEntropy::new(42).random_suffix(8);
        let b = SeededEntropy::new(42).random_suffix(8);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert!(a.bytes().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_concurrent_allocations_are_distinct() {
        let allocator = Arc::new(PathAllocator::system());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                std::thread::spawn(move || {
                    (0..200)
                        .map(|_| {
                            allocator
                                .allocate(Path::new("/base"), "pod", "", "/d/ds")
                                .unwrap()
                                .path
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for path in handle.join().unwrap() {
                assert!(seen.insert(path), "duplicate allocation");
            }
        }
        assert_eq!(seen.len(), 1600);
    }
}
