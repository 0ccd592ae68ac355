//! Reclaimer for abandoned FUSE sidecar host-path directories.
//!
//! Allocated directories live at
//! `BasePath/<PodIdentity>/<AllocationId>/<dataset>-fuse-mount` and outlive
//! the Pods they were allocated for. [`DirectoryReclaimer`] scans the base
//! path and removes leaves that pass every gate:
//!
//! 1. the path matches the allocator's grammar,
//! 2. its mtime is at least `age_days` old,
//! 3. it is not mounted (see [`mount::MountProbe`]),
//! 4. it is empty at the moment of removal.
//!
//! Removal only ever uses `rmdir(2)` semantics, so a non-empty directory
//! cannot be deleted whatever the gates decided. Nothing runs unless the
//! total number of allocation directories reaches the configured threshold.
//!
//! All filesystem access goes through [`host_fs::HostFs`]; tests use
//! [`host_fs::MemoryHostFs`].

pub mod candidate;
pub mod config;
pub mod host_fs;
pub mod mount;
pub mod output;
pub mod preflight;
pub mod reclaimer;
pub mod report;
pub mod service;

pub use candidate::{LeafOutcome, SkipReason};
pub use config::{MountTableConfig, ReclaimerConfig};
pub use host_fs::{DirChild, EntryMeta, HostFs, MemoryHostFs, OsHostFs};
pub use mount::{MountProbe, MountVerdict};
pub use output::{OutputFormat, Printer};
pub use preflight::preflight;
pub use reclaimer::{Census, DirectoryReclaimer};
pub use report::{LeafDecision, PodIdentityReport, ReclaimReport};
pub use service::ReclaimerService;
