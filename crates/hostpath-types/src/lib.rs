//! Shared types for the fuse-hostpath allocator and reclaimer.
//!
//! The on-disk layout both sides agree on is
//! `BasePath/<PodIdentity>/<AllocationId>/<dataset>-fuse-mount`. The types in
//! [`ids`] are the typed form of the two middle segments; [`error`] holds the
//! error type every crate in the workspace returns.

pub mod error;
pub mod ids;
pub mod time;

// Re-export commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::{
    dataset_mount_dir, AllocationId, PodIdentity, ALLOCATION_SUFFIX_LEN,
    ALLOCATION_TIMESTAMP_DIGITS, FUSE_MOUNT_SUFFIX, GENERATE_NAME_SUFFIX,
};
pub use time::{Clock, FixedClock, SystemClock, UtcTime};
