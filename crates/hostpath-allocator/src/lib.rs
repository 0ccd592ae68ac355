//! Host-path allocation for FUSE sidecar containers.
//!
//! The admission webhook calls [`PathAllocator::allocate`] once per sidecar
//! injection and embeds the returned path in the Pod's hostPath volume. Every
//! call yields a distinct directory, even for the same Pod name and dataset,
//! so a recreated Pod never sees mount state left by its predecessor.
//!
//! Allocated paths follow a closed grammar:
//!
//! ```text
//! <base>/<pod identity>/<16 digits>-<8 lowercase alnum>/<dataset>-fuse-mount
//! ```
//!
//! [`PathFormatValidator`] accepts exactly that grammar. The reclaimer never
//! touches a directory the validator rejects.

pub mod allocator;
pub mod format;
pub mod mount_root;

pub use allocator::{Allocation, EntropySource, PathAllocator, SeededEntropy, ThreadRngEntropy};
pub use format::{validate, AllocatedPathParts, PathFormatValidator};
pub use mount_root::{MountRoot, MOUNT_ROOT_ENV};
