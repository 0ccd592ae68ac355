use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Appended to a Pod's `generateName` when the Pod has no name yet.
pub const GENERATE_NAME_SUFFIX: &str = "--generate-name";

/// Suffix of every leaf (bind-mount target) directory.
pub const FUSE_MOUNT_SUFFIX: &str = "-fuse-mount";

/// Width of the timestamp half of an [`AllocationId`].
pub const ALLOCATION_TIMESTAMP_DIGITS: usize = 16;

/// Width of the random half of an [`AllocationId`].
pub const ALLOCATION_SUFFIX_LEN: usize = 8;

const TIMESTAMP_MODULUS: u128 = 10_000_000_000_000_000;

/// Name of the leaf directory for a dataset.
pub fn dataset_mount_dir(dataset_name: &str) -> String {
    format!("{}{}", dataset_name, FUSE_MOUNT_SUFFIX)
}

/// The per-Pod directory segment directly below the base path.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodIdentity(String);

impl PodIdentity {
    /// The Pod name if set, otherwise `generate_name` plus
    /// [`GENERATE_NAME_SUFFIX`] so it cannot equal a real Pod name.
    pub fn resolve(name: &str, generate_name: &str) -> Self {
        if name.is_empty() {
            Self(format!("{}{}", generate_name, GENERATE_NAME_SUFFIX))
        } else {
            Self(name.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identity was derived from a `generateName` prefix.
    pub fn is_generated(&self) -> bool {
        self.0.ends_with(GENERATE_NAME_SUFFIX)
    }

    /// Check that the identity is usable as exactly one path segment.
    ///
    /// Admission runs before the API server validates Pod names, so the raw
    /// name may be absolute or contain separators.
    pub fn check_segment(&self) -> Result<(), Error> {
        let s = self.0.as_str();
        if s.is_empty() || s == "." || s == ".." || s.contains(['/', '\0']) {
            return Err(Error::InvalidInput(format!(
                "pod identity {:?} is not a single path segment",
                s
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for PodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PodIdentity({})", self.0)
    }
}

impl fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PodIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifies one sidecar mount instance: `<16 digits>-<8 lowercase alnum>`.
///
/// The timestamp half is nanoseconds since the Unix epoch reduced modulo
/// 10^16, so the rendered width is fixed. The reduction wraps roughly every
/// 115 days: ids are unique through the suffix but do not sort by creation
/// time across a wrap.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationId {
    timestamp: u64,
    suffix: String,
}

impl AllocationId {
    /// Build an id from a raw nanosecond timestamp and a random suffix.
    ///
    /// The suffix must already be [`ALLOCATION_SUFFIX_LEN`] lowercase
    /// alphanumeric characters.
    pub fn new(timestamp_nanos: u128, suffix: impl Into<String>) -> Result<Self, Error> {
        let suffix = suffix.into();
        if !is_valid_suffix(&suffix) {
            return Err(Error::InvalidInput(format!(
                "allocation suffix {:?} must be {} lowercase alphanumeric characters",
                suffix, ALLOCATION_SUFFIX_LEN
            )));
        }
        Ok(Self {
            // Lossless: the modulus is below u64::MAX.
            timestamp: (timestamp_nanos % TIMESTAMP_MODULUS) as u64,
            suffix,
        })
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Strict grammar check without allocating.
    pub fn is_well_formed(s: &str) -> bool {
        match s.split_once('-') {
            Some((ts, suffix)) => {
                ts.len() == ALLOCATION_TIMESTAMP_DIGITS
                    && ts.bytes().all(|b| b.is_ascii_digit())
                    && is_valid_suffix(suffix)
            }
            None => false,
        }
    }
}

fn is_valid_suffix(s: &str) -> bool {
    s.len() == ALLOCATION_SUFFIX_LEN
        && s.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

impl FromStr for AllocationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_well_formed(s) {
            return Err(Error::InvalidInput(format!(
                "{:?} is not a valid allocation id",
                s
            )));
        }
        // Both halves were checked above.
        let (ts, suffix) = s.split_at(ALLOCATION_TIMESTAMP_DIGITS);
        let timestamp = ts
            .parse::<u64>()
            .map_err(|e| Error::InvalidInput(format!("allocation timestamp {:?}: {}", ts, e)))?;
        Ok(Self {
            timestamp,
            suffix: suffix[1..].to_string(),
        })
    }
}

impl fmt::Debug for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AllocationId({})", self)
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0width$}-{}",
            self.timestamp,
            self.suffix,
            width = ALLOCATION_TIMESTAMP_DIGITS
        )
    }
}

impl Serialize for AllocationId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AllocationId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_identity_prefers_name() {
        let id = PodIdentity::resolve("web-0", "web-");
        assert_eq!(id.as_str(), "web-0");
        assert!(!id.is_generated());
    }

    #[test]
    fn test_pod_identity_generate_name() {
        let id = PodIdentity::resolve("", "test");
        assert_eq!(id.as_str(), "test--generate-name");
        assert!(id.is_generated());
        assert_eq!(format!("{:?}", id), "PodIdentity(test--generate-name)");
    }

    #[test]
    fn test_pod_identity_segment_check() {
        for ok in ["web-0", "test--generate-name", "a.b", "..."] {
            assert!(PodIdentity::resolve(ok, "").check_segment().is_ok(), "{ok}");
        }
        for bad in ["/etc", "a/b", "..", ".", "a\0b"] {
            let err = PodIdentity::resolve(bad, "").check_segment().unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{bad:?}");
        }
        assert!(PodIdentity::resolve("", "/").check_segment().is_err());
        assert!(PodIdentity::resolve("", "").check_segment().is_ok());
    }

    #[test]
    fn test_allocation_id_zero_pads() {
        let id = AllocationId::new(42, "abcd1234").unwrap();
        assert_eq!(id.to_string(), "0000000000000042-abcd1234");
    }

    #[test]
    fn test_allocation_id_reduces_wide_timestamps() {
        // A present-day nanosecond timestamp has 19 digits.
        let id = AllocationId::new(1_760_000_000_123_456_789, "zz00zz00").unwrap();
        let rendered = id.to_string();
        assert_eq!(rendered, "0000000123456789-zz00zz00");
        assert_eq!(rendered.len(), ALLOCATION_TIMESTAMP_DIGITS + 1 + ALLOCATION_SUFFIX_LEN);
    }

    #[test]
    fn test_allocation_id_rejects_bad_suffix() {
        assert!(AllocationId::new(1, "ABCD1234").is_err());
        assert!(AllocationId::new(1, "abc").is_err());
        assert!(AllocationId::new(1, "abcd-123").is_err());
    }

    #[test]
    fn test_allocation_id_parse() {
        let id: AllocationId = "1234567890123456-a1b2c3d4".parse().unwrap();
        assert_eq!(id.timestamp(), 1_234_567_890_123_456);
        assert_eq!(id.suffix(), "a1b2c3d4");
        assert_eq!(id.to_string(), "1234567890123456-a1b2c3d4");
    }

    #[test]
    fn test_allocation_id_well_formed() {
        assert!(AllocationId::is_well_formed("0000000000000001-00000000"));
        assert!(!AllocationId::is_well_formed("123-abcdefgh"));
        assert!(!AllocationId::is_well_formed("12345678901234567-abcdefgh"));
        assert!(!AllocationId::is_well_formed("1234567890123456-ABCDEFGH"));
        assert!(!AllocationId::is_well_formed("1234567890123456-abcdefg"));
        assert!(!AllocationId::is_well_formed("1234567890123456abcdefgh"));
        assert!(!AllocationId::is_well_formed("123456789012345x-abcdefgh"));
        assert!(!AllocationId::is_well_formed(""));
    }

    #[test]
    fn test_allocation_id_serde() {
        let id = AllocationId::new(7, "q1w2e3r4").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0000000000000007-q1w2e3r4\"");
        let parsed: AllocationId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
        assert!(serde_json::from_str::<AllocationId>("\"7-q1w2e3r4\"").is_err());
    }

    #[test]
    fn test_dataset_mount_dir() {
        assert_eq!(dataset_mount_dir("jfsdemo"), "jfsdemo-fuse-mount");
    }
}
