//! Version identity and the reserved property names of the versioning layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lower validity bound of a versioned entity.
pub const VALID_FROM: &str = "__valid_from__";

/// Upper validity bound of a versioned entity.
pub const VALID_TO: &str = "__valid_to__";

/// Logical delete marker, interpreted at the next commit.
pub const DELETED: &str = "__deleted__";

/// Latest allocated version, kept on the reference node.
pub const LATEST_VERSION: &str = "__latest_version__";

/// Relationship type linking a holder to its previous snapshot.
pub const PREV_VERSION: &str = "__PREV_VERSION__";

/// Returns true for keys owned by the versioning layer.
///
/// Internal keys never count as a property change and are hidden from
/// enumerations.
#[must_use]
pub fn is_internal_key(key: &str) -> bool {
    matches!(key, VALID_FROM | VALID_TO | DELETED | LATEST_VERSION)
}

/// A committed transaction's version number.
///
/// Versions are allocated once per commit, starting at 1. [`Version::ZERO`]
/// means nothing has been committed yet.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The version before the first commit.
    pub const ZERO: Self = Self(0);

    /// Creates a version from its number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns the version directly before this one, saturating at zero.
    #[must_use]
    pub const fn previous(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Returns the version directly after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_keys() {
        assert!(is_internal_key(VALID_FROM));
        assert!(is_internal_key(VALID_TO));
        assert!(is_internal_key(DELETED));
        assert!(is_internal_key(LATEST_VERSION));
        assert!(!is_internal_key("name"));
        assert!(!is_internal_key(PREV_VERSION));
    }

    #[test]
    fn test_version_arithmetic() {
        assert_eq!(Version::new(5).previous(), Version::new(4));
        assert_eq!(Version::ZERO.previous(), Version::ZERO);
        assert_eq!(Version::new(5).next().value(), 6);
        assert!(Version::new(2) > Version::new(1));
    }

    #[test]
    fn test_version_display() {
        assert_eq!(Version::new(42).to_string(), "42");
    }
}
