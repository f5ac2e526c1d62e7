//! Optimistic-concurrency primitives: row versions and write expectations.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Monotonically increasing version of a stored row.
///
/// Rows start at version 1 on insert and the version increments by exactly
/// one per successful write, as part of that write.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version assigned to a freshly inserted row.
    pub const INITIAL: Version = Version(1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// The version a row holds after one more successful write.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Optimistic concurrency expectation for a write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (internal callers, backfills).
    Any,
    /// Require the row to be at an exact version.
    Exact(Version),
}

impl ExpectedVersion {
    pub fn matches(self, actual: Version) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: Version) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::VersionConflict)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_expectation_matches_only_its_version() {
        let expected = ExpectedVersion::Exact(Version::new(3));
        assert!(expected.matches(Version::new(3)));
        assert!(!expected.matches(Version::new(4)));
        assert_eq!(
            expected.check(Version::new(4)),
            Err(DomainError::VersionConflict)
        );
    }

    #[test]
    fn any_expectation_always_matches() {
        assert!(ExpectedVersion::Any.matches(Version::INITIAL));
        assert!(ExpectedVersion::Any.matches(Version::new(42)));
    }

    #[test]
    fn next_increments_by_exactly_one() {
        assert_eq!(Version::INITIAL.next(), Version::new(2));
    }
}
