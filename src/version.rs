// Copyright 2026 ModKit Contributors

//! Version type and the requested/provided compatibility rule (spec.md §3).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A `major.minor.patch[+build]` version.
///
/// Stored on top of [`semver::Version`] for parsing and display, but
/// compatibility is *not* delegated to `semver`'s caret-matching rules:
/// those treat `0.x` releases as breaking on minor bumps, while this engine
/// always pins on `major` and compares `(minor, patch)` lexicographically
/// regardless of major version. See [`Version::is_compatible_with`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(semver::Version);

impl Version {
    /// Construct a version directly from its numeric components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version(semver::Version::new(major, minor, patch))
    }

    /// Construct a version with build metadata.
    pub fn with_build(major: u64, minor: u64, patch: u64, build: &str) -> Result<Self, VersionError> {
        let build = semver::BuildMetadata::new(build).map_err(|e| VersionError(e.to_string()))?;
        Ok(Version(semver::Version {
            major,
            minor,
            patch,
            pre: semver::Prerelease::EMPTY,
            build,
        }))
    }

    /// Parse a version string of the form `major.minor.patch[+build]`.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        semver::Version::parse(s)
            .map(Version)
            .map_err(|e| VersionError(e.to_string()))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    /// A *requested* version `self` is satisfied by a *provided* version
    /// `provided` iff `provided.major == self.major` and
    /// `(provided.minor, provided.patch) >= (self.minor, self.patch)`.
    pub fn is_satisfied_by(&self, provided: &Version) -> bool {
        provided.0.major == self.0.major
            && (provided.0.minor, provided.0.patch) >= (self.0.minor, self.0.patch)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0.major, self.0.minor, self.0.patch)?;
        if !self.0.build.is_empty() {
            write!(f, "+{}", self.0.build)?;
        }
        Ok(())
    }
}

/// Failure to parse or build a [`Version`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid version: {0}")]
pub struct VersionError(String);
