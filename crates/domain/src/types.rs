//! Shared value types for the IndexHub build domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! several fields and participate in coordination decisions: which build mode a
//! request maps to, and whether an outcome counts as success.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BuildError, BuildId, PackageName, RepositoryKind, RepositoryUrl};

// ---------------------------------------------------------------------------
// Package descriptors
// ---------------------------------------------------------------------------

/// One package repository entry to add to, or update in, the configuration
/// document.
///
/// Created by the event-ingestion boundary; consumed by the coordinator and the
/// configuration merger. Immutable once constructed.
///
/// Serialises as `{"name"?, "version"?, "url", "type"}`, the shape carried in
/// partial-build notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Package name. `None` means the build tool is run without a package scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<PackageName>,

    /// Version constraint recorded under `require` in the configuration document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Repository URL; the de-duplication key when merging.
    pub url: RepositoryUrl,

    /// Repository type (e.g. `"vcs"`).
    #[serde(rename = "type")]
    pub kind: RepositoryKind,
}

impl PackageDescriptor {
    /// Creates a descriptor with no name and no version constraint.
    pub fn new(url: RepositoryUrl, kind: RepositoryKind) -> Self {
        Self {
            name: None,
            version: None,
            url,
            kind,
        }
    }

    /// Sets the package name. Empty names are treated as absent.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = PackageName::new(name);
        self
    }

    /// Sets the version constraint. Empty constraints are treated as absent.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        let v = version.into();
        self.version = if v.is_empty() { None } else { Some(v) };
        self
    }

    /// The build mode a partial update of this descriptor runs in.
    ///
    /// A descriptor without a name escalates to a full build.
    pub fn build_mode(&self) -> BuildMode {
        match &self.name {
            Some(name) => BuildMode::Scoped(name.clone()),
            None => BuildMode::Full,
        }
    }
}

// ---------------------------------------------------------------------------
// Build modes
// ---------------------------------------------------------------------------

/// How the build tool is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BuildMode {
    /// Rebuild the whole package index.
    Full,
    /// Rebuild only the named package.
    Scoped(PackageName),
}

impl BuildMode {
    /// The package the build is scoped to, if any.
    pub fn target(&self) -> Option<&PackageName> {
        match self {
            Self::Full => None,
            Self::Scoped(name) => Some(name),
        }
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Scoped(name) => write!(f, "scoped({name})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// The result of one coordination cycle.
///
/// Produced exactly once per accepted request: either by the coordinator after
/// processing it, or by the caller's result handle when the request was
/// discarded unprocessed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// The request this outcome belongs to.
    pub id: BuildId,

    /// `None` on success.
    pub error: Option<BuildError>,
}

impl BuildOutcome {
    /// A successful outcome.
    pub fn success(id: BuildId) -> Self {
        Self { id, error: None }
    }

    /// A failed outcome.
    pub fn failure(id: BuildId, error: BuildError) -> Self {
        Self {
            id,
            error: Some(error),
        }
    }

    /// The outcome of a request that was never executed.
    pub fn discarded(id: BuildId) -> Self {
        Self::failure(id, BuildError::Discarded)
    }

    /// Builds an outcome from a fallible step.
    pub fn from_result(id: BuildId, result: Result<(), BuildError>) -> Self {
        Self {
            id,
            error: result.err(),
        }
    }

    /// Returns `true` when no error is present.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Returns `true` when the request was discarded unprocessed.
    pub fn is_discarded(&self) -> bool {
        self.error.as_ref().is_some_and(BuildError::is_discarded)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Seconds since the Unix epoch.
    pub fn unix_seconds(self) -> i64 {
        self.0.timestamp()
    }
}
