//! Component identity and version labels.
//!
//! A component is a named, versioned unit of code living in a scope. Its
//! identity is the `(scope, name)` pair; a [`ComponentRef`] pins that
//! identity to a specific [`VersionLabel`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A component's identity: the scope that owns it plus its name.
///
/// The scope is authoritative for the component's canonical history; other
/// scopes may hold cached copies obtained through the dependency graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId {
    /// Name of the owning (authoritative) scope.
    pub scope: String,
    /// Component name within the scope.
    pub name: String,
}

impl ComponentId {
    /// Create a new component identity.
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
        }
    }

    /// Pin this identity to a version label.
    pub fn at(&self, version: VersionLabel) -> ComponentRef {
        ComponentRef {
            id: self.clone(),
            version,
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

/// A component pinned to a specific version label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentRef {
    /// The component's identity.
    pub id: ComponentId,
    /// The pinned version label.
    pub version: VersionLabel,
}

impl ComponentRef {
    /// Create a new pinned reference.
    pub fn new(id: ComponentId, version: VersionLabel) -> Self {
        Self { id, version }
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// A `major.minor.patch` version label, e.g. `0.0.1`.
///
/// Labels order numerically per field, so `0.0.10 > 0.0.9`. The label is a
/// naming concern only: history topology is carried by version object
/// parent chains, never inferred from label ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionLabel {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionLabel {
    /// Create a label from its three fields.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The conventional first label, `0.0.1`.
    pub const fn first() -> Self {
        Self::new(0, 0, 1)
    }

    /// The label with the patch field incremented.
    pub fn bump_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }
}

impl FromStr for VersionLabel {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let mut field = || -> Result<u64, TypeError> {
            parts
                .next()
                .ok_or_else(|| TypeError::InvalidVersionLabel(s.to_string()))?
                .parse::<u64>()
                .map_err(|_| TypeError::InvalidVersionLabel(s.to_string()))
        };
        let major = field()?;
        let minor = field()?;
        let patch = field()?;
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for VersionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for VersionLabel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionLabel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
