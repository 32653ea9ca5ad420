//! Module identity
//!
//! A [`ModuleKey`] names a module across all of its versions; a
//! [`ModuleRef`] pins one version of it.

use crate::error::IdentityError;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `namespace/name`: the unit at which hot swaps are serialized and the
/// dependency graph must stay acyclic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleKey {
    pub namespace: String,
    pub name: String,
}

impl ModuleKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `namespace/name`; a bare `name` is placed in `default_namespace`.
    pub fn parse_in(input: &str, default_namespace: &str) -> Result<Self, IdentityError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(IdentityError::Empty);
        }
        match input.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            Some(_) => Err(IdentityError::InvalidKey(input.to_string())),
            None => Ok(Self::new(default_namespace, input)),
        }
    }

    pub fn at(&self, version: Version) -> ModuleRef {
        ModuleRef::new(self.namespace.clone(), self.name.clone(), version)
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ModuleKey {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some(_) => Self::parse_in(s, ""),
            None if s.trim().is_empty() => Err(IdentityError::Empty),
            None => Err(IdentityError::InvalidKey(s.to_string())),
        }
    }
}

/// `namespace/name@version`. Field order follows the persisted
/// `dependents` shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleRef {
    pub name: String,
    pub version: Version,
    pub namespace: String,
}

impl ModuleRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            namespace: namespace.into(),
        }
    }

    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(self.namespace.clone(), self.name.clone())
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.namespace, self.name, self.version)
    }
}

impl FromStr for ModuleRef {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, version) = s
            .trim()
            .rsplit_once('@')
            .ok_or_else(|| IdentityError::InvalidRef(s.to_string()))?;
        let key: ModuleKey = key.parse()?;
        let version = Version::parse(version).map_err(|e| IdentityError::InvalidVersion {
            input: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(key.at(version))
    }
}
