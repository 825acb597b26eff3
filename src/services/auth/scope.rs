//! OAuth2 scope sets and the per-request scope check.
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::route_policy::{RoutePolicy, ScopeSource};

/// The `scope` claim as providers send it: usually a space-delimited string,
/// occasionally a JSON array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum ScopesDto {
    String(String),
    Array(Vec<String>),
}

impl From<Option<ScopesDto>> for Scopes {
    fn from(dto: Option<ScopesDto>) -> Self {
        match dto {
            Some(ScopesDto::String(s)) => Self::parse(&s),
            Some(ScopesDto::Array(arr)) => arr.iter().flat_map(|s| s.split_whitespace()).collect(),
            None => Self::new(),
        }
    }
}

impl From<Scopes> for ScopesDto {
    fn from(s: Scopes) -> Self {
        ScopesDto::String(s.to_string())
    }
}

/// A set of whole scope tokens.
///
/// Membership is exact token equality: `read` is not satisfied by `readonly`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<ScopesDto>", into = "ScopesDto")]
pub struct Scopes(BTreeSet<String>);

impl Scopes {
    #[inline]
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Splits a space-delimited scope string. Runs of whitespace are ignored,
    /// so `""` and `"  "` both yield the empty set.
    pub fn parse(s: &str) -> Self {
        s.split_whitespace().collect()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Checks that every scope in `required` is held by this set.
    /// An empty requirement is always satisfied.
    pub fn contains_all(&self, required: &Scopes) -> bool {
        required.iter().all(|scope| self.contains(scope))
    }

    /// Scopes of `self` that `granted` does not hold.
    pub fn missing_from<'a>(&'a self, granted: &'a Scopes) -> impl Iterator<Item = &'a str> {
        self.iter().filter(move |scope| !granted.contains(scope))
    }
}

impl<'a> FromIterator<&'a str> for Scopes {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_owned).collect())
    }
}

impl fmt::Display for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for scope in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(scope)?;
            first = false;
        }
        Ok(())
    }
}

/// The token was valid but did not carry every scope the route requires.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("insufficient scope: missing {missing:?} (required by {required_by:?})")]
pub struct InsufficientScope {
    pub missing: Vec<String>,
    pub required_by: ScopeSource,
}

/// Resolves the scopes `path` requires and checks `granted` holds all of them.
pub fn authorize(
    policy: &RoutePolicy,
    path: &str,
    granted: &Scopes,
) -> Result<(), InsufficientScope> {
    let resolved = policy.resolve(path);
    if granted.contains_all(resolved.scopes) {
        return Ok(());
    }

    Err(InsufficientScope {
        missing: resolved
            .scopes
            .missing_from(granted)
            .map(str::to_owned)
            .collect(),
        required_by: resolved.source,
    })
}
