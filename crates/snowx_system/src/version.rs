//! Semantic versions with wildcard patches and range checks.
//!
//! A [`Version`] is `major.minor.patch`, where the patch may be the wildcard
//! `*`. A wildcarded version only describes a constraint: it can be used as
//! the *condition* of a comparison, but every comparison performed *on* it
//! fails with [`VersionError::WildcardOperation`].
//!
//! # Example
//!
//! ```
//! use snowx_system::version::{Version, VersionRange};
//!
//! let installed: Version = "1.2.5".parse().unwrap();
//!
//! // "1.2" is shorthand for "1.2.*"
//! assert!(installed.satisfies(&"1.2".parse().unwrap()).unwrap());
//!
//! let range = VersionRange::from_bounds(&[Some("1.0.0"), None]).unwrap();
//! assert!(installed.auto_check(&range).unwrap());
//! ```

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing or comparing versions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The text is not `major.minor[.patch|*]`.
    #[error("invalid version: <{0}>")]
    Invalid(String),

    /// A comparison was attempted on a version whose patch is a wildcard.
    #[error("cannot compare wildcard version")]
    WildcardOperation,

    /// More than two bounds were supplied for a range.
    #[error("a version range takes at most two bounds, got {0}")]
    TooManyBounds(usize),
}

// ─────────────────────────────────────────────────────────────────────────────
// Version
// ─────────────────────────────────────────────────────────────────────────────

/// A `major.minor.patch` version whose patch may be a wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    major: u32,
    minor: u32,
    /// `None` is the wildcard patch.
    patch: Option<u32>,
}

impl Version {
    /// Creates a concrete version.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch: Some(patch),
        }
    }

    /// Creates a `major.minor.*` constraint.
    #[must_use]
    pub const fn wildcard(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            patch: None,
        }
    }

    /// Parses `major.minor`, `major.minor.patch` or `major.minor.*`.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::Invalid`] when the text has the wrong number
    /// of parts or a part is not a number.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::Invalid(text.to_string());

        let mut parts: Vec<&str> = text.split('.').collect();
        if parts.len() == 2 {
            parts.push("*");
        }
        let [major, minor, patch] = parts.as_slice() else {
            return Err(invalid());
        };

        let major = major.trim().parse::<u32>().map_err(|_| invalid())?;
        let minor = minor.trim().parse::<u32>().map_err(|_| invalid())?;
        let patch = match patch.trim() {
            "*" => None,
            value => Some(value.parse::<u32>().map_err(|_| invalid())?),
        };

        Ok(Self {
            major,
            minor,
            patch,
        })
    }

    /// Major component.
    #[must_use]
    pub fn major(&self) -> u32 {
        self.major
    }

    /// Minor component.
    #[must_use]
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Patch component, `None` for the wildcard.
    #[must_use]
    pub fn patch(&self) -> Option<u32> {
        self.patch
    }

    /// Returns true if the patch is the wildcard `*`.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.patch.is_none()
    }

    fn concrete_patch(&self) -> Result<u32, VersionError> {
        self.patch.ok_or(VersionError::WildcardOperation)
    }

    /// Point check: same major and minor, and the same patch unless the
    /// condition's patch is a wildcard.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::WildcardOperation`] if `self` is wildcarded.
    pub fn satisfies(&self, condition: &Version) -> Result<bool, VersionError> {
        let patch = self.concrete_patch()?;

        if self.major != condition.major || self.minor != condition.minor {
            return Ok(false);
        }
        Ok(condition.patch.is_none_or(|wanted| wanted == patch))
    }

    /// Checks one side of a range. `upper` selects `<=` instead of `>=`.
    fn within_bound(&self, bound: Option<&Version>, upper: bool) -> Result<bool, VersionError> {
        let patch = self.concrete_patch()?;
        let Some(bound) = bound else {
            return Ok(true);
        };

        let ordering = (self.major, self.minor).cmp(&(bound.major, bound.minor));
        if ordering.is_ne() {
            return Ok(ordering.is_lt() == upper);
        }

        Ok(match bound.patch {
            None => true,
            Some(limit) if upper => patch <= limit,
            Some(limit) => patch >= limit,
        })
    }

    /// Range check against optional lower and upper bounds (both inclusive).
    /// A missing bound is unbounded; a wildcarded bound only constrains
    /// major and minor.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::WildcardOperation`] if `self` is wildcarded.
    pub fn in_range(
        &self,
        min: Option<&Version>,
        max: Option<&Version>,
    ) -> Result<bool, VersionError> {
        Ok(self.within_bound(min, false)? && self.within_bound(max, true)?)
    }

    /// Dispatches on the shape of `range`: any version, a point check, or a
    /// bounded check.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::WildcardOperation`] if `self` is wildcarded.
    pub fn auto_check(&self, range: &VersionRange) -> Result<bool, VersionError> {
        match range {
            VersionRange::Any => Ok(true),
            VersionRange::Exact(None) => {
                self.concrete_patch()?;
                Ok(true)
            }
            VersionRange::Exact(Some(condition)) => self.satisfies(condition),
            VersionRange::Between(min, max) => self.in_range(min.as_ref(), max.as_ref()),
        }
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
            None => write!(f, "{}.{}.*", self.major, self.minor),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// VersionRange
// ─────────────────────────────────────────────────────────────────────────────

/// Up to two version bounds, as declared in plugin metadata.
///
/// A missing bound (`None`) is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionRange {
    /// No constraint.
    #[default]
    Any,
    /// A single point condition.
    Exact(Option<Version>),
    /// Inclusive lower and upper bounds.
    Between(Option<Version>, Option<Version>),
}

impl VersionRange {
    /// Builds a range from zero, one or two optional version strings.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::TooManyBounds`] for more than two entries and
    /// [`VersionError::Invalid`] if a bound does not parse.
    pub fn from_bounds<S: AsRef<str>>(bounds: &[Option<S>]) -> Result<Self, VersionError> {
        let parse = |bound: &Option<S>| {
            bound
                .as_ref()
                .map(|text| Version::parse(text.as_ref()))
                .transpose()
        };

        match bounds {
            [] => Ok(Self::Any),
            [only] => Ok(Self::Exact(parse(only)?)),
            [min, max] => Ok(Self::Between(parse(min)?, parse(max)?)),
            _ => Err(VersionError::TooManyBounds(bounds.len())),
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |bound: &Option<Version>| match bound {
            Some(version) => version.to_string(),
            None => "*".to_string(),
        };
        match self {
            Self::Any => f.write_str("any"),
            Self::Exact(bound) => f.write_str(&show(bound)),
            Self::Between(min, max) => write!(f, "[{}, {}]", show(min), show(max)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        text.parse().unwrap()
    }

    #[test]
    fn two_part_version_implies_wildcard_patch() {
        let version = v("1.2");
        assert!(version.has_wildcard());
        assert_eq!(version.to_string(), "1.2.*");
    }

    #[test]
    fn rejects_malformed_versions() {
        for text in ["1", "1.2.3.4", "a.b.c", "1..2", "", "1.2.x"] {
            assert!(
                matches!(Version::parse(text), Err(VersionError::Invalid(_))),
                "{text} should be rejected"
            );
        }
    }

    #[test]
    fn wildcard_condition_ignores_patch() {
        assert!(v("1.2.5").satisfies(&v("1.2.*")).unwrap());
        assert!(v("1.2.0").satisfies(&v("1.2")).unwrap());
        assert!(!v("1.3.5").satisfies(&v("1.2.*")).unwrap());
    }

    #[test]
    fn exact_condition_compares_patch() {
        assert!(v("1.2.5").satisfies(&v("1.2.5")).unwrap());
        assert!(!v("1.2.5").satisfies(&v("1.2.4")).unwrap());
    }

    #[test]
    fn operations_on_wildcard_fail() {
        let wild = v("1.2.*");
        assert_eq!(
            wild.satisfies(&v("1.2.5")),
            Err(VersionError::WildcardOperation)
        );
        assert_eq!(
            wild.in_range(None, None),
            Err(VersionError::WildcardOperation)
        );
        assert_eq!(
            wild.auto_check(&VersionRange::Any),
            Ok(true),
            "an unconstrained check never compares"
        );
        assert_eq!(
            wild.auto_check(&VersionRange::Exact(None)),
            Err(VersionError::WildcardOperation)
        );
    }

    #[test]
    fn range_bounds_are_inclusive_and_optional() {
        let version = v("2.3.4");
        assert!(version.in_range(Some(&v("2.3.4")), Some(&v("2.3.4"))).unwrap());
        assert!(version.in_range(Some(&v("1.0.0")), None).unwrap());
        assert!(version.in_range(None, Some(&v("3.0.0"))).unwrap());
        assert!(!version.in_range(Some(&v("2.3.5")), None).unwrap());
        assert!(!version.in_range(None, Some(&v("2.3.3"))).unwrap());
        assert!(!version.in_range(Some(&v("2.4.0")), None).unwrap());
    }

    #[test]
    fn wildcard_bound_only_constrains_major_minor() {
        let version = v("2.3.99");
        assert!(version.in_range(Some(&v("2.3")), Some(&v("2.3"))).unwrap());
        assert!(!version.in_range(Some(&v("2.4")), None).unwrap());
    }

    #[test]
    fn auto_check_dispatches_on_bound_count() {
        let version = v("0.1.0");
        let none: [Option<&str>; 0] = [];
        assert!(version.auto_check(&VersionRange::from_bounds(&none).unwrap()).unwrap());
        assert!(
            version
                .auto_check(&VersionRange::from_bounds(&[Some("0.1")]).unwrap())
                .unwrap()
        );
        assert!(
            version
                .auto_check(&VersionRange::from_bounds(&[Some("0.0.1"), Some("0.2.0")]).unwrap())
                .unwrap()
        );
        assert!(
            !version
                .auto_check(&VersionRange::from_bounds(&[Some("0.2.0"), None]).unwrap())
                .unwrap()
        );
    }

    #[test]
    fn too_many_bounds_is_an_error() {
        let bounds = [Some("1.0.0"), Some("2.0.0"), Some("3.0.0")];
        assert_eq!(
            VersionRange::from_bounds(&bounds),
            Err(VersionError::TooManyBounds(3))
        );
    }
}
