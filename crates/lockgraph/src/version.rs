//! Library versions and version constraints.
//!
//! Versions are semantic versions, parsed leniently so that `1.0` and `1`
//! are accepted as `1.0.0`. A fourth numeric component, as in
//! `3.4.1.9004`, is kept as `rev.9004` build metadata and rendered back in
//! its four-part form by [`display_version`]. A zero revision is dropped.
//!
//! A constraint has two textual renderings:
//!
//! - the declaration form used in dependency groups: `>= 1.0.0`,
//!   `>= 1.0.0 < 2.0.0`, `[1.0.0]`
//! - the short form stored as target-library dependency values: `1.0.0`
//!   (minimum only), `[1.0.0]` (exact), `[1.0.0, 2.0.0)` (anything else)
//!
//! [`VersionRange::parse`] accepts both.

use semver::{BuildMetadata, Version};
use std::fmt;
use thiserror::Error;

/// Errors that can occur when parsing versions and constraints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version '{0}': {1}")]
    InvalidVersion(String, String),

    #[error("invalid version constraint '{0}': {1}")]
    InvalidRange(String, &'static str),
}

/// Build metadata identifier that carries a fourth version component.
const REVISION: &str = "rev";

/// Parse a version, padding missing minor/patch components with zero.
///
/// # Errors
///
/// Returns an error if the text is not a (possibly abbreviated or four-part)
/// semver version.
pub fn parse_version(text: &str) -> Result<Version, VersionError> {
    let invalid = |reason: String| VersionError::InvalidVersion(text.to_string(), reason);

    let trimmed = text.trim();
    let (core, suffix) = match trimmed.find(['-', '+']) {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };

    let parts: Vec<&str> = core.split('.').collect();
    let (normalized, revision) = match parts.as_slice() {
        [major] if !major.is_empty() => (format!("{major}.0.0{suffix}"), None),
        [major, minor] => (format!("{major}.{minor}.0{suffix}"), None),
        [major, minor, patch, revision] => {
            (format!("{major}.{minor}.{patch}{suffix}"), Some(*revision))
        }
        _ => (trimmed.to_string(), None),
    };

    let mut version = Version::parse(&normalized).map_err(|e| invalid(e.to_string()))?;
    if let Some(revision) = revision {
        let number: u64 = Some(revision)
            .filter(|r| !r.is_empty() && r.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|r| r.parse().ok())
            .ok_or_else(|| invalid(format!("revision '{revision}' is not a number")))?;
        if number != 0 {
            let build = if version.build.is_empty() {
                format!("{REVISION}.{number}")
            } else {
                format!("{REVISION}.{number}.{}", version.build)
            };
            version.build = BuildMetadata::new(&build).map_err(|e| invalid(e.to_string()))?;
        }
    }
    Ok(version)
}

/// Render a version the way [`parse_version`] reads it, with a fourth
/// component restored from `rev` build metadata.
#[must_use]
pub fn display_version(version: &Version) -> impl fmt::Display + '_ {
    Displayed(version)
}

struct Displayed<'a>(&'a Version);

impl fmt::Display for Displayed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = self.0;
        let Some((revision, metadata)) = split_revision(version) else {
            return write!(f, "{version}");
        };

        write!(f, "{}.{}.{}.{revision}", version.major, version.minor, version.patch)?;
        if !version.pre.is_empty() {
            write!(f, "-{}", version.pre)?;
        }
        if !metadata.is_empty() {
            write!(f, "+{metadata}")?;
        }
        Ok(())
    }
}

fn split_revision(version: &Version) -> Option<(u64, &str)> {
    let rest = version.build.as_str().strip_prefix(REVISION)?.strip_prefix('.')?;
    let (digits, metadata) = rest.split_once('.').unwrap_or((rest, ""));
    digits.parse().ok().map(|revision| (revision, metadata))
}

/// One end of a [`VersionRange`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

impl Bound {
    #[must_use]
    pub fn inclusive(version: Version) -> Self {
        Self {
            version,
            inclusive: true,
        }
    }

    #[must_use]
    pub fn exclusive(version: Version) -> Self {
        Self {
            version,
            inclusive: false,
        }
    }
}

/// A version constraint with optional lower and upper bounds.
///
/// A range with neither bound accepts any version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VersionRange {
    min: Option<Bound>,
    max: Option<Bound>,
}

impl VersionRange {
    /// The unconstrained range.
    pub const ANY: Self = Self {
        min: None,
        max: None,
    };

    /// Build a range from explicit bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the bounds describe an empty range.
    pub fn new(min: Option<Bound>, max: Option<Bound>) -> Result<Self, VersionError> {
        if let (Some(lo), Some(hi)) = (&min, &max) {
            let empty = lo.version > hi.version
                || (lo.version == hi.version && !(lo.inclusive && hi.inclusive));
            if empty {
                let range = Self { min, max };
                return Err(VersionError::InvalidRange(
                    range.to_short_string(),
                    "lower bound is above upper bound",
                ));
            }
        }
        Ok(Self { min, max })
    }

    /// `>= version`
    #[must_use]
    pub fn at_least(version: Version) -> Self {
        Self {
            min: Some(Bound::inclusive(version)),
            max: None,
        }
    }

    /// Exactly `version`.
    #[must_use]
    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(Bound::inclusive(version.clone())),
            max: Some(Bound::inclusive(version)),
        }
    }

    #[must_use]
    pub fn min(&self) -> Option<&Bound> {
        self.min.as_ref()
    }

    #[must_use]
    pub fn max(&self) -> Option<&Bound> {
        self.max.as_ref()
    }

    /// Returns true if this range has no bounds.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Returns the pinned version if this range admits exactly one version.
    #[must_use]
    pub fn exact_version(&self) -> Option<&Version> {
        match (&self.min, &self.max) {
            (Some(lo), Some(hi)) if lo.inclusive && hi.inclusive && lo.version == hi.version => {
                Some(&lo.version)
            }
            _ => None,
        }
    }

    /// Check whether a version satisfies this range.
    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        let above_min = self.min.as_ref().map_or(true, |b| {
            if b.inclusive {
                *version >= b.version
            } else {
                *version > b.version
            }
        });
        let below_max = self.max.as_ref().map_or(true, |b| {
            if b.inclusive {
                *version <= b.version
            } else {
                *version < b.version
            }
        });
        above_min && below_max
    }

    /// Parse a constraint in declaration, short, or interval form.
    ///
    /// An empty string or `*` is the unconstrained range.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a recognizable constraint.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::ANY);
        }
        if trimmed.starts_with(['[', '(']) {
            return parse_interval(text, trimmed);
        }
        if trimmed.starts_with(['>', '<', '=']) {
            return parse_comparators(text, trimmed);
        }
        Ok(Self::at_least(parse_version(trimmed)?))
    }

    /// Render the short form stored in target-library dependency values.
    #[must_use]
    pub fn to_short_string(&self) -> String {
        match (&self.min, &self.max) {
            (None, None) => String::new(),
            (Some(lo), None) if lo.inclusive => display_version(&lo.version).to_string(),
            _ if self.exact_version().is_some() => format!("[{}]", self.min_text()),
            (lo, hi) => format!(
                "{}{}, {}{}",
                if lo.as_ref().is_some_and(|b| b.inclusive) { '[' } else { '(' },
                self.min_text(),
                self.max_text(),
                if hi.as_ref().is_some_and(|b| b.inclusive) { ']' } else { ')' },
            ),
        }
    }

    fn min_text(&self) -> String {
        self.min
            .as_ref()
            .map(|b| display_version(&b.version).to_string())
            .unwrap_or_default()
    }

    fn max_text(&self) -> String {
        self.max
            .as_ref()
            .map(|b| display_version(&b.version).to_string())
            .unwrap_or_default()
    }
}

/// Declaration form: `>= 1.0.0`, `> 1.0.0 <= 2.0.0`, `[1.0.0]`.
impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(version) = self.exact_version() {
            return write!(f, "[{}]", display_version(version));
        }

        let mut parts = Vec::with_capacity(2);
        if let Some(lo) = &self.min {
            let op = if lo.inclusive { ">=" } else { ">" };
            parts.push(format!("{op} {}", display_version(&lo.version)));
        }
        if let Some(hi) = &self.max {
            let op = if hi.inclusive { "<=" } else { "<" };
            parts.push(format!("{op} {}", display_version(&hi.version)));
        }
        f.write_str(&parts.join(" "))
    }
}

impl std::str::FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_interval(original: &str, text: &str) -> Result<VersionRange, VersionError> {
    let invalid = |reason| VersionError::InvalidRange(original.to_string(), reason);

    let min_inclusive = text.starts_with('[');
    let max_inclusive = match text.chars().last() {
        Some(']') => true,
        Some(')') => false,
        _ => return Err(invalid("interval must end with ']' or ')'")),
    };
    let inner = &text[1..text.len() - 1];

    let Some((lower, upper)) = inner.split_once(',') else {
        // `[1.0.0]` pins a single version
        if !(min_inclusive && max_inclusive) {
            return Err(invalid("single-version interval must use '[' and ']'"));
        }
        return Ok(VersionRange::exact(parse_version(inner)?));
    };

    let bound = |part: &str, inclusive: bool| -> Result<Option<Bound>, VersionError> {
        let part = part.trim();
        if part.is_empty() {
            return Ok(None);
        }
        Ok(Some(Bound {
            version: parse_version(part)?,
            inclusive,
        }))
    };

    let min = bound(lower, min_inclusive)?;
    let max = bound(upper, max_inclusive)?;
    if min.is_none() && max.is_none() {
        return Err(invalid("interval has no bounds"));
    }
    VersionRange::new(min, max)
}

#[derive(Clone, Copy)]
enum Op {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
}

fn split_operator(text: &str) -> Option<(Op, &str)> {
    [
        (">=", Op::Ge),
        ("<=", Op::Le),
        (">", Op::Gt),
        ("<", Op::Lt),
        ("=", Op::Eq),
    ]
    .into_iter()
    .find_map(|(prefix, op)| text.strip_prefix(prefix).map(|rest| (op, rest)))
}

fn parse_comparators(original: &str, text: &str) -> Result<VersionRange, VersionError> {
    let invalid = |reason| VersionError::InvalidRange(original.to_string(), reason);

    let mut min: Option<Bound> = None;
    let mut max: Option<Bound> = None;
    let mut rest = text;

    while !rest.is_empty() {
        let (op, after) = split_operator(rest).ok_or_else(|| invalid("expected a comparison operator"))?;
        let after = after.trim_start();
        let end = after.find(char::is_whitespace).unwrap_or(after.len());
        let (version_text, tail) = after.split_at(end);
        if version_text.is_empty() {
            return Err(invalid("operator is missing a version"));
        }
        let version = parse_version(version_text)?;

        let (lower, upper) = match op {
            Op::Ge => (Some(Bound::inclusive(version)), None),
            Op::Gt => (Some(Bound::exclusive(version)), None),
            Op::Le => (None, Some(Bound::inclusive(version))),
            Op::Lt => (None, Some(Bound::exclusive(version))),
            Op::Eq => (
                Some(Bound::inclusive(version.clone())),
                Some(Bound::inclusive(version)),
            ),
        };
        if lower.is_some() {
            if min.is_some() {
                return Err(invalid("more than one lower bound"));
            }
            min = lower;
        }
        if upper.is_some() {
            if max.is_some() {
                return Err(invalid("more than one upper bound"));
            }
            max = upper;
        }

        rest = tail.trim_start();
    }

    VersionRange::new(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn test_parse_version_pads_components() {
        assert_eq!(parse_version("1").unwrap(), v("1.0.0"));
        assert_eq!(parse_version("1.2").unwrap(), v("1.2.0"));
        assert_eq!(parse_version("1.2.3").unwrap(), v("1.2.3"));
        assert_eq!(
            parse_version("4.0.0-beta-23516").unwrap(),
            v("4.0.0-beta-23516")
        );
        assert_eq!(parse_version("1.0-rc1").unwrap(), v("1.0.0-rc1"));
    }

    #[test]
    fn test_parse_version_rejects_garbage() {
        assert!(parse_version("").is_err());
        assert!(parse_version("abc").is_err());
        assert!(parse_version("1.0.0.0.0").is_err());
        assert!(parse_version("1.0.0.x").is_err());
        assert!(parse_version("1.0.0.").is_err());
    }

    #[test]
    fn test_four_part_versions() {
        let version = parse_version("3.4.1.9004").unwrap();
        assert_eq!((version.major, version.minor, version.patch), (3, 4, 1));
        assert_eq!(display_version(&version).to_string(), "3.4.1.9004");
        assert!(version > v("3.4.1"));
        assert!(version < v("3.4.2"));
        assert!(version < parse_version("3.4.1.10000").unwrap());

        let tagged = parse_version("1.2.3.4-beta+sha.abc").unwrap();
        assert_eq!(display_version(&tagged).to_string(), "1.2.3.4-beta+sha.abc");

        // a zero revision normalizes away
        assert_eq!(parse_version("1.0.0.0").unwrap(), v("1.0.0"));
        assert_eq!(display_version(&v("1.0.0+build.5")).to_string(), "1.0.0+build.5");
    }

    #[test]
    fn test_four_part_range_rendering() {
        let range = VersionRange::parse("3.4.1.9004").unwrap();
        assert_eq!(range.to_short_string(), "3.4.1.9004");
        assert_eq!(range.to_string(), ">= 3.4.1.9004");
        assert!(range.contains(&parse_version("3.4.1.9005").unwrap()));
        assert!(!range.contains(&v("3.4.1")));

        let exact = VersionRange::parse("[3.4.1.9004]").unwrap();
        assert_eq!(exact.to_short_string(), "[3.4.1.9004]");
        assert_eq!(exact.to_string(), "[3.4.1.9004]");
    }

    #[test]
    fn test_bare_version_is_minimum() {
        let range = VersionRange::parse("7.0.0").unwrap();
        assert_eq!(range, VersionRange::at_least(v("7.0.0")));
        assert!(range.contains(&v("7.0.0")));
        assert!(range.contains(&v("12.0.1")));
        assert!(!range.contains(&v("6.9.9")));
    }

    #[test]
    fn test_empty_and_star_are_any() {
        assert!(VersionRange::parse("").unwrap().is_any());
        assert!(VersionRange::parse(" * ").unwrap().is_any());
        assert_eq!(VersionRange::ANY.to_string(), "");
        assert_eq!(VersionRange::ANY.to_short_string(), "");
    }

    #[test]
    fn test_parse_comparator_forms() {
        let range = VersionRange::parse(">= 1.0.0 < 2.0.0").unwrap();
        assert_eq!(range.min(), Some(&Bound::inclusive(v("1.0.0"))));
        assert_eq!(range.max(), Some(&Bound::exclusive(v("2.0.0"))));

        let tight = VersionRange::parse(">1.0 <=1.5").unwrap();
        assert!(!tight.contains(&v("1.0.0")));
        assert!(tight.contains(&v("1.5.0")));

        let pinned = VersionRange::parse("= 3.1.0").unwrap();
        assert_eq!(pinned.exact_version(), Some(&v("3.1.0")));
    }

    #[test]
    fn test_parse_interval_forms() {
        let exact = VersionRange::parse("[1.0.0]").unwrap();
        assert_eq!(exact, VersionRange::exact(v("1.0.0")));

        let half_open = VersionRange::parse("[1.0, 2.0)").unwrap();
        assert!(half_open.contains(&v("1.9.9")));
        assert!(!half_open.contains(&v("2.0.0")));

        let upper_only = VersionRange::parse("(, 2.0.0]").unwrap();
        assert!(upper_only.min().is_none());
        assert!(upper_only.contains(&v("0.1.0")));
        assert!(upper_only.contains(&v("2.0.0")));
    }

    #[test]
    fn test_parse_rejects_invalid_constraints() {
        assert!(VersionRange::parse(">=").is_err());
        assert!(VersionRange::parse(">= 1.0 >= 2.0").is_err());
        assert!(VersionRange::parse("[1.0, 2.0").is_err());
        assert!(VersionRange::parse("(1.0.0)").is_err());
        assert!(VersionRange::parse("(,)").is_err());
        assert!(VersionRange::parse("[2.0, 1.0]").is_err());
        assert!(VersionRange::parse("~> 1.0").is_err());
    }

    #[test]
    fn test_declaration_rendering() {
        assert_eq!(VersionRange::parse("7.0.0").unwrap().to_string(), ">= 7.0.0");
        assert_eq!(VersionRange::parse("[1.0, 2.0)").unwrap().to_string(), ">= 1.0.0 < 2.0.0");
        assert_eq!(VersionRange::parse("(1.0, )").unwrap().to_string(), "> 1.0.0");
        assert_eq!(VersionRange::parse("= 1.2.3").unwrap().to_string(), "[1.2.3]");
    }

    #[test]
    fn test_short_rendering() {
        assert_eq!(VersionRange::parse(">= 7.0.0").unwrap().to_short_string(), "7.0.0");
        assert_eq!(VersionRange::parse("[1.2.3]").unwrap().to_short_string(), "[1.2.3]");
        assert_eq!(
            VersionRange::parse(">= 1.0 < 2.0").unwrap().to_short_string(),
            "[1.0.0, 2.0.0)"
        );
        assert_eq!(VersionRange::parse("< 2.0").unwrap().to_short_string(), "(, 2.0.0)");
        assert_eq!(VersionRange::parse("> 1.0").unwrap().to_short_string(), "(1.0.0, )");
    }

    #[test]
    fn test_renderings_parse_back() {
        for text in [">= 1.0.0", "[1.0.0, 2.0.0)", "(, 3.0.0]", "> 0.5.0 <= 0.9.0", "[2.1.0]"] {
            let range = VersionRange::parse(text).unwrap();
            assert_eq!(VersionRange::parse(&range.to_string()).unwrap(), range);
            assert_eq!(VersionRange::parse(&range.to_short_string()).unwrap(), range);
        }
    }
}
