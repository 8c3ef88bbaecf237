//! Grammar version selection using semver requirements.
//!
//! The registry can hold several versions of one language; lookups may ask
//! for a range like ">=1.2, <2".

use semver::{Version, VersionReq};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// Invalid version requirement (e.g., ">=bad")
    InvalidRequirement { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid version requirement '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Parse a requirement string. Blank means "any version".
pub fn parse_requirement(requirement: &str) -> Result<VersionReq, VersionError> {
    let trimmed = requirement.trim();
    if trimmed.is_empty() {
        return Ok(VersionReq::STAR);
    }
    VersionReq::parse(trimmed).map_err(|e| VersionError::InvalidRequirement {
        value: trimmed.to_string(),
        source: e.to_string(),
    })
}

/// Check if a grammar version satisfies a requirement string.
///
/// ```
/// use arbor::grammar::matches_requirement;
/// use semver::Version;
///
/// let v = Version::new(1, 4, 0);
/// assert!(matches_requirement(&v, Some(">=1.2, <2")).unwrap());
/// assert!(!matches_requirement(&v, Some("^2")).unwrap());
/// assert!(matches_requirement(&v, None).unwrap());
/// ```
pub fn matches_requirement(
    version: &Version,
    requirement: Option<&str>,
) -> Result<bool, VersionError> {
    let Some(requirement) = requirement else {
        return Ok(true);
    };
    Ok(parse_requirement(requirement)?.matches(version))
}

/// Highest version in `versions` that satisfies `req`.
pub(crate) fn select<'a, T>(
    candidates: &'a [T],
    req: &VersionReq,
    version_of: impl Fn(&T) -> &Version,
) -> Option<&'a T> {
    candidates
        .iter()
        .filter(|c| req.matches(version_of(c)))
        .max_by(|a, b| version_of(a).cmp(version_of(b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_requirement_matches_everything() {
        let v = Version::new(0, 1, 0);
        assert!(matches_requirement(&v, Some("")).unwrap());
        assert!(matches_requirement(&v, Some("  ")).unwrap());
    }

    #[test]
    fn compound_requirement() {
        let req = Some(">=0.88.0, <0.90.0");
        assert!(matches_requirement(&Version::new(0, 88, 0), req).unwrap());
        assert!(matches_requirement(&Version::new(0, 89, 5), req).unwrap());
        assert!(!matches_requirement(&Version::new(0, 90, 0), req).unwrap());
    }

    #[test]
    fn invalid_requirement() {
        let err = matches_requirement(&Version::new(1, 0, 0), Some(">=bad")).unwrap_err();
        assert!(err.to_string().contains(">=bad"));
    }

    #[test]
    fn select_picks_highest_match() {
        let versions = vec![
            Version::new(1, 0, 0),
            Version::new(1, 3, 0),
            Version::new(2, 0, 0),
        ];
        let req = parse_requirement("^1").unwrap();
        let picked = select(&versions, &req, |v| v).unwrap();
        assert_eq!(picked, &Version::new(1, 3, 0));
        let req = parse_requirement("^3").unwrap();
        assert!(select(&versions, &req, |v| v).is_none());
    }
}
