//! Host version gating.
//!
//! Patch files may pin the host version they were written against with a
//! semver requirement such as `">=1.5.0, <1.6.0"`. Host versions are not
//! always semver: games report `1.5` or four-part assembly versions like
//! `1.5.6.22018`, so they are normalized first.

use semver::{Version, VersionReq};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    InvalidVersion { value: String, source: String },
    InvalidRequirement { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid host version '{}': {}", value, source)
            }
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid host_version_range '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Parse a host version, padding `major.minor` with `.0` and folding a
/// fourth component into build metadata.
///
/// ```
/// use il_patcher::config::version::normalize_host_version;
///
/// assert_eq!(normalize_host_version("1.5").unwrap().to_string(), "1.5.0");
/// assert_eq!(
///     normalize_host_version("1.5.6.22018").unwrap().to_string(),
///     "1.5.6+22018"
/// );
/// ```
pub fn normalize_host_version(value: &str) -> Result<Version, VersionError> {
    let trimmed = value.trim();
    let invalid = |source: String| VersionError::InvalidVersion {
        value: value.to_string(),
        source,
    };

    // Pre-release and build suffixes go straight to semver.
    if trimmed.contains(['-', '+']) {
        return Version::parse(trimmed).map_err(|e| invalid(e.to_string()));
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    let candidate = match parts.as_slice() {
        [major] => format!("{major}.0.0"),
        [major, minor] => format!("{major}.{minor}.0"),
        [_, _, _] => trimmed.to_string(),
        [major, minor, patch, build] => format!("{major}.{minor}.{patch}+{build}"),
        _ => return Err(invalid(format!("expected 1 to 4 components, found {}", parts.len()))),
    };
    Version::parse(&candidate).map_err(|e| invalid(e.to_string()))
}

/// Check if a host version satisfies a requirement string. A missing or
/// blank requirement matches every version.
///
/// ```
/// use il_patcher::config::version::matches_requirement;
///
/// assert!(matches_requirement("1.5.6", Some(">=1.5.0, <1.6.0")).unwrap());
/// assert!(matches_requirement("1.5.6.22018", Some("~1.5")).unwrap());
/// assert!(!matches_requirement("1.6", Some("<1.6.0")).unwrap());
/// assert!(matches_requirement("2.0", None).unwrap());
/// ```
pub fn matches_requirement(
    version: &str,
    requirement: Option<&str>,
) -> Result<bool, VersionError> {
    let Some(req_str) = requirement else {
        return Ok(true);
    };
    let req_str = req_str.trim();
    if req_str.is_empty() {
        return Ok(true);
    }

    let version = normalize_host_version(version)?;
    let req = VersionReq::parse(req_str).map_err(|e| VersionError::InvalidRequirement {
        value: req_str.to_string(),
        source: e.to_string(),
    })?;

    Ok(req.matches(&version))
}
