//! MATLAB release detection and capability checks.
//!
//! A release is read from `VersionInfo.xml` in the installation root. Older
//! installations without that file carry the version on the second line of
//! `toolbox/matlab/general/Contents.m`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::environment::has_placeholder;
use crate::{Error, Result};

/// Version descriptor written by current installers.
pub const VERSION_INFO_FILE: &str = "VersionInfo.xml";

/// Release assumed when the legacy contents file carries no version number (R2016b).
const DEFAULT_LEGACY_VERSION: &str = "9.1.0.888888";

static VERSION_TAG: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"<version>\s*([^<]*?)\s*</version>") {
        Ok(regex) => regex,
        Err(err) => panic!("Version tag regex is invalid: {err}"),
    });

static LEGACY_VERSION: LazyLock<Regex> = LazyLock::new(|| match Regex::new(r"(\d+)\.(\d+)") {
    Ok(regex) => regex,
    Err(err) => panic!("Legacy version regex is invalid: {err}"),
});

/// Version of a MATLAB installation.
///
/// Ordering and equality consider only `(major, minor)`; the raw string is kept
/// for display.
#[derive(Debug, Clone)]
pub struct ReleaseInfo {
    /// Major version number
    pub major: u32,
    /// Minor version number
    pub minor: u32,
    /// Version string as found on disk
    pub version: String,
}

impl ReleaseInfo {
    /// Creates a release from its two leading components.
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            version: format!("{major}.{minor}"),
        }
    }

    /// Parses a dotted `MAJOR.MINOR...` string.
    ///
    /// Components after the minor one are ignored and a missing minor counts as 0.
    pub fn parse(version: &str) -> Option<Self> {
        let mut parts = version.trim().split('.');
        let major = parts.next()?.trim().parse().ok()?;
        let minor = match parts.next() {
            Some(part) => part.trim().parse().ok()?,
            None => 0,
        };
        Some(Self {
            major,
            minor,
            version: version.trim().to_owned(),
        })
    }

    /// Whether this release is at least `major.minor`.
    pub fn is_at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl PartialEq for ReleaseInfo {
    fn eq(&self, other: &Self) -> bool {
        (self.major, self.minor) == (other.major, other.minor)
    }
}

impl Eq for ReleaseInfo {}

impl PartialOrd for ReleaseInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReleaseInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl fmt::Display for ReleaseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)
    }
}

/// Version-gated MATLAB features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `runtests` and the test runner framework
    RunTests,
    /// `-noAppIcon` startup switch
    NoAppIcon,
    /// `-batch` startup switch
    BatchMode,
    /// Cobertura code coverage reports
    CoberturaCodeCoverage,
    /// Cobertura model coverage reports
    ModelCoverage,
    /// Exporting Simulink Test Manager results
    SimulinkTestResults,
}

impl Capability {
    /// Every capability, oldest first.
    pub const ALL: [Self; 6] = [
        Self::RunTests,
        Self::NoAppIcon,
        Self::CoberturaCodeCoverage,
        Self::BatchMode,
        Self::ModelCoverage,
        Self::SimulinkTestResults,
    ];

    /// Minimum `(major, minor)` release that provides this capability.
    pub const fn threshold(self) -> (u32, u32) {
        match self {
            Self::RunTests => (8, 1),
            Self::NoAppIcon => (8, 6),
            Self::CoberturaCodeCoverage => (9, 3),
            Self::BatchMode | Self::ModelCoverage => (9, 5),
            Self::SimulinkTestResults => (9, 6),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RunTests => "running tests",
            Self::NoAppIcon => "the -noAppIcon switch",
            Self::BatchMode => "the -batch switch",
            Self::CoberturaCodeCoverage => "Cobertura code coverage",
            Self::ModelCoverage => "Cobertura model coverage",
            Self::SimulinkTestResults => "exporting Simulink Test Manager results",
        };
        f.write_str(name)
    }
}

/// Whether `release` provides `capability`.
pub fn supports(release: &ReleaseInfo, capability: Capability) -> bool {
    let (major, minor) = capability.threshold();
    release.is_at_least(major, minor)
}

/// Reads and memoizes installation releases.
///
/// One resolver lives for one build step; installations are assumed not to
/// change underneath it.
#[derive(Debug, Default)]
pub struct ReleaseResolver {
    cache: HashMap<PathBuf, ReleaseInfo>,
}

impl ReleaseResolver {
    /// Creates a resolver with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the release of the installation at `root`.
    ///
    /// # Errors
    /// Returns `VersionNotFound` if the root is missing or neither version file
    /// can be read and parsed.
    pub fn resolve(root: &Path) -> Result<ReleaseInfo> {
        let version_info = root.join(VERSION_INFO_FILE);
        if version_info.is_file() {
            return Self::parse_version_info(root, &version_info);
        }
        if !root.exists() {
            return Err(Error::VersionNotFound {
                root: root.to_path_buf(),
                reason: "installation root does not exist".to_owned(),
            });
        }
        Self::parse_contents_file(root)
    }

    /// Like [`ReleaseResolver::resolve`], remembering the answer for `root`.
    ///
    /// # Errors
    /// Same as [`ReleaseResolver::resolve`]; failures are not cached.
    pub fn resolve_cached(&mut self, root: &Path) -> Result<ReleaseInfo> {
        if let Some(release) = self.cache.get(root) {
            return Ok(release.clone());
        }
        let release = Self::resolve(root)?;
        tracing::debug!("Resolved MATLAB {} at {}", release, root.display());
        self.cache.insert(root.to_path_buf(), release.clone());
        Ok(release)
    }

    /// Resolves a root that may still hold an unsubstituted variable.
    ///
    /// Templated roots yield `Ok(None)` so version-gated checks can be skipped.
    ///
    /// # Errors
    /// Same as [`ReleaseResolver::resolve`] for concrete roots.
    pub fn resolve_optional(&mut self, root: &str) -> Result<Option<ReleaseInfo>> {
        if has_placeholder(root) {
            tracing::debug!("Skipping release detection for templated root {root}");
            return Ok(None);
        }
        self.resolve_cached(Path::new(root)).map(Some)
    }

    fn parse_version_info(root: &Path, file: &Path) -> Result<ReleaseInfo> {
        let not_found = |reason: String| Error::VersionNotFound {
            root: root.to_path_buf(),
            reason,
        };
        let content = fs::read_to_string(file)
            .map_err(|err| not_found(format!("unable to read {VERSION_INFO_FILE}: {err}")))?;
        let version = VERSION_TAG
            .captures(&content)
            .and_then(|captures| captures.get(1))
            .map(|found| found.as_str())
            .ok_or_else(|| not_found(format!("{VERSION_INFO_FILE} has no version element")))?;
        ReleaseInfo::parse(version)
            .ok_or_else(|| not_found(format!("unrecognized version '{version}'")))
    }

    fn parse_contents_file(root: &Path) -> Result<ReleaseInfo> {
        let contents = root
            .join("toolbox")
            .join("matlab")
            .join("general")
            .join("Contents.m");
        let text = fs::read_to_string(&contents).map_err(|err| Error::VersionNotFound {
            root: root.to_path_buf(),
            reason: format!("unable to read {}: {err}", contents.display()),
        })?;
        let line = text.lines().nth(1).ok_or_else(|| Error::VersionNotFound {
            root: root.to_path_buf(),
            reason: format!("{} has no version line", contents.display()),
        })?;
        let release = LEGACY_VERSION
            .find(line)
            .and_then(|found| ReleaseInfo::parse(found.as_str()))
            .or_else(|| ReleaseInfo::parse(DEFAULT_LEGACY_VERSION));
        release.ok_or_else(|| Error::VersionNotFound {
            root: root.to_path_buf(),
            reason: "unrecognized legacy version".to_owned(),
        })
    }
}
