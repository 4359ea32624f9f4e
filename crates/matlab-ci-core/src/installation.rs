//! MATLAB installations and the per-build registry that names them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::environment::{Environment, has_placeholder};
use crate::{Error, Result};

/// Environment key carrying the matrix-axis MATLAB installation name.
pub const AXIS_KEY: &str = "MATLAB_VERSION";
/// Environment key set when a build wrapper already selected a MATLAB root.
pub const MATLAB_ROOT_KEY: &str = "matlabroot";

/// Process-launch convention of the node that runs MATLAB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsFamily {
    /// Linux and macOS
    Unix,
    /// Windows
    Windows,
}

impl OsFamily {
    /// OS family of the current process.
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }

    /// Filesystem separator used when building paths for this node.
    pub fn separator(self) -> char {
        match self {
            Self::Unix => '/',
            Self::Windows => '\\',
        }
    }

    /// Separator between entries of `PATH`.
    pub fn path_list_separator(self) -> char {
        match self {
            Self::Unix => ':',
            Self::Windows => ';',
        }
    }

    /// Joins path segments with this family's separator.
    pub fn join(self, base: &str, segments: &[&str]) -> String {
        let sep = self.separator();
        let mut joined = base.trim_end_matches(['/', '\\']).to_owned();
        for segment in segments {
            joined.push(sep);
            joined.push_str(segment);
        }
        joined
    }

    /// Path of the `matlab` executable below an installation root.
    pub fn matlab_binary(self, root: &str) -> String {
        self.join(root, &["bin", "matlab"])
    }

    /// File name the executable has on disk.
    pub fn executable_name(self, base: &str) -> String {
        match self {
            Self::Unix => base.to_owned(),
            Self::Windows => format!("{base}.exe"),
        }
    }
}

/// A MATLAB installation root on a build node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatlabInstallation {
    /// Name used by jobs and matrix axes to refer to this installation
    pub name: String,
    /// Installation root, possibly containing unresolved variables
    pub root: String,
    /// OS family of the node the root lives on
    #[serde(default = "OsFamily::current")]
    pub os: OsFamily,
}

impl MatlabInstallation {
    /// Creates an installation for the current OS family.
    pub fn new(name: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            os: OsFamily::current(),
        }
    }

    /// Overrides the OS family.
    #[must_use]
    pub fn with_os(mut self, os: OsFamily) -> Self {
        self.os = os;
        self
    }

    /// Copy of this installation with variables in the root expanded.
    #[must_use]
    pub fn for_environment(&self, env: &Environment) -> Self {
        Self {
            name: self.name.clone(),
            root: env.expand(&self.root),
            os: self.os,
        }
    }

    /// Whether the root still references a variable that was never substituted.
    pub fn is_templated(&self) -> bool {
        has_placeholder(&self.root)
    }

    /// Root as a local path.
    pub fn root_path(&self) -> &Path {
        Path::new(&self.root)
    }

    /// Path of the `matlab` executable.
    pub fn matlab_binary(&self) -> String {
        self.os.matlab_binary(&self.root)
    }

    /// Local path of the `matlab` executable as it exists on disk.
    pub fn matlab_executable(&self) -> PathBuf {
        self.root_path()
            .join("bin")
            .join(self.os.executable_name("matlab"))
    }

    /// Adds this installation's executables to the search path.
    ///
    /// The root's parent goes in as well since `matlab-batch` is installed next
    /// to the release folders.
    pub fn apply_to(&self, env: &mut Environment) {
        if let Some(parent) = self.root_path().parent()
            && !parent.as_os_str().is_empty()
        {
            env.prepend_path(&parent.to_string_lossy(), self.os);
        }
        env.prepend_path(&self.os.join(&self.root, &["bin"]), self.os);
    }
}

/// Named installations known to one build.
///
/// Drivers create a registry at build setup and pass it by reference; nothing
/// here is process-global.
#[derive(Debug, Clone, Default)]
pub struct InstallationRegistry {
    installations: BTreeMap<String, MatlabInstallation>,
}

impl InstallationRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an installation, replacing one with the same name.
    pub fn register(&mut self, installation: MatlabInstallation) {
        self.installations
            .insert(installation.name.clone(), installation);
    }

    /// Looks up an installation by name.
    pub fn get(&self, name: &str) -> Option<&MatlabInstallation> {
        self.installations.get(name)
    }

    /// Number of registered installations.
    pub fn len(&self) -> usize {
        self.installations.len()
    }

    /// Whether no installations are registered.
    pub fn is_empty(&self) -> bool {
        self.installations.is_empty()
    }

    /// Resolves the installation selected by a matrix axis and puts it on `PATH`.
    ///
    /// Returns `Ok(None)` when no axis value is set, or when a build wrapper has
    /// already selected MATLAB through `matlabroot`.
    ///
    /// # Errors
    /// Returns `MatlabNotFound` when the axis names an unknown installation or
    /// one whose root does not exist on this node.
    pub fn resolve_axis(&self, env: &mut Environment) -> Result<Option<MatlabInstallation>> {
        let Some(name) = env.get(AXIS_KEY).filter(|name| !name.is_empty()) else {
            return Ok(None);
        };
        if env.get(MATLAB_ROOT_KEY).is_some() {
            return Ok(None);
        }
        let name = name.to_owned();

        let installation = self
            .get(&name)
            .ok_or_else(|| Error::MatlabNotFound(format!("no installation named '{name}'")))?
            .for_environment(env);

        if installation.is_templated() || !installation.root_path().exists() {
            return Err(Error::MatlabNotFound(format!(
                "'{name}' cannot be found on this node at {root}",
                root = installation.root
            )));
        }

        installation.apply_to(env);
        tracing::info!(
            "MATLAB '{}' added to PATH from {}",
            installation.name,
            installation.root
        );
        Ok(Some(installation))
    }
}

impl FromIterator<MatlabInstallation> for InstallationRegistry {
    fn from_iter<I: IntoIterator<Item = MatlabInstallation>>(iter: I) -> Self {
        let mut registry = Self::new();
        for installation in iter {
            registry.register(installation);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_binary_path_per_os() {
        assert_eq!(
            OsFamily::Unix.matlab_binary("/opt/matlab/R2024a/"),
            "/opt/matlab/R2024a/bin/matlab"
        );
        assert_eq!(
            OsFamily::Windows.matlab_binary(r"C:\MATLAB\R2024a"),
            r"C:\MATLAB\R2024a\bin\matlab"
        );
    }

    #[test]
    fn test_for_environment_expands_root() {
        let env = Environment::new().with("VER", "R2023b");
        let installation = MatlabInstallation::new("axis", "/opt/matlab/${VER}");
        assert!(installation.is_templated());

        let expanded = installation.for_environment(&env);
        assert_eq!(expanded.root, "/opt/matlab/R2023b");
        assert!(!expanded.is_templated());
    }

    #[test]
    fn test_apply_to_prepends_bin_and_parent() {
        let installation =
            MatlabInstallation::new("R2024a", "/opt/matlab/R2024a").with_os(OsFamily::Unix);
        let mut env = Environment::new().with("PATH", "/usr/bin");
        installation.apply_to(&mut env);
        assert_eq!(
            env.get("PATH"),
            Some("/opt/matlab/R2024a/bin:/opt/matlab:/usr/bin")
        );
    }

    #[test]
    fn test_resolve_axis_without_axis_value() {
        let registry = InstallationRegistry::new();
        let mut env = Environment::new();
        let resolved = registry.resolve_axis(&mut env).expect("no axis is not an error");
        assert!(resolved.is_none());
    }

    #[test]
    fn test_resolve_axis_skips_when_matlabroot_set() {
        let registry: InstallationRegistry =
            [MatlabInstallation::new("R2024a", "/does/not/exist")].into_iter().collect();
        let mut env = Environment::new()
            .with(AXIS_KEY, "R2024a")
            .with(MATLAB_ROOT_KEY, "/opt/matlab");
        assert!(registry.resolve_axis(&mut env).expect("skipped").is_none());
    }

    #[test]
    fn test_resolve_axis_missing_home_is_not_found() {
        let registry: InstallationRegistry =
            [MatlabInstallation::new("R2024a", "/does/not/exist/R2024a")]
                .into_iter()
                .collect();
        let mut env = Environment::new().with(AXIS_KEY, "R2024a");
        let error = registry.resolve_axis(&mut env).expect_err("missing home");
        assert!(matches!(error, Error::MatlabNotFound(_)));
    }

    #[test]
    fn test_resolve_axis_unknown_name_is_not_found() {
        let registry = InstallationRegistry::new();
        let mut env = Environment::new().with(AXIS_KEY, "R2099z");
        let error = registry.resolve_axis(&mut env).expect_err("unknown name");
        assert!(matches!(error, Error::MatlabNotFound(_)));
    }

    #[test]
    fn test_resolve_axis_adds_to_path() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path().to_string_lossy().into_owned();
        let registry: InstallationRegistry = [MatlabInstallation::new("R2024a", root.clone())]
            .into_iter()
            .collect();
        let mut env = Environment::new().with(AXIS_KEY, "R2024a");

        let resolved = registry
            .resolve_axis(&mut env)
            .expect("existing home resolves")
            .expect("axis is set");
        assert_eq!(resolved.root, root);
        let path = env.get("PATH").expect("PATH was set");
        assert!(path.contains(&resolved.os.join(&root, &["bin"])));
    }
}
