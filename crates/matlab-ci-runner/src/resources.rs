//! Bundled files staged into scratch directories.
//!
//! A bundle is a directory laid out as:
//!
//! ```text
//! glnxa64/run-matlab-command
//! maci64/run-matlab-command
//! maca64/run-matlab-command
//! win64/run-matlab-command.exe
//! genscript/...        test runner generator package
//! plugins/...          buildtool reporting plugins
//! ```

use std::env;
use std::path::{Path, PathBuf};

use matlab_ci_core::{Error, Result};

use crate::launcher::LauncherPlatform;
use crate::scratch::ScratchHandle;

/// Environment variable that points at a resource bundle.
pub const RESOURCES_ENV: &str = "MATLAB_CI_RESOURCES";

const GENSCRIPT_DIR: &str = "genscript";
const PLUGINS_DIR: &str = "plugins";

/// Location of the bundled launchers and MATLAB packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBundle {
    root: PathBuf,
}

impl ResourceBundle {
    /// Bundle rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Finds the bundle from configuration, the environment, or next to the executable.
    ///
    /// # Errors
    /// Returns `Resource` if no candidate directory exists.
    pub fn locate(configured: Option<&Path>) -> Result<Self> {
        let mut candidates = Vec::new();
        if let Some(path) = configured {
            candidates.push(path.to_path_buf());
        }
        if let Some(path) = env::var_os(RESOURCES_ENV) {
            candidates.push(PathBuf::from(path));
        }
        if let Some(exe_dir) = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(exe_dir.join("resources"));
        }

        candidates
            .into_iter()
            .find(|candidate| candidate.is_dir())
            .map(Self::new)
            .ok_or_else(|| {
                Error::Resource(format!(
                    "no resource bundle found; set resources_dir or {RESOURCES_ENV}"
                ))
            })
    }

    /// Root directory of the bundle.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the launcher binary for `platform`.
    pub fn launcher(&self, platform: LauncherPlatform) -> PathBuf {
        self.root
            .join(platform.dir_name())
            .join(platform.executable_name())
    }

    /// Copies the test runner generator into the scratch directory.
    ///
    /// # Errors
    /// Returns `Resource` if the package is missing, or an I/O error if copying fails.
    pub fn stage_genscript(&self, scratch: &ScratchHandle) -> Result<usize> {
        scratch.copy_tree(&self.root.join(GENSCRIPT_DIR), "")
    }

    /// Copies the build reporting plugins into the scratch directory.
    ///
    /// # Errors
    /// Returns `Resource` if the plugins are missing, or an I/O error if copying fails.
    pub fn stage_plugins(&self, scratch: &ScratchHandle) -> Result<usize> {
        scratch.copy_tree(&self.root.join(PLUGINS_DIR), "")
    }
}
