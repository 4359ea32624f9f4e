//! Runner configuration loaded from `~/.matlab-ci/config.toml`.
//!
//! The file names the MATLAB installations a node offers, where bundled
//! resources live and how MATLAB is started. Every key is optional.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::installation::{InstallationRegistry, MatlabInstallation};
use crate::{Error, Result};

/// Default name of the hidden scratch root under a workspace.
pub const DEFAULT_SCRATCH_DIR: &str = ".matlab";
/// Default build plugin lookup function exported to `buildtool`.
pub const DEFAULT_PLUGINS_FUNCTION: &str = "ciplugins.jenkins.getDefaultPlugins";

const CONFIG_DIR_NAME: &str = ".matlab-ci";
const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_HEADER: &str = "\
# matlab-ci runner settings
#
# Add one [[installations]] table per MATLAB on this node, for example:
#   [[installations]]
#   name = \"R2024a\"
#   root = \"/usr/local/MATLAB/R2024a\"
# A job picks one with --installation or the MATLAB_VERSION matrix axis.

";

/// How MATLAB is started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Run a staged script through the bundled `run-matlab-command` helper
    #[default]
    Launcher,
    /// Call `bin/matlab` with `-batch` or `-r` depending on the release
    Direct,
}

/// Settings shared by every invocation a driver starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Hidden scratch directory created under the workspace
    pub scratch_dir_name: String,
    /// Directory holding launcher binaries, `genscript` and build plugins
    pub resources_dir: Option<PathBuf>,
    /// How MATLAB is started
    pub launch_mode: LaunchMode,
    /// Where build result files are moved after a run
    pub artifact_dir: Option<PathBuf>,
    /// Function `buildtool` calls to discover its default plugins
    pub plugins_function: String,
    /// Known MATLAB installations
    pub installations: Vec<MatlabInstallation>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            scratch_dir_name: DEFAULT_SCRATCH_DIR.to_owned(),
            resources_dir: None,
            launch_mode: LaunchMode::default(),
            artifact_dir: None,
            plugins_function: DEFAULT_PLUGINS_FUNCTION.to_owned(),
            installations: Vec::new(),
        }
    }
}

impl RunnerConfig {
    /// Per-user settings directory, `~/.matlab-ci`.
    ///
    /// # Errors
    /// Returns a config error when the agent user has no home directory.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR_NAME))
            .ok_or_else(|| {
                Error::Config("no home directory for the CI agent user; pass --config".to_owned())
            })
    }

    /// Runner settings file, `~/.matlab-ci/config.toml`.
    ///
    /// # Errors
    /// Same as [`RunnerConfig::config_dir`].
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Settings from the per-user file. A node without one gets a commented
    /// default file so installations can be added in place.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or created.
    pub fn load_or_create() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            return Self::load_from_file(&path);
        }
        let config = Self::default();
        config.save_to_file(&path)?;
        tracing::info!("Wrote default runner settings to {}", path.display());
        Ok(config)
    }

    /// Settings from `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid TOML, or names
    /// an unusable scratch directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|error| {
            Error::Config(format!("cannot read runner settings {}: {error}", path.display()))
        })?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        tracing::debug!(
            "{} installation(s), {:?} launch mode from {}",
            config.installations.len(),
            config.launch_mode,
            path.display()
        );
        Ok(config)
    }

    /// Writes these settings to `path` under an explanatory header.
    ///
    /// # Errors
    /// Returns an error if the parent directory or the file cannot be written.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let write_error = |error: io::Error| {
            Error::Config(format!("cannot write runner settings {}: {error}", path.display()))
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        let body = toml::to_string_pretty(self)
            .map_err(|error| Error::Config(format!("cannot encode runner settings: {error}")))?;
        fs::write(path, format!("{CONFIG_HEADER}{body}")).map_err(write_error)
    }

    /// Registry holding the configured installations.
    pub fn registry(&self) -> InstallationRegistry {
        self.installations.iter().cloned().collect()
    }

    fn validate(&self) -> Result<()> {
        let name = self.scratch_dir_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(Error::Config(format!(
                "scratch_dir_name must be a single directory name, got '{}'",
                self.scratch_dir_name
            )));
        }
        Ok(())
    }
}
