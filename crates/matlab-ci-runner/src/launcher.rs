//! Selection and staging of the `run-matlab-command` launcher binary.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use matlab_ci_core::{Error, OsFamily, Result};
use tokio::process::Command;
use tracing::debug;

use crate::resources::ResourceBundle;
use crate::scratch::ScratchHandle;

const LAUNCHER_NAME: &str = "run-matlab-command";

/// Platform builds of the launcher shipped in the resource bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LauncherPlatform {
    /// Linux x86-64
    Glnxa64,
    /// macOS Intel
    Maci64,
    /// macOS Apple silicon
    Maca64,
    /// Windows x86-64
    Win64,
}

impl LauncherPlatform {
    /// Maps `uname -s -m` output to a Unix launcher build.
    pub fn from_uname(uname: &str) -> Self {
        if uname.contains("Linux") {
            Self::Glnxa64
        } else if uname.contains("arm64") {
            Self::Maca64
        } else {
            Self::Maci64
        }
    }

    /// Probes the node to pick the launcher build.
    ///
    /// # Errors
    /// Returns an I/O error if `uname` cannot be run on a Unix node.
    pub async fn detect(os: OsFamily) -> Result<Self> {
        if os == OsFamily::Windows {
            return Ok(Self::Win64);
        }
        let output = Command::new("uname").args(["-s", "-m"]).output().await?;
        if !output.status.success() {
            return Err(Error::Resource(format!(
                "uname exited with {}",
                output.status
            )));
        }
        let uname = String::from_utf8_lossy(&output.stdout);
        let platform = Self::from_uname(&uname);
        debug!("uname reported '{}', using {platform} launcher", uname.trim());
        Ok(platform)
    }

    /// Bundle directory holding this build.
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Glnxa64 => "glnxa64",
            Self::Maci64 => "maci64",
            Self::Maca64 => "maca64",
            Self::Win64 => "win64",
        }
    }

    /// File name of the launcher binary.
    pub const fn executable_name(self) -> &'static str {
        match self {
            Self::Win64 => "run-matlab-command.exe",
            Self::Glnxa64 | Self::Maci64 | Self::Maca64 => LAUNCHER_NAME,
        }
    }
}

impl fmt::Display for LauncherPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Copies the launcher for `platform` into the scratch directory and marks it executable.
///
/// # Errors
/// Returns `Resource` if the bundle lacks the binary, or an I/O error if it
/// cannot be copied or made executable.
pub fn stage_launcher(
    bundle: &ResourceBundle,
    scratch: &ScratchHandle,
    platform: LauncherPlatform,
) -> Result<PathBuf> {
    let target = scratch.copy_resource(&bundle.launcher(platform), platform.executable_name())?;
    make_executable(&target)?;
    debug!("Staged {platform} launcher at {}", target.display());
    Ok(target)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt as _;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(path: &Path) -> Result<()> {
    fs::metadata(path)?;
    Ok(())
}
