//! Per-invocation scratch directories under the workspace.
//!
//! Every invocation gets `<workspace>/.matlab/<token>/`. The shared root is
//! never removed, so concurrent invocations on one workspace only ever touch
//! their own token directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use matlab_ci_core::compose::{script_content, script_name};
use matlab_ci_core::config::DEFAULT_SCRATCH_DIR;
use matlab_ci_core::{Error, Result};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// UUID bytes used for a token. Bytes 6 and 8 carry the version and variant bits.
const TOKEN_BYTES: [usize; 8] = [0, 1, 2, 3, 4, 5, 7, 9];

/// Largest multiple of the alphabet size that fits in a byte.
const UNBIASED_LIMIT: u8 = 248;

/// Returns a fresh 8-character alphanumeric token.
pub fn generate_token() -> String {
    let mut token = String::with_capacity(TOKEN_BYTES.len());
    while token.len() < TOKEN_BYTES.len() {
        let uuid = Uuid::new_v4();
        let bytes = uuid.as_bytes();
        let missing = TOKEN_BYTES.len() - token.len();
        token.extend(
            TOKEN_BYTES
                .iter()
                .map(|index| bytes[*index])
                .filter(|byte| *byte < UNBIASED_LIMIT)
                .take(missing)
                .map(|byte| char::from(ALPHANUMERIC[usize::from(byte) % ALPHANUMERIC.len()])),
        );
    }
    token
}

/// The shared hidden scratch root of one workspace.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
}

impl ScratchSpace {
    /// Scratch space at `<workspace>/.matlab`.
    pub fn new(workspace: &Path) -> Self {
        Self::with_dir_name(workspace, DEFAULT_SCRATCH_DIR)
    }

    /// Scratch space at `<workspace>/<dir_name>`.
    pub fn with_dir_name(workspace: &Path, dir_name: &str) -> Self {
        Self {
            root: workspace.join(dir_name),
        }
    }

    /// The shared root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a new token directory.
    ///
    /// The workspace and shared root are created when missing.
    ///
    /// # Errors
    /// Returns an I/O error if the directories cannot be created, including
    /// when the token directory unexpectedly already exists.
    pub fn allocate(&self) -> Result<ScratchHandle> {
        fs::create_dir_all(&self.root)?;
        let token = generate_token();
        let path = self.root.join(&token);
        fs::create_dir(&path)?;
        debug!("Allocated scratch directory {}", path.display());
        Ok(ScratchHandle {
            token,
            path,
            released: false,
        })
    }
}

/// Exclusive ownership of one token directory.
///
/// The directory is removed by [`ScratchHandle::release`] or, failing that,
/// when the handle is dropped.
#[derive(Debug)]
pub struct ScratchHandle {
    token: String,
    path: PathBuf,
    released: bool,
}

impl ScratchHandle {
    /// The random token naming this directory.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Absolute path of the token directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path as a string for embedding in MATLAB statements.
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Writes a UTF-8 text file below the token directory.
    ///
    /// # Errors
    /// Returns an I/O error if the file or its parents cannot be written.
    pub fn materialize(&self, name: &str, content: &str) -> Result<PathBuf> {
        let target = self.path.join(name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content)?;
        Ok(target)
    }

    /// Writes the staged MATLAB script and returns its base name.
    ///
    /// # Errors
    /// Returns an I/O error if the script cannot be written.
    pub fn write_script(&self, body: &str) -> Result<String> {
        let name = script_name(&self.token);
        self.materialize(&format!("{name}.m"), &script_content(body))?;
        Ok(name)
    }

    /// Copies a single file into the token directory.
    ///
    /// # Errors
    /// Returns `Resource` if `source` is missing and an I/O error if the copy fails.
    pub fn copy_resource(&self, source: &Path, dest: &str) -> Result<PathBuf> {
        if !source.is_file() {
            return Err(Error::Resource(format!(
                "{} does not exist",
                source.display()
            )));
        }
        let target = self.path.join(dest);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, &target)?;
        Ok(target)
    }

    /// Copies the contents of `source` into `dest` below the token directory.
    ///
    /// An empty `dest` copies straight into the token directory.
    ///
    /// # Errors
    /// Returns `Resource` if `source` is not a directory and an I/O error if a
    /// file cannot be copied.
    pub fn copy_tree(&self, source: &Path, dest: &str) -> Result<usize> {
        if !source.is_dir() {
            return Err(Error::Resource(format!(
                "{} is not a directory",
                source.display()
            )));
        }
        let target_root = self.path.join(dest);
        let mut copied = 0;
        for entry in WalkDir::new(source).min_depth(1) {
            let entry = entry.map_err(|error| Error::Resource(error.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|error| Error::Resource(error.to_string()))?;
            let target = target_root.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &target)?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    /// Removes the token directory.
    ///
    /// A directory that is already gone counts as released.
    ///
    /// # Errors
    /// Returns an I/O error if the directory exists but cannot be removed.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_token_dir(&self.path)?;
        debug!("Released scratch directory {}", self.path.display());
        Ok(())
    }
}

impl Drop for ScratchHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(error) = remove_token_dir(&self.path) {
            warn!(
                "Failed to remove scratch directory {}: {error}",
                self.path.display()
            );
        }
    }
}

fn remove_token_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Err(error) if error.kind() != ErrorKind::NotFound => Err(error.into()),
        _ => Ok(()),
    }
}
