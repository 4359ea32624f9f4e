use core::result::Result as CoreResult;
use std::io::Error as IoError;
use std::path::PathBuf;

use thiserror::Error;
use toml::de::Error as TomlError;

use crate::release::{Capability, ReleaseInfo};

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur while preparing or running a MATLAB invocation.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The MATLAB release of an installation could not be determined.
    #[error("Unable to find MATLAB version information under {}: {reason}", root.display())]
    VersionNotFound {
        /// Installation root that was inspected
        root: PathBuf,
        /// Why the version could not be read
        reason: String,
    },

    /// The MATLAB executable or installation is missing on this node.
    #[error("MATLAB not found: {0}")]
    MatlabNotFound(String),

    /// The MATLAB process finished with a non-zero exit code.
    #[error("Received a nonzero exit code {exit_code} while trying to run MATLAB.")]
    Execution {
        /// Exit code reported by the process
        exit_code: i32,
    },

    /// The installed release is too old for the requested operation.
    #[error("MATLAB {release} does not support {capability}")]
    Unsupported {
        /// Capability that was required
        capability: Capability,
        /// Release that was found
        release: ReleaseInfo,
    },

    /// A bundled resource is missing or unreadable.
    #[error("Resource error: {0}")]
    Resource(String),

    /// A build result file left by the plugins could not be read.
    #[error("Build artifact error: {0}")]
    Artifact(String),

    /// The invocation was cancelled before MATLAB exited.
    #[error("MATLAB invocation was cancelled")]
    Cancelled,
}

impl Error {
    /// Exit code carried by an execution failure, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Execution { exit_code } => Some(*exit_code),
            _ => None,
        }
    }
}
