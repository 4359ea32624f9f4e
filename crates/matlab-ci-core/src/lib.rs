//! Core types for running MATLAB from CI jobs.
//!
//! This crate holds the pure parts of an invocation: release detection,
//! installation lookup, environment expansion and the statements and argument
//! vectors handed to MATLAB. Process launching lives in `matlab-ci-runner`.
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        reason = "Allow for tests"
    )
)]

/// Statement and argument vector construction.
pub mod compose;
/// Runner configuration.
pub mod config;
/// Environment maps and variable expansion.
pub mod environment;
/// Error types and result definitions.
pub mod error;
/// MATLAB installations and the installation registry.
pub mod installation;
/// Operation kinds and their parameters.
pub mod operation;
/// Release detection and capability checks.
pub mod release;

pub use compose::{LaunchPlan, Regime};
pub use config::{LaunchMode, RunnerConfig};
pub use environment::Environment;
pub use error::{Error, Result};
pub use installation::{InstallationRegistry, MatlabInstallation, OsFamily};
pub use operation::{BuildOptions, CommandOptions, InvocationSpec, Operation, TestOptions};
pub use release::{Capability, ReleaseInfo, ReleaseResolver};
