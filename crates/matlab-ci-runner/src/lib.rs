//! Process side of running MATLAB from CI jobs.
//!
//! This crate provides the effectful half of an invocation:
//! - `ScratchSpace` for per-invocation staging directories
//! - `ResourceBundle` and launcher selection for the bundled helpers
//! - The process orchestrator that streams output into an `OutputSink`
//! - `Invocation`, the pipeline drivers call for one build step
//! - `BuildSummary` for the task results the build plugins leave behind
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

/// Build result file summaries.
pub mod artifact;
/// End-to-end invocation pipeline.
pub mod invocation;
/// Launcher binary selection and staging.
pub mod launcher;
/// Process launching and output streaming.
pub mod orchestrator;
/// Bundled resource lookup.
pub mod resources;
/// Scratch directory management.
pub mod scratch;
/// Output line sinks.
pub mod sink;

pub use artifact::{BuildSummary, TaskResult};
pub use invocation::{Invocation, InvocationOutcome, InvocationStage};
pub use launcher::LauncherPlatform;
pub use orchestrator::ProcessResult;
pub use resources::ResourceBundle;
pub use scratch::{ScratchHandle, ScratchSpace};
pub use sink::{ChannelSink, MemorySink, OutputSink, WriterSink};
