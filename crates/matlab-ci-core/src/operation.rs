//! What a single MATLAB invocation should do.

use std::path::PathBuf;

use crate::release::Capability;

/// Parameters of a free-form MATLAB command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// MATLAB statement(s) entered by the user
    pub command: String,
}

/// Test selection and artifact options for a test run.
///
/// Artifact paths are relative to the working directory unless absolute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOptions {
    /// PDF test report path
    pub pdf_report: Option<String>,
    /// TAP results path
    pub tap_results: Option<String>,
    /// JUnit-style XML results path
    pub junit_results: Option<String>,
    /// Cobertura code coverage report path
    pub cobertura_code_coverage: Option<String>,
    /// Simulink Test Manager results path
    pub simulink_test_results: Option<String>,
    /// Cobertura model coverage report path
    pub cobertura_model_coverage: Option<String>,
    /// Only run tests carrying this tag
    pub select_by_tag: Option<String>,
    /// Run tests in parallel
    pub use_parallel: bool,
    /// Treat warnings as failures
    pub strict: bool,
    /// Diagnostic logging level
    pub logging_level: Option<String>,
    /// Display verbosity of test output
    pub output_detail: Option<String>,
    /// Folders added to the path and measured for coverage
    pub source_folders: Vec<String>,
    /// Only run tests below these folders
    pub select_by_folders: Vec<String>,
}

impl TestOptions {
    /// Requested artifacts whose generation depends on the MATLAB release.
    pub fn gated_artifacts(&self) -> Vec<(Capability, &str)> {
        [
            (
                Capability::CoberturaCodeCoverage,
                self.cobertura_code_coverage.as_deref(),
            ),
            (
                Capability::ModelCoverage,
                self.cobertura_model_coverage.as_deref(),
            ),
            (
                Capability::SimulinkTestResults,
                self.simulink_test_results.as_deref(),
            ),
        ]
        .into_iter()
        .filter_map(|(capability, path)| path.map(|found| (capability, found)))
        .collect()
    }
}

/// Parameters of a `buildtool` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Space-separated task names, empty for the default tasks
    pub tasks: String,
    /// Extra `buildtool` options such as `-continueOnFailure`
    pub build_options: String,
}

/// The closed set of operations the engine knows how to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Run arbitrary MATLAB text
    RunCommand(CommandOptions),
    /// Run MATLAB and Simulink tests through a generated runner script
    RunTests(TestOptions),
    /// Run `buildtool` tasks
    RunBuildTask(BuildOptions),
}

impl Operation {
    /// Short name used in logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RunCommand(_) => "run-command",
            Self::RunTests(_) => "run-tests",
            Self::RunBuildTask(_) => "run-build",
        }
    }

    /// Whether the MATLAB statement is generated rather than typed by the user.
    pub const fn is_automatic(&self) -> bool {
        !matches!(self, Self::RunCommand(_))
    }

    /// Whether the build reporting plugins are staged for this operation.
    pub const fn uses_build_plugins(&self) -> bool {
        !matches!(self, Self::RunTests(_))
    }
}

/// One build step's request to run MATLAB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSpec {
    /// What to run
    pub operation: Operation,
    /// Extra MATLAB startup options, whitespace separated
    pub startup_options: String,
    /// Directory MATLAB starts in and the scratch root lives under
    pub working_dir: PathBuf,
}

impl InvocationSpec {
    /// Creates a spec with no startup options.
    pub fn new(operation: Operation, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            operation,
            startup_options: String::new(),
            working_dir: working_dir.into(),
        }
    }

    /// Sets the startup options.
    #[must_use]
    pub fn with_startup_options(mut self, options: impl Into<String>) -> Self {
        self.startup_options = options.into();
        self
    }
}
