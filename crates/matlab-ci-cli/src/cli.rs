//! Command-line arguments for `matlab-ci`

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use matlab_ci_core::{BuildOptions, CommandOptions, Operation, TestOptions};

/// Command-line arguments for the `matlab-ci` driver
#[derive(Debug, Parser)]
#[command(name = "matlab-ci", version)]
#[command(about = "Run MATLAB commands, tests and builds from CI jobs", long_about = None)]
pub struct Cli {
    /// Configuration file, `~/.matlab-ci/config.toml` when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// MATLAB installation root
    #[arg(long, global = true, conflicts_with = "installation")]
    pub matlab_root: Option<String>,

    /// Configured installation to use instead of an explicit root
    #[arg(long, global = true)]
    pub installation: Option<String>,

    /// Workspace directory MATLAB runs in
    #[arg(short, long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Extra MATLAB startup options, for example "-nojvm -nodisplay"
    #[arg(long, global = true, default_value = "", allow_hyphen_values = true)]
    pub startup_options: String,

    /// Start MATLAB directly instead of through the bundled launcher
    #[arg(long, global = true)]
    pub direct: bool,

    /// Operation to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Operations the driver can run
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run MATLAB statements
    RunCommand {
        /// MATLAB statement(s); environment variables are expanded
        command: String,
    },

    /// Run MATLAB and Simulink tests
    RunTests(TestArgs),

    /// Run buildtool tasks
    RunBuild {
        /// Tasks to run, the default tasks when none are given
        tasks: Vec<String>,

        /// Extra buildtool options such as -continueOnFailure
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        build_options: String,
    },

    /// Show the MATLAB release and what it supports
    Version {
        /// Print the release as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Operation to run, `None` for commands that do not launch MATLAB.
    pub fn into_operation(self) -> Option<Operation> {
        match self {
            Self::RunCommand { command } => {
                Some(Operation::RunCommand(CommandOptions { command }))
            }
            Self::RunTests(args) => Some(Operation::RunTests(args.into_options())),
            Self::RunBuild {
                tasks,
                build_options,
            } => Some(Operation::RunBuildTask(BuildOptions {
                tasks: tasks.join(" "),
                build_options,
            })),
            Self::Version { .. } => None,
        }
    }
}

/// Test selection and report options
#[derive(Debug, Args)]
pub struct TestArgs {
    /// Folder with source code, repeatable
    #[arg(long = "source-folder")]
    pub source_folders: Vec<String>,

    /// Only run tests below this folder, repeatable
    #[arg(long = "select-by-folder")]
    pub select_by_folders: Vec<String>,

    /// Only run tests with this tag
    #[arg(long)]
    pub select_by_tag: Option<String>,

    /// Write JUnit-style XML results to this path
    #[arg(long)]
    pub junit: Option<String>,

    /// Write TAP results to this path
    #[arg(long)]
    pub tap: Option<String>,

    /// Write a PDF test report to this path
    #[arg(long)]
    pub pdf: Option<String>,

    /// Write Cobertura code coverage to this path
    #[arg(long)]
    pub cobertura: Option<String>,

    /// Write Cobertura model coverage to this path
    #[arg(long)]
    pub model_coverage: Option<String>,

    /// Export Simulink Test Manager results to this path
    #[arg(long)]
    pub simulink_results: Option<String>,

    /// Fail tests that issue warnings
    #[arg(long)]
    pub strict: bool,

    /// Run tests in parallel
    #[arg(long)]
    pub use_parallel: bool,

    /// Diagnostic logging level
    #[arg(long)]
    pub logging_level: Option<String>,

    /// Display verbosity of test output
    #[arg(long)]
    pub output_detail: Option<String>,
}

impl TestArgs {
    fn into_options(self) -> TestOptions {
        TestOptions {
            pdf_report: self.pdf,
            tap_results: self.tap,
            junit_results: self.junit,
            cobertura_code_coverage: self.cobertura,
            simulink_test_results: self.simulink_results,
            cobertura_model_coverage: self.model_coverage,
            select_by_tag: self.select_by_tag,
            use_parallel: self.use_parallel,
            strict: self.strict,
            logging_level: self.logging_level,
            output_detail: self.output_detail,
            source_folders: self.source_folders,
            select_by_folders: self.select_by_folders,
        }
    }
}
