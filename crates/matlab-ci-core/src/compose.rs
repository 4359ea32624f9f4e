//! MATLAB statement and argument vector construction.
//!
//! Everything here is pure string assembly: the same inputs always produce the
//! same output and nothing touches the filesystem.

use crate::installation::OsFamily;
use crate::operation::{BuildOptions, Operation, TestOptions};
use crate::release::{Capability, ReleaseInfo, supports};

/// Environment variable that carries the caller's working folder into the staged script.
pub const ORIGINAL_FOLDER_VAR: &str = "MW_ORIG_WORKING_FOLDER";
/// Prefix of staged script file names.
pub const SCRIPT_PREFIX: &str = "script_";
/// File the generated test runner is written to inside the scratch directory.
pub const RUNNER_SCRIPT_FILE: &str = "runnerScript.m";

const REPORT_ERROR: &str = "catch e,disp(getReport(e,'extended')),exit(1),end";

/// Renders `text` as a MATLAB character vector literal.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Renders a cell array of character vectors, skipping empty entries.
pub fn cell_array(items: &[String]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .filter(|item| !item.is_empty())
        .map(|item| quote(item))
        .collect();
    format!("{{{}}}", quoted.join(","))
}

/// Renders the argument list passed to `genscript`.
///
/// Pairs always appear in the same order so that a given set of options always
/// renders identically.
pub fn test_arguments(options: &TestOptions) -> String {
    let mut args = vec![quote("Test")];
    let mut push_text = |name: &str, value: Option<&str>| {
        if let Some(value) = value {
            args.push(quote(name));
            args.push(quote(value));
        }
    };

    push_text("PDFTestReport", options.pdf_report.as_deref());
    push_text("TAPTestResults", options.tap_results.as_deref());
    push_text("JUnitTestResults", options.junit_results.as_deref());
    push_text(
        "CoberturaCodeCoverage",
        options.cobertura_code_coverage.as_deref(),
    );
    push_text(
        "SimulinkTestResults",
        options.simulink_test_results.as_deref(),
    );
    push_text(
        "CoberturaModelCoverage",
        options.cobertura_model_coverage.as_deref(),
    );
    push_text("SelectByTag", options.select_by_tag.as_deref());

    for (name, enabled) in [("UseParallel", options.use_parallel), ("Strict", options.strict)] {
        if enabled {
            args.push(quote(name));
            args.push("true".to_owned());
        }
    }

    let mut push_level = |name: &str, value: Option<&str>| {
        if let Some(value) = value.filter(|level| !level.eq_ignore_ascii_case("default")) {
            args.push(quote(name));
            args.push(quote(value));
        }
    };
    push_level("LoggingLevel", options.logging_level.as_deref());
    push_level("OutputDetail", options.output_detail.as_deref());

    for (name, folders) in [
        ("SourceFolder", &options.source_folders),
        ("SelectByFolder", &options.select_by_folders),
    ] {
        if !folders.is_empty() {
            args.push(quote(name));
            args.push(cell_array(folders));
        }
    }

    args.join(",")
}

/// MATLAB code that carries out `operation` with `scratch_dir` as the staging folder.
pub fn statement(operation: &Operation, scratch_dir: &str) -> String {
    let add_scratch = format!("addpath({});", quote(scratch_dir));
    match operation {
        Operation::RunCommand(options) => format!("{add_scratch}{}", options.command),
        Operation::RunTests(options) => test_statement(options, &add_scratch, scratch_dir),
        Operation::RunBuildTask(options) => build_statement(options, &add_scratch),
    }
}

fn test_statement(options: &TestOptions, add_scratch: &str, scratch_dir: &str) -> String {
    let runner = format!("fullfile({},{})", quote(scratch_dir), quote(RUNNER_SCRIPT_FILE));
    [
        add_scratch.to_owned(),
        format!("testScript = genscript({});", test_arguments(options)),
        "disp('Running MATLAB script with content:');".to_owned(),
        "disp(testScript.Contents);".to_owned(),
        format!("testScript.writeToFile({runner});"),
        r"fprintf('___________________________________\n\n');".to_owned(),
        format!("run({runner});"),
    ]
    .join("\n")
}

fn build_statement(options: &BuildOptions, add_scratch: &str) -> String {
    let mut text = format!("{add_scratch} buildtool");
    for part in [&options.tasks, &options.build_options] {
        let part = part.trim();
        if !part.is_empty() {
            text.push(' ');
            text.push_str(part);
        }
    }
    text
}

/// Base name of the script staged for the scratch token.
pub fn script_name(token: &str) -> String {
    format!("{SCRIPT_PREFIX}{token}")
}

/// Contents of the staged script: restore the caller's folder, then run `body`.
pub fn script_content(body: &str) -> String {
    format!("cd(getenv('{ORIGINAL_FOLDER_VAR}'));\n{body}")
}

/// Statement that switches into the scratch folder and runs the staged script.
///
/// The original working folder is stashed in an environment variable that the
/// script's first line reads back.
pub fn entry_statement(scratch_dir: &str, script_name: &str) -> String {
    format!(
        "setenv('{ORIGINAL_FOLDER_VAR}', cd({}));{script_name}",
        quote(scratch_dir)
    )
}

/// Wraps `statement` so any error prints a report and exits with code 1.
pub fn guard(statement: &str) -> String {
    format!("try,{statement},{REPORT_ERROR}")
}

/// Guard used with `-r`, which would otherwise leave MATLAB running.
pub fn guard_and_exit(statement: &str) -> String {
    format!("{},exit", guard(statement))
}

/// Guarded `eval` of free-form user text for `-r` launches.
pub fn guard_eval(command: &str) -> String {
    guard_and_exit(&format!("eval({})", quote(command)))
}

/// Splits a startup option string into arguments.
pub fn startup_arguments(options: &str) -> Vec<String> {
    options.split_whitespace().map(str::to_owned).collect()
}

/// How the MATLAB process is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Regime {
    /// Through the bundled `run-matlab-command` launcher at the given path
    Launcher(String),
    /// `matlab -batch`
    Batch,
    /// `matlab -r` with display suppression switches
    Legacy {
        /// Whether `-noAppIcon` is understood
        no_app_icon: bool,
    },
}

impl Regime {
    /// Direct-launch regime matching what `release` supports.
    pub fn for_release(release: &ReleaseInfo) -> Self {
        if supports(release, Capability::BatchMode) {
            Self::Batch
        } else {
            Self::Legacy {
                no_app_icon: supports(release, Capability::NoAppIcon),
            }
        }
    }
}

/// Everything needed to build one argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Launch regime
    pub regime: Regime,
    /// OS family of the node
    pub os: OsFamily,
    /// MATLAB installation root
    pub matlab_root: String,
    /// Statement that runs the staged script
    pub entry: String,
    /// Raw user text when the operation is a free-form command
    pub command: Option<String>,
    /// Startup option string
    pub startup_options: String,
}

/// Builds the process argument vector for `plan`.
pub fn compose(plan: &LaunchPlan) -> Vec<String> {
    let binary = || plan.os.matlab_binary(&plan.matlab_root);
    let mut argv = match &plan.regime {
        Regime::Launcher(launcher) => vec![launcher.clone(), plan.entry.clone()],
        Regime::Batch => {
            let statement = plan
                .command
                .clone()
                .unwrap_or_else(|| guard(&plan.entry));
            vec![binary(), "-batch".to_owned(), statement]
        }
        Regime::Legacy { no_app_icon } => {
            let windows = plan.os == OsFamily::Windows;
            let statement = plan
                .command
                .as_deref()
                .map_or_else(|| guard_and_exit(&plan.entry), guard_eval);
            let mut args = vec![binary(), "-nosplash".to_owned(), "-nodesktop".to_owned()];
            if *no_app_icon {
                args.push("-noAppIcon".to_owned());
            }
            if windows {
                args.push("-noDisplayDesktop".to_owned());
            }
            args.push("-r".to_owned());
            args.push(statement);
            if windows {
                args.push("-wait".to_owned());
            }
            args.push("-log".to_owned());
            args
        }
    };
    argv.extend(startup_arguments(&plan.startup_options));
    argv
}
