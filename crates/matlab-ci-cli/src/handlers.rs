//! Command handlers for CLI operations

use std::future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use matlab_ci_core::installation::MATLAB_ROOT_KEY;
use matlab_ci_core::release::supports;
use matlab_ci_core::{
    Capability, Environment, Error, InvocationSpec, LaunchMode, MatlabInstallation, Operation,
    ReleaseResolver, RunnerConfig,
};
use matlab_ci_runner::{BuildSummary, Invocation, OutputSink, ResourceBundle, WriterSink};
use serde_json::json;
use tokio::signal;
use tracing::warn;
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use crate::cli::{Cli, Commands};

/// Exit status after Ctrl-C, as shells report it.
const CANCELLED_EXIT_CODE: u8 = 130;

/// Install the stderr log subscriber.
///
/// Stdout carries MATLAB's own output, so logs never go there.
pub fn init_tracing() {
    Registry::default()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matlab_ci_core=info,matlab_ci_runner=info".into()),
        )
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(false)
                .with_target(false),
        )
        .init();
}

/// Run the parsed command line.
///
/// # Errors
/// Returns an error if the configuration, installation or resource bundle
/// cannot be set up. Failures of MATLAB itself are reported on stdout and
/// mapped to the exit status instead.
pub async fn handle(cli: Cli) -> Result<ExitCode> {
    let mut config = load_config(cli.config.as_deref())?;
    if cli.direct {
        config.launch_mode = LaunchMode::Direct;
    }

    let mut env = Environment::from_process();
    let installation = select_installation(
        cli.matlab_root.as_deref(),
        cli.installation.as_deref(),
        &config,
        &mut env,
    )?;

    let as_json = matches!(cli.command, Commands::Version { json: true });
    match cli.command.into_operation() {
        Some(operation) => {
            let workspace = workspace_dir(&cli.workspace)?;
            let spec =
                InvocationSpec::new(operation, workspace).with_startup_options(cli.startup_options);
            run_operation(&config, &spec, &installation, &env).await
        }
        None => show_version(&installation, &env, as_json),
    }
}

/// Load the configuration from `path`, or from the default location.
///
/// An explicit file must load; the default one falls back to built-in settings.
fn load_config(path: Option<&Path>) -> Result<RunnerConfig> {
    if let Some(path) = path {
        return RunnerConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }
    Ok(RunnerConfig::load_or_create().unwrap_or_else(|error| {
        warn!("Failed to load config from ~/.matlab-ci/config.toml: {error}");
        warn!("Using default configuration");
        RunnerConfig::default()
    }))
}

/// Pick the installation from the arguments, the matrix axis, or `matlabroot`.
fn select_installation(
    matlab_root: Option<&str>,
    name: Option<&str>,
    config: &RunnerConfig,
    env: &mut Environment,
) -> Result<MatlabInstallation> {
    if let Some(root) = matlab_root {
        return Ok(MatlabInstallation::new("matlab", root));
    }
    let registry = config.registry();
    if let Some(name) = name {
        return registry
            .get(name)
            .cloned()
            .with_context(|| format!("No installation named '{name}' in the configuration"));
    }
    if let Some(installation) = registry.resolve_axis(env)? {
        return Ok(installation);
    }
    env.get(MATLAB_ROOT_KEY)
        .map(|root| MatlabInstallation::new(MATLAB_ROOT_KEY, root))
        .context("No MATLAB selected; pass --matlab-root or --installation, or set MATLAB_VERSION")
}

fn workspace_dir(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Workspace {} does not exist", path.display()))
}

async fn run_operation(
    config: &RunnerConfig,
    spec: &InvocationSpec,
    installation: &MatlabInstallation,
    env: &Environment,
) -> Result<ExitCode> {
    let resources = ResourceBundle::locate(config.resources_dir.as_deref())?;
    let sink = WriterSink::new(io::stdout());
    let mut invocation = Invocation::new(config, resources);

    match invocation
        .run(spec, installation, env, &sink, ctrl_c())
        .await
    {
        Ok(outcome) => {
            if let Some(artifact) = &outcome.artifact
                && !matches!(spec.operation, Operation::RunTests(_))
            {
                report_build_results(artifact, &sink);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::Execution { exit_code }) => Ok(exit_status(exit_code)),
        Err(Error::Cancelled) => Ok(ExitCode::from(CANCELLED_EXIT_CODE)),
        // Already written to the sink by the invocation.
        Err(_) => Ok(ExitCode::FAILURE),
    }
}

fn report_build_results(artifact: &Path, sink: &dyn OutputSink) {
    match BuildSummary::load(artifact) {
        Ok(summary) => sink.line(&format!("MATLAB build results: {summary}")),
        Err(error) => warn!("Unable to summarize build results: {error}"),
    }
}

/// Resolves when the user presses Ctrl-C, or never if the signal cannot be watched.
async fn ctrl_c() {
    if let Err(error) = signal::ctrl_c().await {
        warn!("Unable to listen for Ctrl-C: {error}");
        future::pending::<()>().await;
    }
}

/// MATLAB's exit code when it fits a process status, otherwise a plain failure.
fn exit_status(exit_code: i32) -> ExitCode {
    u8::try_from(exit_code)
        .ok()
        .filter(|code| *code != 0)
        .map_or(ExitCode::FAILURE, ExitCode::from)
}

#[allow(clippy::print_stdout, reason = "Version report is the command's output")]
fn show_version(
    installation: &MatlabInstallation,
    env: &Environment,
    as_json: bool,
) -> Result<ExitCode> {
    let installation = installation.for_environment(env);
    let release = ReleaseResolver::resolve(installation.root_path())?;

    if as_json {
        let capabilities: Vec<String> = Capability::ALL
            .into_iter()
            .filter(|capability| supports(&release, *capability))
            .map(|capability| format!("{capability:?}"))
            .collect();
        let report = json!({
            "root": installation.root,
            "version": release.version,
            "major": release.major,
            "minor": release.minor,
            "capabilities": capabilities,
        });
        println!("{report:#}");
        return Ok(ExitCode::SUCCESS);
    }

    println!("MATLAB {release} at {}", installation.root);
    for capability in Capability::ALL {
        let status = if supports(&release, capability) {
            "supported"
        } else {
            "not supported"
        };
        println!("  {capability}: {status}");
    }
    Ok(ExitCode::SUCCESS)
}
