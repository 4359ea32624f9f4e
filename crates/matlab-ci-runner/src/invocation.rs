//! The end-to-end pipeline drivers call for one build step.
//!
//! A run always passes through the same stages in order:
//! compose, stage, launch, stream, join, clean up. The scratch directory is
//! released on every path out of [`Invocation::run`], including errors and
//! cancellation.

use std::fmt;
use std::fs;
use std::future::Future;
use std::path::PathBuf;

use matlab_ci_core::compose::{self, LaunchPlan, Regime};
use matlab_ci_core::release::supports;
use matlab_ci_core::{
    Capability, Environment, Error, InvocationSpec, LaunchMode, MatlabInstallation, Operation,
    ReleaseInfo, ReleaseResolver, Result, RunnerConfig,
};
use tracing::{debug, info, warn};

use crate::launcher::{LauncherPlatform, stage_launcher};
use crate::orchestrator;
use crate::resources::ResourceBundle;
use crate::scratch::{ScratchHandle, ScratchSpace, generate_token};
use crate::sink::OutputSink;

/// Variable naming the plugin discovery function `buildtool` should call.
pub const PLUGINS_OVERRIDE_VAR: &str = "MW_MATLAB_BUILDTOOL_DEFAULT_PLUGINS_FCN_OVERRIDE";
/// Variable carrying the per-run action id.
pub const ACTION_ID_VAR: &str = "MW_BUILD_PLUGIN_ACTION_ID";
/// Variable pointing the plugins at the scratch directory.
pub const TEMP_FOLDER_VAR: &str = "MW_MATLAB_TEMP_FOLDER";
/// Result file the build plugins leave in the scratch directory.
pub const BUILD_ARTIFACT_FILE: &str = "buildArtifact.json";
/// MATLAB's own search path variable.
pub const MATLAB_PATH_VAR: &str = "MATLABPATH";

/// Banner written to the sink before anything is staged.
const OUTPUT_BANNER: &str = "#################### Starting command output ####################";

/// Progress of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStage {
    /// Resolving the release and building statements
    Composing,
    /// Writing scripts and resources into scratch
    Staging,
    /// Starting the process
    Launching,
    /// Forwarding process output
    Streaming,
    /// Process has exited
    Joined,
    /// Scratch directory removed
    CleanedUp,
}

impl fmt::Display for InvocationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Composing => "composing",
            Self::Staging => "staging",
            Self::Launching => "launching",
            Self::Streaming => "streaming",
            Self::Joined => "joined",
            Self::CleanedUp => "cleaned up",
        };
        f.write_str(name)
    }
}

/// Result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    /// Process exit code, always 0 on success
    pub exit_code: i32,
    /// Id exported to the build plugins for this run
    pub action_id: String,
    /// Build result file moved out of scratch, if any
    pub artifact: Option<PathBuf>,
}

/// Everything staged and ready to launch.
struct Prepared {
    action_id: String,
    scratch: ScratchHandle,
    argv: Vec<String>,
    env: Environment,
}

/// Runs MATLAB for one build step.
///
/// Holds the release cache, so reuse one `Invocation` for the steps of a build.
#[derive(Debug)]
pub struct Invocation<'cfg> {
    config: &'cfg RunnerConfig,
    resources: ResourceBundle,
    resolver: ReleaseResolver,
}

impl<'cfg> Invocation<'cfg> {
    /// Creates a pipeline using `config` and the bundled `resources`.
    pub fn new(config: &'cfg RunnerConfig, resources: ResourceBundle) -> Self {
        Self {
            config,
            resources,
            resolver: ReleaseResolver::new(),
        }
    }

    /// Runs `spec` on `installation` and waits for MATLAB to exit.
    ///
    /// Every failure is also written to `sink`.
    ///
    /// # Errors
    /// Returns `VersionNotFound`, `Unsupported` or `MatlabNotFound` before
    /// anything is launched, `Execution` when MATLAB exits non-zero, and
    /// `Cancelled` when `cancel` resolves first.
    pub async fn run<F>(
        &mut self,
        spec: &InvocationSpec,
        installation: &MatlabInstallation,
        env: &Environment,
        sink: &dyn OutputSink,
        cancel: F,
    ) -> Result<InvocationOutcome>
    where
        F: Future<Output = ()>,
    {
        let result = self.execute(spec, installation, env, sink, cancel).await;
        if let Err(error) = &result
            && !matches!(error, Error::Cancelled)
        {
            sink.line(&error.to_string());
        }
        result
    }

    async fn execute<F>(
        &mut self,
        spec: &InvocationSpec,
        installation: &MatlabInstallation,
        env: &Environment,
        sink: &dyn OutputSink,
        cancel: F,
    ) -> Result<InvocationOutcome>
    where
        F: Future<Output = ()>,
    {
        enter(InvocationStage::Composing);
        let installation = installation.for_environment(env);
        let release = self.resolver.resolve_optional(&installation.root)?;
        check_capabilities(&spec.operation, release.as_ref(), sink)?;

        enter(InvocationStage::Staging);
        let scratch = ScratchSpace::with_dir_name(&spec.working_dir, &self.config.scratch_dir_name)
            .allocate()?;
        let prepared = self
            .prepare(spec, &installation, release.as_ref(), env, sink, scratch)
            .await?;

        enter(InvocationStage::Launching);
        info!(
            "Running {} with MATLAB at {}",
            spec.operation.name(),
            installation.root
        );
        let process = orchestrator::run(
            &prepared.argv,
            &prepared.env,
            &spec.working_dir,
            sink,
            cancel,
        )
        .await?;
        enter(InvocationStage::Joined);
        if !process.drained {
            warn!("MATLAB output was not fully read");
        }

        let artifact = match self.collect_artifact(&prepared.scratch, &prepared.action_id) {
            Ok(artifact) => artifact,
            Err(error) => {
                warn!("Unable to save build results: {error}");
                sink.line(&format!("Unable to save build results: {error}"));
                None
            }
        };
        if let Err(error) = prepared.scratch.release() {
            warn!("Unable to remove scratch directory: {error}");
        }
        enter(InvocationStage::CleanedUp);

        if !process.success() {
            return Err(Error::Execution {
                exit_code: process.exit_code,
            });
        }
        Ok(InvocationOutcome {
            exit_code: process.exit_code,
            action_id: prepared.action_id,
            artifact,
        })
    }

    async fn prepare(
        &self,
        spec: &InvocationSpec,
        installation: &MatlabInstallation,
        release: Option<&ReleaseInfo>,
        env: &Environment,
        sink: &dyn OutputSink,
        scratch: ScratchHandle,
    ) -> Result<Prepared> {
        sink.line("");
        sink.line(OUTPUT_BANNER);
        let action_id = generate_token();
        let scratch_dir = scratch.path_string();
        if spec.operation.uses_build_plugins() {
            self.resources.stage_plugins(&scratch)?;
        } else {
            self.resources.stage_genscript(&scratch)?;
        }

        let body = env.expand(&compose::statement(&spec.operation, &scratch_dir));
        sink.line("Generating MATLAB script with content:");
        for line in body.lines() {
            sink.line(line);
        }
        sink.line("");
        let script = scratch.write_script(&body)?;
        let entry = compose::entry_statement(&scratch_dir, &script);

        let (regime, command) = match self.config.launch_mode {
            LaunchMode::Launcher => {
                let platform = LauncherPlatform::detect(installation.os).await?;
                let launcher = stage_launcher(&self.resources, &scratch, platform)?;
                (Regime::Launcher(launcher.to_string_lossy().into_owned()), None)
            }
            LaunchMode::Direct => {
                let release = release.ok_or_else(|| Error::VersionNotFound {
                    root: installation.root_path().to_path_buf(),
                    reason: "the installation root could not be resolved".to_owned(),
                })?;
                let executable = installation.matlab_executable();
                if !executable.is_file() {
                    return Err(Error::MatlabNotFound(format!(
                        "{} does not exist on this node",
                        executable.display()
                    )));
                }
                let command = match &spec.operation {
                    Operation::RunCommand(options) => Some(env.expand(&options.command)),
                    Operation::RunTests(_) | Operation::RunBuildTask(_) => None,
                };
                (Regime::for_release(release), command)
            }
        };

        let raw_command = command.is_some();
        let argv = compose::compose(&LaunchPlan {
            regime,
            os: installation.os,
            matlab_root: installation.root.clone(),
            entry,
            command,
            startup_options: spec.startup_options.clone(),
        });
        debug!("Composed argument vector: {argv:?}");

        let mut process_env = env.clone();
        if spec.operation.uses_build_plugins() {
            // A raw command skips the script's addpath, so MATLAB needs scratch on its path.
            if raw_command {
                process_env.prepend_to(MATLAB_PATH_VAR, &scratch_dir, installation.os);
            }
            process_env.insert(PLUGINS_OVERRIDE_VAR, self.config.plugins_function.clone());
            process_env.insert(ACTION_ID_VAR, action_id.clone());
            process_env.insert(TEMP_FOLDER_VAR, scratch_dir);
        }
        if !installation.is_templated() {
            installation.apply_to(&mut process_env);
        }

        Ok(Prepared {
            action_id,
            scratch,
            argv,
            env: process_env,
        })
    }

    /// Moves the build result file out of scratch before it is deleted.
    fn collect_artifact(&self, scratch: &ScratchHandle, action_id: &str) -> Result<Option<PathBuf>> {
        let Some(artifact_dir) = &self.config.artifact_dir else {
            return Ok(None);
        };
        let source = scratch.path().join(BUILD_ARTIFACT_FILE);
        if !source.is_file() {
            return Ok(None);
        }
        fs::create_dir_all(artifact_dir)?;
        let target = artifact_dir.join(format!("buildArtifact{action_id}.json"));
        fs::copy(&source, &target)?;
        fs::remove_file(&source)?;
        debug!("Saved build result to {}", target.display());
        Ok(Some(target))
    }
}

fn enter(stage: InvocationStage) {
    debug!("Invocation stage: {stage}");
}

/// Fails when the operation needs a newer release, and warns about artifacts it cannot produce.
fn check_capabilities(
    operation: &Operation,
    release: Option<&ReleaseInfo>,
    sink: &dyn OutputSink,
) -> Result<()> {
    let (Some(release), Operation::RunTests(options)) = (release, operation) else {
        return Ok(());
    };
    if !supports(release, Capability::RunTests) {
        return Err(Error::Unsupported {
            capability: Capability::RunTests,
            release: release.clone(),
        });
    }
    for (capability, path) in options.gated_artifacts() {
        if !supports(release, capability) {
            sink.line(&format!(
                "Warning: MATLAB {release} does not support {capability}; {path} will not be generated."
            ));
        }
    }
    Ok(())
}
