//! Launches MATLAB and streams its output.
//!
//! Both output pipes are read concurrently and every complete line is handed to
//! the sink as soon as it arrives. The caller's cancel future is raced against
//! the child; when it resolves the child is killed.

use std::future::Future;
use std::path::Path;
use std::process::Stdio;

use matlab_ci_core::{Environment, Error, Result};
use tokio::io::{AsyncBufReadExt as _, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::sink::OutputSink;

/// Exit code reported when the process could not be started at all.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 1;

/// How a MATLAB process finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessResult {
    /// Exit code, `-1` when the process was terminated by a signal
    pub exit_code: i32,
    /// Whether both output streams were read to the end
    pub drained: bool,
}

impl ProcessResult {
    /// Whether the process exited with code 0.
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs `argv` to completion.
///
/// The child sees exactly `env` and starts in `cwd`. If the program cannot be
/// started the reason goes to the sink and a result with
/// [`LAUNCH_FAILURE_EXIT_CODE`] is returned instead of an error.
///
/// # Errors
/// Returns `Cancelled` if `cancel` resolves first, or an I/O error if waiting
/// on the child fails.
pub async fn run<F>(
    argv: &[String],
    env: &Environment,
    cwd: &Path,
    sink: &dyn OutputSink,
    cancel: F,
) -> Result<ProcessResult>
where
    F: Future<Output = ()>,
{
    let Some((program, args)) = argv.split_first() else {
        sink.line("No MATLAB command to run.");
        return Ok(ProcessResult {
            exit_code: LAUNCH_FAILURE_EXIT_CODE,
            drained: true,
        });
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .env_clear()
        .envs(env.iter())
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Launching {program} with {} argument(s)", args.len());
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(error) => {
            warn!("Failed to launch {program}: {error}");
            sink.line(&format!("Unable to launch MATLAB ({program}): {error}"));
            return Ok(ProcessResult {
                exit_code: LAUNCH_FAILURE_EXIT_CODE,
                drained: true,
            });
        }
    };

    let (sender, mut receiver) = mpsc::unbounded_channel();
    let readers: Vec<JoinHandle<bool>> = [
        child.stdout.take().map(|stdout| spawn_reader(stdout, sender.clone())),
        child.stderr.take().map(|stderr| spawn_reader(stderr, sender.clone())),
    ]
    .into_iter()
    .flatten()
    .collect();
    drop(sender);

    tokio::pin!(cancel);

    loop {
        tokio::select! {
            line = receiver.recv() => match line {
                Some(line) => sink.line(&line),
                None => break,
            },
            () = &mut cancel => {
                return Err(terminate(&mut child, &mut receiver, readers, sink).await);
            }
        }
    }

    let status = tokio::select! {
        status = child.wait() => status?,
        () = &mut cancel => {
            return Err(terminate(&mut child, &mut receiver, readers, sink).await);
        }
    };

    let mut drained = true;
    for reader in readers {
        drained &= reader.await.unwrap_or(false);
    }

    let exit_code = status.code().unwrap_or(-1);
    debug!("{program} exited with code {exit_code}");
    Ok(ProcessResult { exit_code, drained })
}

/// Kills the child, flushes whatever output is already buffered, and reports cancellation.
async fn terminate(
    child: &mut Child,
    receiver: &mut mpsc::UnboundedReceiver<String>,
    readers: Vec<JoinHandle<bool>>,
    sink: &dyn OutputSink,
) -> Error {
    if let Err(error) = child.kill().await {
        warn!("Failed to kill MATLAB process: {error}");
    }
    while let Ok(line) = receiver.try_recv() {
        sink.line(&line);
    }
    for reader in readers {
        reader.abort();
    }
    sink.line("MATLAB invocation was cancelled.");
    Error::Cancelled
}

/// Reads `stream` line by line into `sender`, returning whether EOF was reached.
fn spawn_reader<R>(stream: R, sender: mpsc::UnboundedSender<String>) -> JoinHandle<bool>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer).await {
                Ok(0) => return true,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    let line = line.trim_end_matches(['\n', '\r']);
                    if sender.send(line.to_owned()).is_err() {
                        return false;
                    }
                }
                Err(error) => {
                    warn!("Failed to read MATLAB output: {error}");
                    return false;
                }
            }
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use std::future;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    fn shell(script: &str) -> Vec<String> {
        vec!["/bin/sh".to_owned(), "-c".to_owned(), script.to_owned()]
    }

    #[tokio::test]
    async fn test_streams_both_pipes() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let sink = MemorySink::new();
        let result = run(
            &shell("echo out; echo err 1>&2; printf 'no newline'"),
            &Environment::new(),
            temp.path(),
            &sink,
            future::pending::<()>(),
        )
        .await
        .expect("run completes");

        assert!(result.success());
        assert!(result.drained);
        let mut lines = sink.lines();
        lines.sort();
        assert_eq!(lines, vec!["err", "no newline", "out"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_code() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let sink = MemorySink::new();
        let result = run(
            &shell("exit 5"),
            &Environment::new(),
            temp.path(),
            &sink,
            future::pending::<()>(),
        )
        .await
        .expect("run completes");
        assert_eq!(result.exit_code, 5);
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_environment_and_cwd() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let sink = MemorySink::new();
        let env = Environment::new().with("GREETING", "hello");
        run(
            &shell("echo \"$GREETING\"; pwd"),
            &env,
            temp.path(),
            &sink,
            future::pending::<()>(),
        )
        .await
        .expect("run completes");

        let lines = sink.lines();
        assert_eq!(lines[0], "hello");
        let canonical = temp.path().canonicalize().expect("canonical temp");
        assert_eq!(Path::new(&lines[1]).canonicalize().expect("canonical pwd"), canonical);
    }

    #[tokio::test]
    async fn test_launch_failure_is_exit_code() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let sink = MemorySink::new();
        let result = run(
            &["/no/such/run-matlab-command".to_owned()],
            &Environment::new(),
            temp.path(),
            &sink,
            future::pending::<()>(),
        )
        .await
        .expect("launch failure is not an error");

        assert_eq!(result.exit_code, LAUNCH_FAILURE_EXIT_CODE);
        assert!(sink.contains("Unable to launch MATLAB"));
    }

    #[tokio::test]
    async fn test_cancel_kills_child() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let sink = MemorySink::new();
        let (trigger, cancelled) = oneshot::channel::<()>();

        let argv = shell("echo started; sleep 30");
        let env = Environment::new();
        let runner = run(
            &argv,
            &env,
            temp.path(),
            &sink,
            async move {
                drop(cancelled.await);
            },
        );
        drop(trigger);

        let error = runner.await.expect_err("cancelled run");
        assert!(matches!(error, Error::Cancelled));
        assert!(sink.contains("cancelled"));
    }
}
