// src/exec/runner.rs

//! Child process execution: spawning, output streaming, and bounded stops.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{AppSettings, ProjectDescriptor};
use crate::errors::LaunchError;
use crate::exec::backend::{LaunchedRun, StopRequest};
use crate::output::{OutputBroker, OutputLine, StreamKind};
use crate::supervisor::{ExitReport, RunKind, StopKind, SupervisorMsg};

/// One process invocation within a run.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
}

/// A launchable run: one or more stages executed in sequence. A stage that
/// exits non-zero aborts the rest. Script runs have exactly one stage;
/// dependency installs have up to two (venv creation, then pip).
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub id: String,
    pub kind: RunKind,
    pub stages: Vec<CommandSpec>,
}

/// The interpreter used for a project, in resolution order: the project's
/// own virtualenv if present, then the descriptor's interpreter, then the
/// settings default.
pub fn resolve_interpreter(desc: &ProjectDescriptor, settings: &AppSettings) -> PathBuf {
    let venv = venv_python(&desc.folder);
    if venv.is_file() {
        return venv;
    }
    desc.interpreter
        .clone()
        .unwrap_or_else(|| settings.interpreter.clone())
}

pub fn venv_python(folder: &Path) -> PathBuf {
    if cfg!(windows) {
        folder.join("venv").join("Scripts").join("python.exe")
    } else {
        folder.join("venv").join("bin").join("python")
    }
}

/// Build the spec for a normal script run, validating up front so a doomed
/// start fails before any process exists.
pub fn script_spec(
    desc: &ProjectDescriptor,
    settings: &AppSettings,
) -> Result<LaunchSpec, LaunchError> {
    if !desc.entry.is_file() {
        return Err(LaunchError::EntryMissing(desc.entry.clone()));
    }
    let interpreter = resolve_interpreter(desc, settings);
    check_interpreter(&interpreter)?;

    Ok(LaunchSpec {
        id: desc.id.clone(),
        kind: RunKind::Script,
        stages: vec![CommandSpec {
            program: interpreter,
            args: vec![desc.entry.clone().into_os_string()],
            cwd: desc.folder.clone(),
        }],
    })
}

/// A bare program name goes through `PATH` at spawn time; an explicit path
/// must exist now.
pub(crate) fn check_interpreter(program: &Path) -> Result<(), LaunchError> {
    if program.components().count() > 1 && !program.is_file() {
        return Err(LaunchError::InterpreterNotFound(program.to_path_buf()));
    }
    Ok(())
}

/// Spawn the first stage and hand the rest to a detached driver task.
///
/// Returns as soon as the first process exists; the driver streams output,
/// runs the remaining stages, honors stop requests, and finally reports a
/// [`SupervisorMsg::RunExited`] into `events`.
pub(crate) async fn launch(
    spec: LaunchSpec,
    broker: Arc<OutputBroker>,
    events: mpsc::Sender<SupervisorMsg>,
) -> Result<LaunchedRun, LaunchError> {
    let mut stages = spec.stages.into_iter();
    let first = stages
        .next()
        .ok_or_else(|| LaunchError::EntryMissing(PathBuf::from("<no command>")))?;

    info!(project = %spec.id, kind = %spec.kind, program = %first.program.display(), "launching");
    let mut child = spawn_stage(&first)?;
    let pid = child.id().unwrap_or_default();
    attach_readers(&mut child, &spec.id, &broker);

    let (stop_tx, stop_rx) = mpsc::channel(4);
    tokio::spawn(drive(
        spec.id,
        spec.kind,
        child,
        stages.collect(),
        stop_rx,
        broker,
        events,
    ));

    Ok(LaunchedRun { pid, stop: stop_tx })
}

fn spawn_stage(stage: &CommandSpec) -> Result<Child, LaunchError> {
    let mut cmd = Command::new(&stage.program);
    cmd.args(&stage.args)
        .current_dir(&stage.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd.spawn().map_err(LaunchError::SpawnFailed)
}

fn attach_readers(child: &mut Child, id: &str, broker: &Arc<OutputBroker>) {
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, id.to_string(), StreamKind::Stdout, Arc::clone(broker));
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, id.to_string(), StreamKind::Stderr, Arc::clone(broker));
    }
}

fn spawn_reader<R>(stream: R, id: String, kind: StreamKind, broker: Arc<OutputBroker>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            broker.publish(OutputLine::now(id.clone(), kind, line));
        }
    });
}

/// Own the run to completion: wait for each stage, advance to the next on
/// success, stop on request, and report exactly one exit.
async fn drive(
    id: String,
    kind: RunKind,
    mut child: Child,
    rest: Vec<CommandSpec>,
    mut stop_rx: mpsc::Receiver<StopRequest>,
    broker: Arc<OutputBroker>,
    events: mpsc::Sender<SupervisorMsg>,
) {
    let started = Instant::now();
    let mut remaining = rest.into_iter();
    let mut stopped: Option<StopKind> = None;
    let mut exit_code: Option<i32> = None;

    loop {
        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(st) => {
                        exit_code = st.code();
                        if !st.success() {
                            break;
                        }
                        match remaining.next() {
                            None => break,
                            Some(stage) => match spawn_stage(&stage) {
                                Ok(mut next) => {
                                    debug!(project = %id, program = %stage.program.display(), "next stage");
                                    attach_readers(&mut next, &id, &broker);
                                    child = next;
                                }
                                Err(err) => {
                                    warn!(project = %id, %err, "failed to start next stage");
                                    exit_code = Some(-1);
                                    break;
                                }
                            },
                        }
                    }
                    Err(err) => {
                        warn!(project = %id, %err, "wait on child failed");
                        break;
                    }
                }
            }

            req = stop_rx.recv() => {
                match req {
                    Some(StopRequest { grace }) => {
                        let (kind_of_stop, code) = terminate(&id, &mut child, grace).await;
                        stopped = Some(kind_of_stop);
                        exit_code = code;
                        break;
                    }
                    None => {
                        // Supervisor is gone; just see the run through.
                        if let Ok(st) = child.wait().await {
                            exit_code = st.code();
                        }
                        break;
                    }
                }
            }
        }
    }

    let report = ExitReport {
        exit_code,
        duration: started.elapsed(),
        stopped,
    };
    let _ = events.send(SupervisorMsg::RunExited { id, kind, report }).await;
}

/// SIGTERM first, hard kill after the grace period.
async fn terminate(id: &str, child: &mut Child, grace: std::time::Duration) -> (StopKind, Option<i32>) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: signalling a pid we own; the child has not been reaped
        // (we hold it and have not awaited its exit).
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    let _ = child.start_kill();

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => (StopKind::Graceful, status.code()),
        Ok(Err(err)) => {
            warn!(project = %id, %err, "wait after terminate failed");
            (StopKind::Graceful, None)
        }
        Err(_) => {
            info!(project = %id, "grace period elapsed, killing");
            if let Err(err) = child.start_kill() {
                warn!(project = %id, %err, "kill failed");
            }
            let code = child.wait().await.ok().and_then(|s| s.code());
            (StopKind::Forced, code)
        }
    }
}
