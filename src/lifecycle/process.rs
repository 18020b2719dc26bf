//! Spawning and reaping the worker executable.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, ChildStdout, Command};

use crate::error::LifecycleError;

use super::readiness::{self, READY_ENV, ReadinessSignal};

const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// How to start the worker.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment for the child.
    pub env: Vec<(String, String)>,
    pub readiness: ReadinessSignal,
}

impl Default for WorkerCommand {
    fn default() -> Self {
        Self {
            program: PathBuf::from("algo_worker"),
            args: Vec::new(),
            env: Vec::new(),
            readiness: ReadinessSignal::PipeByte,
        }
    }
}

/// A launched worker, possibly not yet ready.
#[async_trait]
pub trait WorkerProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Blocks until the readiness signal arrives or `timeout` passes.
    async fn wait_ready(&mut self, timeout: Duration) -> Result<(), LifecycleError>;

    /// Exit status description if the process is gone.
    fn exit_status(&mut self) -> Option<String>;

    /// Kills and reaps. Idempotent.
    async fn terminate(&mut self);
}

/// Something that can start a worker.
#[async_trait]
pub trait Launch: Send + Sync + 'static {
    async fn spawn(&self) -> Result<Box<dyn WorkerProcess>, LifecycleError>;

    /// Human-readable name of what is launched, for events.
    fn describe(&self) -> String;
}

/// Launches a real executable with `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    cmd: WorkerCommand,
}

impl ProcessLauncher {
    pub fn new(cmd: WorkerCommand) -> Self {
        Self { cmd }
    }
}

#[async_trait]
impl Launch for ProcessLauncher {
    async fn spawn(&self) -> Result<Box<dyn WorkerProcess>, LifecycleError> {
        let marker = self.cmd.readiness.marker_path();
        if let Some(path) = &marker {
            let _ = tokio::fs::remove_file(path).await;
        }

        let mut command = Command::new(&self.cmd.program);
        command
            .args(&self.cmd.args)
            .envs(self.cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(READY_ENV, self.cmd.readiness.env_value())
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        match marker {
            None => command.stdout(Stdio::piped()),
            Some(_) => command.stdout(Stdio::null()),
        };

        let mut child = command.spawn().map_err(|source| LifecycleError::Launch {
            program: self.describe(),
            source,
        })?;
        let pending = match marker {
            None => child.stdout.take().map(Pending::Pipe),
            Some(path) => Some(Pending::Marker(path)),
        };

        Ok(Box::new(ChildProcess { child, pending }))
    }

    fn describe(&self) -> String {
        self.cmd.program.display().to_string()
    }
}

enum Pending {
    Pipe(ChildStdout),
    Marker(PathBuf),
}

struct ChildProcess {
    child: Child,
    pending: Option<Pending>,
}

#[async_trait]
impl WorkerProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait_ready(&mut self, timeout: Duration) -> Result<(), LifecycleError> {
        match self.pending.take() {
            None => Err(LifecycleError::HandshakeClosed),
            Some(Pending::Pipe(mut stdout)) => {
                readiness::wait_for_byte(&mut stdout, timeout).await?;
                // Keep draining so a chatty worker never blocks on a full pipe.
                tokio::spawn(async move {
                    let _ = tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await;
                });
                Ok(())
            }
            Some(Pending::Marker(path)) => {
                readiness::wait_for_marker(&path, &mut self.child, timeout).await
            }
        }
    }

    fn exit_status(&mut self) -> Option<String> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) => None,
            Err(e) => Some(format!("unknown ({e})")),
        }
    }

    async fn terminate(&mut self) {
        let _ = self.child.start_kill();
        let _ = tokio::time::timeout(REAP_TIMEOUT, self.child.wait()).await;
    }
}
