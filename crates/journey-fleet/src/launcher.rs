//! Process spawning behind a seam, so the supervisor can be driven by an
//! in-process launcher in tests.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use journey_protocol::WorkerDescriptor;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::FleetError;

#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(
        &self,
        descriptor: &WorkerDescriptor,
    ) -> Result<Box<dyn WorkerProcess>, FleetError>;
}

#[async_trait]
pub trait WorkerProcess: Send {
    fn pid(&self) -> Option<u32>;
    fn has_exited(&mut self) -> bool;
    /// Stop the worker and wait for it to go away.
    async fn terminate(&mut self);
}

/// Spawns `<program> worker --descriptor <json>`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Re-launch the running binary in worker mode.
    pub fn current_exe() -> Result<Self, FleetError> {
        let program = std::env::current_exe().map_err(|e| FleetError::Spawn {
            service: "*".into(),
            message: format!("resolve current executable: {e}"),
        })?;
        Ok(Self::new(program))
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(
        &self,
        descriptor: &WorkerDescriptor,
    ) -> Result<Box<dyn WorkerProcess>, FleetError> {
        let spawn_err = |message: String| FleetError::Spawn {
            service: descriptor.service_name.clone(),
            message,
        };
        let json = serde_json::to_string(descriptor)
            .map_err(|e| spawn_err(format!("encode descriptor: {e}")))?;
        let child = Command::new(&self.program)
            .arg("worker")
            .arg("--descriptor")
            .arg(json)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_err(format!("{}: {e}", self.program.display())))?;
        debug!(
            service = %descriptor.service_name,
            pid = ?child.id(),
            "spawned worker process"
        );
        Ok(Box::new(ChildProcess { child }))
    }
}

struct ChildProcess {
    child: Child,
}

#[async_trait]
impl WorkerProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    async fn terminate(&mut self) {
        let _ = self.child.kill().await;
    }
}
