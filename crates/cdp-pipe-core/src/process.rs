use crate::error::{PipeError, Result};
use crate::platform::PipePlatform;
use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::watch;
use tracing::{info, warn};

/// How the browser process ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitOutcome {
    /// The process exited with the given status.
    Exited(ExitStatus),
    /// Waiting on the process failed, so its status is unknown.
    WaitFailed(String),
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(status) if status.success())
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitOutcome::Exited(status) => status.code(),
            ExitOutcome::WaitFailed(_) => None,
        }
    }
}

/// Handle to a launched browser process.
///
/// A background task owns the child and publishes its exit exactly once;
/// the handle only observes that signal. Clones share the signal.
#[derive(Clone)]
pub struct ProcessHandle {
    pid: u32,
    exit: watch::Receiver<Option<ExitOutcome>>,
    platform: Arc<dyn PipePlatform>,
}

impl ProcessHandle {
    /// Start the exit watcher for `child` and return a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(pid: u32, mut child: Child, platform: Arc<dyn PipePlatform>) -> Self {
        let (exit_tx, exit_rx) = watch::channel(None);

        tokio::spawn(async move {
            let outcome = match child.wait().await {
                Ok(status) => ExitOutcome::Exited(status),
                Err(e) => {
                    warn!(pid, error = %e, "Failed to wait for browser process");
                    ExitOutcome::WaitFailed(e.to_string())
                }
            };
            info!(pid, outcome = ?outcome, "Browser process exited");
            exit_tx.send_replace(Some(outcome));
        });

        Self {
            pid,
            exit: exit_rx,
            platform,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    pub fn exit_outcome(&self) -> Option<ExitOutcome> {
        self.exit.borrow().clone()
    }

    /// Wait until the process has exited.
    pub async fn wait_exit(&self) -> ExitOutcome {
        let mut exit = self.exit.clone();
        match exit.wait_for(Option::is_some).await {
            Ok(outcome) => outcome
                .clone()
                .unwrap_or_else(|| ExitOutcome::WaitFailed("exit signal was empty".to_string())),
            Err(_) => ExitOutcome::WaitFailed("exit watcher stopped".to_string()),
        }
    }

    /// Forcefully terminate the process. A process that already exited is
    /// left alone, since its pid may have been reused.
    pub async fn kill(&self) -> Result<()> {
        if self.has_exited() {
            return Ok(());
        }

        self.platform
            .kill(self.pid)
            .await
            .map_err(|source| PipeError::Kill {
                pid: self.pid,
                source,
            })?;
        info!(pid = self.pid, "Killed browser process");
        Ok(())
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("exit", &*self.exit.borrow())
            .field("platform", &self.platform.platform_name())
            .finish()
    }
}
