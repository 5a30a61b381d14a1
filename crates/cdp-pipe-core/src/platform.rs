use crate::error::Result;
use crate::flags::Flags;
use async_trait::async_trait;
use std::fmt;
use std::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;

pub type BoxedPipeReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedPipeWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Both ends of one anonymous OS pipe.
#[derive(Debug)]
pub struct PipeEnds {
    pub read: File,
    pub write: File,
}

/// A pending change to the inheritance attributes of a process that has not
/// been spawned yet. Consumed by [`ProcessConfigurator::apply`], so it runs
/// at most once.
pub struct ProcessConfigurator {
    label: &'static str,
    apply: Box<dyn FnOnce(&mut Command) + Send>,
}

impl ProcessConfigurator {
    pub fn new<F>(label: &'static str, apply: F) -> Self
    where
        F: FnOnce(&mut Command) + Send + 'static,
    {
        Self {
            label,
            apply: Box::new(apply),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn apply(self, command: &mut Command) {
        (self.apply)(command)
    }
}

impl fmt::Debug for ProcessConfigurator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessConfigurator")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// OS-specific half of launching a browser over pipes.
///
/// Exactly one implementation is compiled in per target; shared launch logic
/// only ever talks to this trait.
#[async_trait]
pub trait PipePlatform: Send + Sync {
    fn platform_name(&self) -> &'static str;

    /// Create one pipe. Neither end is inheritable yet.
    fn create_pipe(&self) -> std::io::Result<PipeEnds>;

    /// Arrange for `child_read` and `child_write` to end up in the child.
    ///
    /// May add flags the child needs to find its pipe ends, so the flag set
    /// must be formatted only after this returns. The endpoints are borrowed
    /// and stay owned by the caller whether this succeeds or fails.
    fn bind_child_pipes(
        &self,
        flags: &mut Flags,
        child_read: &File,
        child_write: &File,
    ) -> Result<ProcessConfigurator>;

    /// Wrap the parent's read end for async I/O.
    fn into_reader(&self, end: File) -> std::io::Result<BoxedPipeReader>;

    /// Wrap the parent's write end for async I/O.
    fn into_writer(&self, end: File) -> std::io::Result<BoxedPipeWriter>;

    /// Forcefully terminate a process by pid.
    async fn kill(&self, pid: u32) -> std::io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_configurator_runs_once_on_command() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let configurator = ProcessConfigurator::new("count", move |command: &mut Command| {
            command.arg("--counted");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(configurator.label(), "count");
        assert!(format!("{configurator:?}").contains("count"));

        let mut command = Command::new("true");
        configurator.apply(&mut command);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(
            command
                .as_std()
                .get_args()
                .any(|arg| arg == "--counted")
        );
    }
}
