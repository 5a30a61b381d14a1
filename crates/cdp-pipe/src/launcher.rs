use crate::platform_factory::{NativePipePlatform, PlatformPipeFactory};
use crate::rollback::{Endpoint, Rollback};
use anyhow::Context;
use cdp_pipe_core::{
    LaunchConfig, PipeDirection, PipeError, PipePlatform, PipeTransport, ProcessHandle, Result,
};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct LaunchState {
    config: LaunchConfig,
    launched: bool,
    process: Option<ProcessHandle>,
}

/// Starts a browser whose debugging protocol runs over two anonymous pipes.
///
/// A launcher launches at most once. The first call to
/// [`Launcher::launch_pipe`] consumes it, whether or not the launch succeeds.
pub struct Launcher<P: PipePlatform + 'static = NativePipePlatform> {
    platform: Arc<P>,
    state: Mutex<LaunchState>,
}

impl Launcher<NativePipePlatform> {
    pub fn new(config: LaunchConfig) -> Self {
        Self::with_platform(config, PlatformPipeFactory::create_platform())
    }

    /// Launcher with the default flags switched over to pipe transport.
    pub fn new_pipe_mode() -> Self {
        Self::new(LaunchConfig::pipe_mode())
    }
}

impl Default for Launcher<NativePipePlatform> {
    fn default() -> Self {
        Self::new(LaunchConfig::default())
    }
}

impl<P: PipePlatform + 'static> Launcher<P> {
    pub fn with_platform(config: LaunchConfig, platform: P) -> Self {
        Self {
            platform: Arc::new(platform),
            state: Mutex::new(LaunchState {
                config,
                launched: false,
                process: None,
            }),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_name(&self) -> &'static str {
        self.platform.platform_name()
    }

    pub async fn has_launched(&self) -> bool {
        self.state.lock().await.launched
    }

    /// Pid of the launched browser, if the launch got as far as spawning it.
    pub async fn pid(&self) -> Option<u32> {
        self.state
            .lock()
            .await
            .process
            .as_ref()
            .map(ProcessHandle::pid)
    }

    pub async fn config(&self) -> LaunchConfig {
        self.state.lock().await.config.clone()
    }

    /// Change the configuration. Has no effect on a browser already running.
    pub async fn update_config<F>(&self, update: F)
    where
        F: FnOnce(&mut LaunchConfig),
    {
        update(&mut self.state.lock().await.config);
    }

    /// The argument list the browser gets (or got) on its command line.
    pub async fn format_args(&self) -> Result<Vec<String>> {
        self.state.lock().await.config.flags.format()
    }

    /// Launch the browser and connect a transport to its debugging pipes.
    ///
    /// The whole launch runs under the state lock. Every endpoint created
    /// along the way is closed again if any step fails.
    pub async fn launch_pipe(&self) -> Result<(PipeTransport, ProcessHandle)> {
        let mut state = self.state.lock().await;
        if state.launched {
            return Err(PipeError::AlreadyLaunched);
        }
        state.launched = true;

        state.config.validate()?;
        let bin = state.config.resolve_bin()?;
        state.config.write_preferences()?;

        let mut rollback = Rollback::default();

        let to_child = self
            .platform
            .create_pipe()
            .map_err(|source| PipeError::PipeCreation {
                direction: PipeDirection::ToChild,
                source,
            })?;
        rollback.register(Endpoint::ChildRead, to_child.read);
        rollback.register(Endpoint::ParentWrite, to_child.write);

        let from_child = self
            .platform
            .create_pipe()
            .map_err(|source| PipeError::PipeCreation {
                direction: PipeDirection::FromChild,
                source,
            })?;
        rollback.register(Endpoint::ParentRead, from_child.read);
        rollback.register(Endpoint::ChildWrite, from_child.write);
        debug!(platform = self.platform.platform_name(), "Created protocol pipes");

        let configurator = self.platform.bind_child_pipes(
            &mut state.config.flags,
            rollback.get(Endpoint::ChildRead)?,
            rollback.get(Endpoint::ChildWrite)?,
        )?;

        // Only now: binding may have added flags the child needs.
        let args = state.config.flags.format()?;

        let mut command = Command::new(&bin);
        command.args(&args);
        default_process_setup(&mut command, &state.config);
        debug!(configurator = configurator.label(), "Applying process configurator");
        configurator.apply(&mut command);

        let child = command.spawn().map_err(|source| PipeError::Spawn {
            bin: bin.clone(),
            source,
        })?;

        rollback.release_to_child(Endpoint::ChildRead)?;
        rollback.release_to_child(Endpoint::ChildWrite)?;

        let pid = child
            .id()
            .context("spawned browser has no pid")
            .map_err(PipeError::Other)?;
        let platform: Arc<dyn PipePlatform> = self.platform.clone();
        let process = ProcessHandle::watch(pid, child, platform);
        state.process = Some(process.clone());
        info!(pid, bin = %bin.display(), args = ?args, "Launched browser over pipes");

        let transport = match self.connect(&mut rollback) {
            Ok(transport) => transport,
            Err(e) => {
                warn!(pid, error = ?e, "Failed to attach pipe transport, killing browser");
                if let Err(kill_error) = process.kill().await {
                    warn!(pid, error = ?kill_error, "Failed to kill browser");
                }
                return Err(e);
            }
        };
        rollback.commit();

        Ok((transport, process))
    }

    /// Like [`Launcher::launch_pipe`], but panics if the launch fails.
    pub async fn must_launch_pipe(&self) -> (PipeTransport, ProcessHandle) {
        match self.launch_pipe().await {
            Ok(launched) => launched,
            Err(e) => panic!("failed to launch browser over pipes: {e}"),
        }
    }

    /// Wait for the browser to exit, then remove its user data dir.
    ///
    /// Does not stop the browser; close the transport or kill the process
    /// first.
    pub async fn cleanup(&self) -> Result<()> {
        let (process, user_data_dir) = {
            let state = self.state.lock().await;
            (
                state.process.clone(),
                state.config.user_data_dir().map(|dir| dir.to_path_buf()),
            )
        };

        if let Some(process) = process {
            let outcome = process.wait_exit().await;
            debug!(pid = process.pid(), outcome = ?outcome, "Browser gone, cleaning up");
        }

        if let Some(dir) = user_data_dir {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => info!(dir = %dir.display(), "Removed user data dir"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(anyhow::Error::new(e)
                        .context(format!("failed to remove {}", dir.display()))
                        .into());
                }
            }
        }
        Ok(())
    }

    fn connect(&self, rollback: &mut Rollback) -> Result<PipeTransport> {
        let writer = self
            .platform
            .into_writer(rollback.take(Endpoint::ParentWrite)?)
            .map_err(PipeError::Transport)?;
        let reader = self
            .platform
            .into_reader(rollback.take(Endpoint::ParentRead)?)
            .map_err(PipeError::Transport)?;
        Ok(PipeTransport::from_boxed(reader, writer))
    }
}

/// Process attributes unrelated to the pipes.
fn default_process_setup(command: &mut Command, config: &LaunchConfig) {
    if let Some(dir) = &config.working_dir {
        command.current_dir(dir);
    }
    command.envs(&config.env);
    command.stdin(Stdio::null());
    if config.forward_output {
        command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    } else {
        command.stdout(Stdio::null()).stderr(Stdio::null());
    }
}
