use async_trait::async_trait;
use cdp_pipe_core::{
    BoxedPipeReader, BoxedPipeWriter, Flags, PipeEnds, PipePlatform, ProcessConfigurator, Result,
};
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid as NixPid;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use tokio::net::unix::pipe;
use tokio::process::Command;
use tracing::{debug, info};

/// Descriptor the browser reads protocol messages from.
pub const CHILD_READ_FD: RawFd = 3;
/// Descriptor the browser writes protocol messages to.
pub const CHILD_WRITE_FD: RawFd = 4;

/// Unix pipe platform. Pipe ends are passed by descriptor position, so no
/// flag is needed to tell the child where they are.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixPipePlatform;

#[async_trait]
impl PipePlatform for UnixPipePlatform {
    fn platform_name(&self) -> &'static str {
        "Unix"
    }

    fn create_pipe(&self) -> io::Result<PipeEnds> {
        let (read, write) = open_cloexec_pipe()?;
        Ok(PipeEnds {
            read: File::from(read),
            write: File::from(write),
        })
    }

    fn bind_child_pipes(
        &self,
        _flags: &mut Flags,
        child_read: &File,
        child_write: &File,
    ) -> Result<ProcessConfigurator> {
        let read_fd = child_read.as_raw_fd();
        let write_fd = child_write.as_raw_fd();
        debug!(
            read_fd,
            write_fd, "Child pipe ends will be installed as fds {CHILD_READ_FD} and {CHILD_WRITE_FD}"
        );

        Ok(ProcessConfigurator::new("unix-extra-fds", move |command: &mut Command| {
            // SAFETY: the hook only calls async-signal-safe functions.
            unsafe {
                command.pre_exec(move || install_child_fds(read_fd, write_fd));
            }
        }))
    }

    fn into_reader(&self, end: File) -> io::Result<BoxedPipeReader> {
        let receiver = pipe::Receiver::from_owned_fd(OwnedFd::from(end))?;
        Ok(Box::new(receiver))
    }

    fn into_writer(&self, end: File) -> io::Result<BoxedPipeWriter> {
        let sender = pipe::Sender::from_owned_fd(OwnedFd::from(end))?;
        Ok(Box::new(sender))
    }

    async fn kill(&self, pid: u32) -> io::Result<()> {
        let nix_pid = NixPid::from_raw(pid as i32);

        match signal::kill(nix_pid, Signal::SIGKILL) {
            Ok(()) => {
                info!("Sent SIGKILL to process {}", pid);
                Ok(())
            }
            Err(Errno::ESRCH) => {
                info!("Process {} not found (already terminated)", pid);
                Ok(())
            }
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn open_cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::OFlag;

    Ok(nix::unistd::pipe2(OFlag::O_CLOEXEC)?)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn open_cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let (read, write) = nix::unistd::pipe()?;
    set_cloexec(read.as_raw_fd())?;
    set_cloexec(write.as_raw_fd())?;
    Ok((read, write))
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Runs in the forked child before exec.
///
/// Both ends are first duplicated above fd 4 so that installing one cannot
/// clobber the other when the originals already sit on 3 or 4. `dup2`
/// clears close-on-exec on the targets, everything else stays close-on-exec.
fn install_child_fds(read_fd: RawFd, write_fd: RawFd) -> io::Result<()> {
    let read_tmp = unsafe { libc::fcntl(read_fd, libc::F_DUPFD, CHILD_WRITE_FD + 1) };
    if read_tmp < 0 {
        return Err(io::Error::last_os_error());
    }
    let write_tmp = unsafe { libc::fcntl(write_fd, libc::F_DUPFD, CHILD_WRITE_FD + 1) };
    if write_tmp < 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { libc::dup2(read_tmp, CHILD_READ_FD) } < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::dup2(write_tmp, CHILD_WRITE_FD) } < 0 {
        return Err(io::Error::last_os_error());
    }

    unsafe {
        libc::close(read_tmp);
        libc::close(write_tmp);
    }
    Ok(())
}
