use async_trait::async_trait;
use cdp_pipe_core::flags::REMOTE_DEBUGGING_IO_PIPES;
use cdp_pipe_core::{
    BoxedPipeReader, BoxedPipeWriter, ChildEndpoint, Flags, PipeEnds, PipeError, PipePlatform,
    ProcessConfigurator, Result,
};
use std::fs::File;
use std::io;
use std::os::windows::io::{AsRawHandle, FromRawHandle};
use tokio::process::Command;
use tracing::{debug, info, warn};
use windows::Win32::Foundation::{HANDLE, HANDLE_FLAG_INHERIT, HANDLE_FLAGS, SetHandleInformation};
use windows::Win32::System::Pipes::CreatePipe;

/// CREATE_NO_WINDOW (0x08000000) - the browser runs without a console window
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Windows pipe platform. The child learns its pipe handles from a flag, and
/// inherits them because they are marked inheritable before spawn.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsPipePlatform;

#[async_trait]
impl PipePlatform for WindowsPipePlatform {
    fn platform_name(&self) -> &'static str {
        "Windows"
    }

    fn create_pipe(&self) -> io::Result<PipeEnds> {
        let mut read = HANDLE::default();
        let mut write = HANDLE::default();

        // No security attributes, so neither end is inheritable yet.
        unsafe { CreatePipe(&mut read, &mut write, None, 0) }.map_err(io::Error::from)?;

        // SAFETY: CreatePipe succeeded, so both handles are open and owned here.
        let (read, write) = unsafe {
            (
                File::from_raw_handle(read.0),
                File::from_raw_handle(write.0),
            )
        };
        Ok(PipeEnds { read, write })
    }

    /// Marks both child ends inheritable and records their handle values in
    /// `--remote-debugging-io-pipes`.
    ///
    /// The marks stay on until the caller closes the ends. std spawns every
    /// child with handle inheritance enabled and offers no explicit handle
    /// list, so a process spawned elsewhere in this program between binding
    /// and the browser's spawn also inherits these ends. Launches that bind
    /// concurrently with unrelated spawns should serialize them.
    fn bind_child_pipes(
        &self,
        flags: &mut Flags,
        child_read: &File,
        child_write: &File,
    ) -> Result<ProcessConfigurator> {
        bind_with(set_inheritable, flags, child_read, child_write)
    }

    fn into_reader(&self, end: File) -> io::Result<BoxedPipeReader> {
        // Anonymous pipes have no overlapped I/O; reads go through the
        // blocking pool.
        Ok(Box::new(tokio::fs::File::from_std(end)))
    }

    fn into_writer(&self, end: File) -> io::Result<BoxedPipeWriter> {
        Ok(Box::new(tokio::fs::File::from_std(end)))
    }

    async fn kill(&self, pid: u32) -> io::Result<()> {
        let output = Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .output()
            .await?;

        if output.status.success() {
            info!(pid = %pid, "Successfully force killed process");
            Ok(())
        } else {
            Err(io::Error::other(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

fn bind_with<M>(
    mark: M,
    flags: &mut Flags,
    child_read: &File,
    child_write: &File,
) -> Result<ProcessConfigurator>
where
    M: Fn(HANDLE, bool) -> io::Result<()>,
{
    let read_handle = HANDLE(child_read.as_raw_handle());
    let write_handle = HANDLE(child_write.as_raw_handle());

    mark(read_handle, true).map_err(|source| PipeError::PlatformBinding {
        endpoint: ChildEndpoint::Read,
        source,
    })?;

    if let Err(source) = mark(write_handle, true) {
        // Don't leave a half-bound read end visible to unrelated spawns.
        if let Err(e) = mark(read_handle, false) {
            warn!(error = %e, "Failed to clear inherit flag on read handle");
        }
        return Err(PipeError::PlatformBinding {
            endpoint: ChildEndpoint::Write,
            source,
        });
    }

    let read_value = read_handle.0 as usize;
    let write_value = write_handle.0 as usize;
    flags.set(REMOTE_DEBUGGING_IO_PIPES, [format!("{read_value},{write_value}")]);
    debug!(read_value, write_value, "Marked child pipe handles inheritable");

    // std spawns with bInheritHandles set, so marking the handles is what
    // carries them into the child; the hook only tunes creation flags.
    Ok(ProcessConfigurator::new(
        "windows-inherited-handles",
        move |command: &mut Command| {
            debug!(read_value, write_value, "Spawning with inherited pipe handles");
            command.creation_flags(CREATE_NO_WINDOW);
        },
    ))
}

fn set_inheritable(handle: HANDLE, inheritable: bool) -> io::Result<()> {
    let value = if inheritable {
        HANDLE_FLAG_INHERIT
    } else {
        HANDLE_FLAGS(0)
    };
    unsafe { SetHandleInformation(handle, HANDLE_FLAG_INHERIT.0, value) }.map_err(io::Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use windows::Win32::Foundation::GetHandleInformation;

    fn is_inheritable(file: &File) -> bool {
        let mut flags = 0u32;
        unsafe { GetHandleInformation(HANDLE(file.as_raw_handle()), &mut flags) }.unwrap();
        flags & HANDLE_FLAG_INHERIT.0 != 0
    }

    #[test]
    fn test_create_pipe_is_not_inheritable() {
        let platform = WindowsPipePlatform;
        let PipeEnds { mut read, mut write } = platform.create_pipe().unwrap();

        assert!(!is_inheritable(&read));
        assert!(!is_inheritable(&write));

        write.write_all(b"abc").unwrap();
        drop(write);
        let mut buf = String::new();
        read.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "abc");
    }

    #[test]
    fn test_bind_marks_handles_and_sets_flag() {
        let platform = WindowsPipePlatform;
        let to_child = platform.create_pipe().unwrap();
        let from_child = platform.create_pipe().unwrap();
        let mut flags = Flags::new();

        let configurator = platform
            .bind_child_pipes(&mut flags, &to_child.read, &from_child.write)
            .unwrap();

        assert_eq!(configurator.label(), "windows-inherited-handles");
        assert!(is_inheritable(&to_child.read));
        assert!(is_inheritable(&from_child.write));
        assert!(!is_inheritable(&to_child.write));

        let expected = format!(
            "{},{}",
            to_child.read.as_raw_handle() as usize,
            from_child.write.as_raw_handle() as usize
        );
        assert_eq!(flags.get(REMOTE_DEBUGGING_IO_PIPES).unwrap(), [expected]);
    }

    #[test]
    fn test_read_mark_failure_leaves_flags_and_ends_alone() {
        let platform = WindowsPipePlatform;
        let to_child = platform.create_pipe().unwrap();
        let from_child = platform.create_pipe().unwrap();
        let mut flags = Flags::new();

        let err = bind_with(
            |_, _| Err(io::Error::from(io::ErrorKind::PermissionDenied)),
            &mut flags,
            &to_child.read,
            &from_child.write,
        )
        .unwrap_err();

        match err {
            PipeError::PlatformBinding { endpoint, source } => {
                assert_eq!(endpoint, ChildEndpoint::Read);
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected PlatformBinding, got {other:?}"),
        }
        assert_eq!(flags, Flags::new());
        assert!(!is_inheritable(&to_child.read));
        assert!(!is_inheritable(&from_child.write));
    }

    #[test]
    fn test_write_mark_failure_reverts_read_handle() {
        let platform = WindowsPipePlatform;
        let PipeEnds {
            read: child_read,
            write: mut parent_write,
        } = platform.create_pipe().unwrap();
        let PipeEnds {
            read: mut parent_read,
            write: child_write,
        } = platform.create_pipe().unwrap();
        let write_handle = HANDLE(child_write.as_raw_handle());
        let mut flags = Flags::new();

        let err = bind_with(
            |handle, inheritable| {
                if handle == write_handle {
                    Err(io::Error::from(io::ErrorKind::PermissionDenied))
                } else {
                    set_inheritable(handle, inheritable)
                }
            },
            &mut flags,
            &child_read,
            &child_write,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            PipeError::PlatformBinding {
                endpoint: ChildEndpoint::Write,
                ..
            }
        ));
        assert_eq!(flags, Flags::new());
        assert!(!is_inheritable(&child_read));
        assert!(!is_inheritable(&child_write));

        // Neither end was consumed: both pipes still carry bytes.
        parent_write.write_all(b"in").unwrap();
        let mut byte = [0u8; 2];
        (&child_read).read_exact(&mut byte).unwrap();
        assert_eq!(&byte, b"in");

        (&child_write).write_all(b"out").unwrap();
        drop(child_write);
        let mut buf = String::new();
        parent_read.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "out");
    }
}
