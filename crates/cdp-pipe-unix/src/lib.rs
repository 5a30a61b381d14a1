//! Unix pipe binding: the child finds its pipe ends at fds 3 and 4.

#[cfg(unix)]
mod unix_pipe_platform;

#[cfg(unix)]
pub use unix_pipe_platform::{CHILD_READ_FD, CHILD_WRITE_FD, UnixPipePlatform};

pub struct UnixPipePlatformFactory;

#[cfg(unix)]
impl UnixPipePlatformFactory {
    pub fn create_platform() -> UnixPipePlatform {
        UnixPipePlatform
    }

    pub fn platform_name() -> &'static str {
        "Unix"
    }
}
