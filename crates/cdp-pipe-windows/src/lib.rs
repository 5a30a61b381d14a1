//! Windows pipe binding: the child's pipe handles are made inheritable and
//! their values passed as `--remote-debugging-io-pipes=<read>,<write>`.

#[cfg(windows)]
mod windows_pipe_platform;

#[cfg(windows)]
pub use windows_pipe_platform::WindowsPipePlatform;

/// Windows pipe platform factory
pub struct WindowsPipePlatformFactory;

#[cfg(windows)]
impl WindowsPipePlatformFactory {
    pub fn create_platform() -> WindowsPipePlatform {
        WindowsPipePlatform
    }

    pub fn platform_name() -> &'static str {
        "Windows"
    }
}
