/// The pipe platform compiled in for this target.
#[cfg(unix)]
pub type NativePipePlatform = cdp_pipe_unix::UnixPipePlatform;

#[cfg(windows)]
pub type NativePipePlatform = cdp_pipe_windows::WindowsPipePlatform;

#[cfg(not(any(unix, windows)))]
compile_error!("Unsupported platform: only Unix and Windows are currently supported");

/// Platform-agnostic factory that selects the appropriate implementation at compile time
pub struct PlatformPipeFactory;

impl PlatformPipeFactory {
    pub fn create_platform() -> NativePipePlatform {
        #[cfg(unix)]
        {
            cdp_pipe_unix::UnixPipePlatformFactory::create_platform()
        }

        #[cfg(windows)]
        {
            cdp_pipe_windows::WindowsPipePlatformFactory::create_platform()
        }
    }

    pub fn platform_name() -> &'static str {
        #[cfg(unix)]
        {
            cdp_pipe_unix::UnixPipePlatformFactory::platform_name()
        }

        #[cfg(windows)]
        {
            cdp_pipe_windows::WindowsPipePlatformFactory::platform_name()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_pipe_core::PipePlatform;

    #[test]
    fn test_factory_matches_platform() {
        let platform = PlatformPipeFactory::create_platform();
        assert_eq!(platform.platform_name(), PlatformPipeFactory::platform_name());
    }
}
