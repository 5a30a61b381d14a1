//! Launch a browser with its debugging protocol on a pair of pipes.
//!
//! ```no_run
//! # async fn run() -> cdp_pipe::Result<()> {
//! let launcher = cdp_pipe::Launcher::new_pipe_mode();
//! let (transport, process) = launcher.launch_pipe().await?;
//! transport.send(br#"{"id":1,"method":"Browser.getVersion"}"#).await?;
//! let reply = transport.receive().await?;
//! # let _ = reply;
//! transport.close().await?;
//! process.kill().await?;
//! # Ok(())
//! # }
//! ```

mod launcher;
mod platform_factory;
mod rollback;

pub use launcher::Launcher;
pub use platform_factory::{NativePipePlatform, PlatformPipeFactory};

// Re-export core functionality
pub use cdp_pipe_core::*;
