//! cdp-pipe core - platform-independent pieces of the pipe launcher
//!
//! This crate provides the launch configuration, the [`PipePlatform`]
//! contract implemented once per OS, the null-byte framed [`PipeTransport`]
//! and the [`ProcessHandle`] that observes the browser's exit.

mod config;
mod error;
pub mod flags;
mod platform;
mod process;
mod transport;

pub use config::*;
pub use error::*;
pub use flags::Flags;
pub use platform::*;
pub use process::*;
pub use transport::*;
