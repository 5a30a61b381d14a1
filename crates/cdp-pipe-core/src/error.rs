use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which of the two pipes an operation was working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeDirection {
    /// Parent writes, child reads.
    ToChild,
    /// Child writes, parent reads.
    FromChild,
}

impl fmt::Display for PipeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipeDirection::ToChild => f.write_str("write"),
            PipeDirection::FromChild => f.write_str("read"),
        }
    }
}

/// One of the two child-side endpoints handed to the platform binder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEndpoint {
    Read,
    Write,
}

impl fmt::Display for ChildEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildEndpoint::Read => f.write_str("read"),
            ChildEndpoint::Write => f.write_str("write"),
        }
    }
}

/// Error types for pipe launching and pipe transport operations
#[derive(Error, Debug)]
pub enum PipeError {
    #[error("browser has already been launched")]
    AlreadyLaunched,

    #[error("failed to create {direction} pipe")]
    PipeCreation {
        direction: PipeDirection,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to make {endpoint} handle inheritable")]
    PlatformBinding {
        endpoint: ChildEndpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn {}", .bin.display())]
    Spawn {
        bin: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to kill process {pid}")]
    Kill {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("pipe transport I/O error")]
    Transport(#[source] std::io::Error),

    #[error("pipe transport is closed")]
    TransportClosed,

    #[error("pipe closed before message delimiter ({discarded} bytes discarded)")]
    UnexpectedEof { discarded: usize },

    #[error("no browser executable configured or found on PATH")]
    MissingBinary,

    #[error("failed to write browser preferences: {0}")]
    Preferences(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipeError {
    /// Errors raised before anything was spawned. Every endpoint allocated
    /// for the attempt has already been closed when one of these surfaces.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            PipeError::PipeCreation { .. }
                | PipeError::PlatformBinding { .. }
                | PipeError::Spawn { .. }
                | PipeError::MissingBinary
                | PipeError::Preferences(_)
                | PipeError::Configuration(_)
        )
    }

    /// Errors raised by a transport after spawn. The transport is closed.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            PipeError::Transport(_) | PipeError::TransportClosed | PipeError::UnexpectedEof { .. }
        )
    }

    /// Launching twice on the same launcher.
    pub fn is_misuse(&self) -> bool {
        matches!(self, PipeError::AlreadyLaunched)
    }

    /// The OS error underneath, if there is one.
    pub fn io_error(&self) -> Option<&std::io::Error> {
        match self {
            PipeError::PipeCreation { source, .. }
            | PipeError::PlatformBinding { source, .. }
            | PipeError::Spawn { source, .. }
            | PipeError::Kill { source, .. }
            | PipeError::Transport(source) => Some(source),
            _ => None,
        }
    }
}

/// Result type alias using PipeError.
pub type Result<T> = std::result::Result<T, PipeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_error_display() {
        let error = PipeError::PipeCreation {
            direction: PipeDirection::FromChild,
            source: io::Error::other("too many open files"),
        };
        assert_eq!(format!("{error}"), "failed to create read pipe");
        assert_eq!(
            error.source().map(|source| source.to_string()),
            Some("too many open files".to_string())
        );

        let error = PipeError::PlatformBinding {
            endpoint: ChildEndpoint::Write,
            source: io::Error::other("denied"),
        };
        assert!(format!("{error}").contains("make write handle inheritable"));

        let error = PipeError::UnexpectedEof { discarded: 3 };
        assert!(format!("{error}").contains("3 bytes discarded"));
    }

    #[test]
    fn test_source_is_not_repeated_in_chain() {
        let error = PipeError::Transport(io::Error::other("broken pipe"));
        let chained = format!("{:#}", anyhow::Error::new(error));
        assert_eq!(chained, "pipe transport I/O error: broken pipe");
        assert_eq!(chained.matches("broken pipe").count(), 1);

        let error = PipeError::Spawn {
            bin: PathBuf::from("/opt/browser"),
            source: io::Error::other("not found"),
        };
        let chained = format!("{:#}", anyhow::Error::new(error));
        assert_eq!(chained, "failed to spawn /opt/browser: not found");
    }

    #[test]
    fn test_error_categorization() {
        assert!(
            PipeError::PipeCreation {
                direction: PipeDirection::ToChild,
                source: io::Error::other("x"),
            }
            .is_setup_error()
        );
        assert!(
            PipeError::Spawn {
                bin: PathBuf::from("/nope"),
                source: io::Error::from(io::ErrorKind::NotFound),
            }
            .is_setup_error()
        );
        assert!(PipeError::TransportClosed.is_transport_error());
        assert!(PipeError::UnexpectedEof { discarded: 0 }.is_transport_error());
        assert!(PipeError::AlreadyLaunched.is_misuse());

        assert!(!PipeError::AlreadyLaunched.is_setup_error());
        assert!(!PipeError::TransportClosed.is_setup_error());
        assert!(!PipeError::MissingBinary.is_transport_error());
    }

    #[test]
    fn test_io_error_is_preserved() {
        let error = PipeError::Transport(io::Error::from(io::ErrorKind::BrokenPipe));
        assert_eq!(
            error.io_error().map(|e| e.kind()),
            Some(io::ErrorKind::BrokenPipe)
        );
        assert!(PipeError::TransportClosed.io_error().is_none());
    }

    #[test]
    fn test_error_debug_format() {
        let error = PipeError::Configuration("conflicting flags".to_string());
        let debug_str = format!("{error:?}");
        assert!(debug_str.contains("Configuration"));
        assert!(debug_str.contains("conflicting flags"));
    }
}
