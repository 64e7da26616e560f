//! Error types for Lumen core.

use std::fmt;

/// The main error type for Lumen core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The callback context has shut down and no longer accepts invocations.
    ContextClosed,
    /// Failed to spawn a thread owned by the core runtime.
    ThreadSpawn(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContextClosed => {
                write!(f, "The callback context has shut down")
            }
            Self::ThreadSpawn(msg) => {
                write!(f, "Failed to spawn thread: {msg}")
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::ThreadSpawn(err.to_string())
    }
}

/// A specialized Result type for Lumen core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            CoreError::ContextClosed.to_string(),
            "The callback context has shut down"
        );
        let err = CoreError::ThreadSpawn("out of handles".into());
        assert_eq!(err.to_string(), "Failed to spawn thread: out of handles");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::other("no threads left");
        let err: CoreError = io.into();
        assert!(matches!(err, CoreError::ThreadSpawn(msg) if msg.contains("no threads left")));
    }
}
