//! Error types and handling for animbatch

use std::path::PathBuf;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for animbatch operations
pub type Result<T> = std::result::Result<T, AnimBatchError>;

/// Main error type for animbatch operations
#[derive(Debug, Error)]
pub enum AnimBatchError {
    /// Source file cannot be opened or its metadata cannot be decoded
    #[error("Cannot read source image: {message} (file: {file:?})")]
    SourceUnreadable {
        message: String,
        file: Option<PathBuf>,
    },

    /// Resize or encode of the animation failed
    #[error("Transform failed: {message} (file: {file:?})")]
    TransformFailure {
        message: String,
        file: Option<PathBuf>,
    },

    /// Writing the result to the destination failed
    #[error("Cannot write destination file {file:?}: {source}")]
    DestinationWriteFailure {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O errors outside of a single item (directory setup, listing)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Invalid transform parameters
    #[error("Invalid transform parameters: {message}")]
    InvalidParameters { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerdeError(String),

    /// A dispatched task panicked or was aborted
    #[error("Dispatch error: {message}")]
    DispatchError { message: String },
}

/// Classification of a per-item failure, as surfaced in batch reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceUnreadable,
    TransformFailure,
    DestinationWriteFailure,
    Internal,
}

impl AnimBatchError {
    /// Create a new source-unreadable error
    pub fn source_unreadable<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::SourceUnreadable {
            message: message.into(),
            file,
        }
    }

    /// Create a new transform error
    pub fn transform<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::TransformFailure {
            message: message.into(),
            file,
        }
    }

    /// Create a new destination write error
    pub fn destination_write(file: PathBuf, source: std::io::Error) -> Self {
        Self::DestinationWriteFailure { file, source }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new invalid parameters error
    pub fn invalid_parameters<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Create a new dispatch error
    pub fn dispatch<S: Into<String>>(message: S) -> Self {
        Self::DispatchError {
            message: message.into(),
        }
    }

    /// Classify this error for per-item reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceUnreadable { .. } => ErrorKind::SourceUnreadable,
            Self::TransformFailure { .. } | Self::InvalidParameters { .. } => {
                ErrorKind::TransformFailure
            }
            Self::DestinationWriteFailure { .. } => ErrorKind::DestinationWriteFailure,
            Self::IoError(_)
            | Self::ConfigError { .. }
            | Self::SerdeError(_)
            | Self::DispatchError { .. } => ErrorKind::Internal,
        }
    }

    /// Whether this error belongs to a single work item rather than the whole run
    pub fn is_item_failure(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Internal)
    }

    /// Get the associated file path if available
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Self::SourceUnreadable { file, .. } | Self::TransformFailure { file, .. } => {
                file.as_ref()
            }
            Self::DestinationWriteFailure { file, .. } => Some(file),
            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::SourceUnreadable { message, .. } => {
                format!("Source image could not be read: {}", message)
            }
            Self::TransformFailure { message, .. } => {
                format!("Animation could not be resized or encoded: {}", message)
            }
            Self::DestinationWriteFailure { source, .. } => {
                format!("Result could not be written: {}", source)
            }
            other => other.to_string(),
        }
    }
}

impl From<toml::de::Error> for AnimBatchError {
    fn from(err: toml::de::Error) -> Self {
        Self::SerdeError(format!("TOML parsing error: {}", err))
    }
}

impl From<serde_yaml::Error> for AnimBatchError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerdeError(format!("YAML parsing error: {}", err))
    }
}

impl From<tokio::task::JoinError> for AnimBatchError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::dispatch(format!("Task join error: {}", err))
    }
}

impl From<tokio::sync::AcquireError> for AnimBatchError {
    fn from(err: tokio::sync::AcquireError) -> Self {
        Self::dispatch(format!("Could not acquire a dispatch slot: {}", err))
    }
}

/// Error context extension for adding file path information
pub trait ErrorContext<T> {
    /// Add file context to an error
    fn with_file_context(self, file: PathBuf) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AnimBatchError>,
{
    fn with_file_context(self, file: PathBuf) -> Result<T> {
        self.map_err(|e| {
            let mut error = e.into();

            match &mut error {
                AnimBatchError::SourceUnreadable { file: ref mut f, .. }
                | AnimBatchError::TransformFailure { file: ref mut f, .. } => {
                    if f.is_none() {
                        *f = Some(file);
                    }
                }
                _ => {}
            }

            error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AnimBatchError::source_unreadable("bad header", None).kind(),
            ErrorKind::SourceUnreadable
        );
        assert_eq!(
            AnimBatchError::transform("encode", None).kind(),
            ErrorKind::TransformFailure
        );
        let write = AnimBatchError::destination_write(
            PathBuf::from("out/a.gif"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(write.kind(), ErrorKind::DestinationWriteFailure);
        assert!(write.is_item_failure());
        assert!(!AnimBatchError::config("nope").is_item_failure());
    }

    #[tokio::test]
    async fn test_closed_semaphore_is_dispatch_error() {
        let semaphore = tokio::sync::Semaphore::new(1);
        semaphore.close();

        let err = AnimBatchError::from(semaphore.acquire().await.unwrap_err());
        assert!(matches!(err, AnimBatchError::DispatchError { .. }));
        assert!(!err.is_item_failure());
    }

    #[test]
    fn test_user_messages() {
        let err = AnimBatchError::transform("frame size mismatch", None);
        assert!(err.user_message().contains("frame size mismatch"));
    }

    #[test]
    fn test_file_context() {
        let result: Result<()> = Err(AnimBatchError::source_unreadable("truncated", None));
        let err = result
            .with_file_context(PathBuf::from("a.gif"))
            .unwrap_err();
        assert_eq!(err.file_path(), Some(&PathBuf::from("a.gif")));

        // An existing path is kept
        let result: Result<()> = Err(AnimBatchError::transform("x", Some(PathBuf::from("b.gif"))));
        let err = result.with_file_context(PathBuf::from("c.gif")).unwrap_err();
        assert_eq!(err.file_path(), Some(&PathBuf::from("b.gif")));
    }
}
