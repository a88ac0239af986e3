use std::fmt;

use thiserror::Error;

/// Which resource ran out when a run was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Memory,
    FileTooLarge,
    Timeout,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Memory => "memory exhausted",
            ResourceKind::FileTooLarge => "file too large",
            ResourceKind::Timeout => "timed out",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum SqueezeError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Input is encrypted")]
    Encrypted,

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(ResourceKind),

    #[error("Page {index} failed: {reason}")]
    PageFailure { index: usize, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("PDF read error: {0}")]
    PdfReadError(String),

    #[error("PDF write error: {0}")]
    PdfWriteError(String),

    #[error("Encode error: {0}")]
    EncodeError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Coarse failure classes consumed by the recovery planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    MemoryExhausted,
    Timeout,
    Encrypted,
    FileTooLarge,
    InvalidInput,
    Cancelled,
    AccessDenied,
    Other,
}

/// Generates factory methods for [`SqueezeError`] variants that wrap a `String`.
macro_rules! error_constructors {
    ($(
        $(#[doc = $doc:expr])*
        $method:ident => $variant:ident
    ),* $(,)?) => {
        impl SqueezeError {
            $(
                $(#[doc = $doc])*
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    /// Create an access denied error.
    access_denied => AccessDenied,
    /// Create an invalid input error.
    invalid_input => InvalidInput,
    /// Create a configuration error.
    config => ConfigError,
    /// Create a PDF read error.
    pdf_read => PdfReadError,
    /// Create a PDF write error.
    pdf_write => PdfWriteError,
    /// Create an encode error.
    encode => EncodeError,
    /// Create an error wrapping an unclassified cause.
    unknown => Unknown,
}

impl SqueezeError {
    pub fn page_failure(index: usize, reason: impl Into<String>) -> Self {
        Self::PageFailure {
            index,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            SqueezeError::AccessDenied(_) => FailureKind::AccessDenied,
            SqueezeError::InvalidInput(_) | SqueezeError::PdfReadError(_) => {
                FailureKind::InvalidInput
            }
            SqueezeError::Encrypted => FailureKind::Encrypted,
            SqueezeError::ResourceExhausted(ResourceKind::Memory) => FailureKind::MemoryExhausted,
            SqueezeError::ResourceExhausted(ResourceKind::FileTooLarge) => {
                FailureKind::FileTooLarge
            }
            SqueezeError::ResourceExhausted(ResourceKind::Timeout) => FailureKind::Timeout,
            SqueezeError::Cancelled => FailureKind::Cancelled,
            SqueezeError::IoError(e) => match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    FailureKind::AccessDenied
                }
                std::io::ErrorKind::TimedOut => FailureKind::Timeout,
                std::io::ErrorKind::OutOfMemory => FailureKind::MemoryExhausted,
                _ => FailureKind::Other,
            },
            SqueezeError::PageFailure { .. }
            | SqueezeError::ConfigError(_)
            | SqueezeError::PdfWriteError(_)
            | SqueezeError::EncodeError(_)
            | SqueezeError::Unknown(_) => FailureKind::Other,
        }
    }

    /// Map an IO error raised while opening an input into the access taxonomy.
    pub(crate) fn from_open_error(path: &std::path::Path, e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                Self::AccessDenied(format!("{}: {e}", path.display()))
            }
            _ => Self::IoError(e),
        }
    }
}

impl From<lopdf::Error> for SqueezeError {
    fn from(e: lopdf::Error) -> Self {
        Self::PdfReadError(e.to_string())
    }
}

impl From<serde_json::Error> for SqueezeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Unknown(e.to_string())
    }
}

impl From<serde_yml::Error> for SqueezeError {
    fn from(e: serde_yml::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

impl From<image::ImageError> for SqueezeError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::Limits(_) => Self::ResourceExhausted(ResourceKind::Memory),
            image::ImageError::Decoding(_) | image::ImageError::Unsupported(_) => {
                Self::InvalidInput(e.to_string())
            }
            other => Self::EncodeError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SqueezeError>;
