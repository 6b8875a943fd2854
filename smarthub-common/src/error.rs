use thiserror::Error;

/// Common error type for Smart Hub components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Category of a [`DecodeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeErrorKind {
    /// An expected value was absent from the source document.
    MissingValue,
    /// The expected container or field shape is not present.
    Structure,
    /// A value is present but does not parse as its expected type.
    Format,
    /// Script evaluation exceeded its budget.
    Timeout,
}

impl DecodeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeErrorKind::MissingValue => "missing_value",
            DecodeErrorKind::Structure => "structure",
            DecodeErrorKind::Format => "format",
            DecodeErrorKind::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while decoding router payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Missing value: {0}")]
    MissingValue(String),

    #[error("Unexpected structure: {0}")]
    Structure(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Evaluation budget exceeded: {0}")]
    Timeout(String),
}

impl DecodeError {
    pub fn missing(msg: impl Into<String>) -> Self {
        Self::MissingValue(msg.into())
    }

    pub fn structure(msg: impl Into<String>) -> Self {
        Self::Structure(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// The category of this error.
    pub fn kind(&self) -> DecodeErrorKind {
        match self {
            Self::MissingValue(_) => DecodeErrorKind::MissingValue,
            Self::Structure(_) => DecodeErrorKind::Structure,
            Self::Format(_) => DecodeErrorKind::Format,
            Self::Timeout(_) => DecodeErrorKind::Timeout,
        }
    }
}

impl From<quick_xml::Error> for DecodeError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Format(format!("malformed XML: {}", err))
    }
}
