use std::path::PathBuf;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error types raised while declaring, registering and documenting routes.
///
/// Everything here is a setup-time failure. Per-request failures are
/// [`ClientError`]s and never surface through this type.
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),
    ParseError { file: PathBuf, message: String },
    InvalidArgument(String),
    /// A route template that cannot be used (e.g. duplicate parameter names)
    InvalidTemplate { template: String, message: String },
    /// A handler declaration that could not be parsed
    InvalidSignature { signature: String, message: String },
    /// A route whose parameters or return type cannot be bound
    Registration { route: String, message: String },
    SerializationError(String),
}

impl Error {
    pub(crate) fn registration(route: &str, message: impl Into<String>) -> Self {
        Error::Registration {
            route: route.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "IO error: {}", e),
            Error::ParseError { file, message } => {
                write!(f, "Parse error in {}: {}", file.display(), message)
            }
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::InvalidTemplate { template, message } => {
                write!(f, "Invalid route template `{}`: {}", template, message)
            }
            Error::InvalidSignature { signature, message } => {
                write!(f, "Invalid handler signature `{}`: {}", signature, message)
            }
            Error::Registration { route, message } => {
                write!(f, "Cannot register route `{}`: {}", route, message)
            }
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(format!("YAML serialization error: {}", err))
    }
}

impl From<syn::Error> for Error {
    fn from(err: syn::Error) -> Self {
        Error::ParseError {
            file: PathBuf::from("<unknown>"),
            message: err.to_string(),
        }
    }
}

/// A recoverable per-request failure, rendered as a 4xx response.
///
/// Raised by adapters when a required value is missing, a value cannot be
/// coerced into its declared type, or a body arrives with the wrong content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    status: u16,
    message: String,
}

impl ClientError {
    /// 400 Bad Request
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            message: message.into(),
        }
    }

    /// 415 Unsupported Media Type
    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self {
            status: 415,
            message: message.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for ClientError {}
