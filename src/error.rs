use thiserror::Error;

/// The two failure families an analysis can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Detected before any outbound request is built.
    Precondition,
    /// Raised by the remote call or while consuming its stream.
    Remote,
}

#[derive(Debug, Error)]
pub enum AnalystError {
    #[error("No image was uploaded")]
    MissingImage,
    #[error("No API credential is configured")]
    MissingCredential,
    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Request error: {0}")]
    RequestError(String),
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("Response error: {0}")]
    ResponseError(String),
    #[error("Stream error: {0}")]
    StreamError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AnalystError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalystError::MissingImage
            | AnalystError::MissingCredential
            | AnalystError::UnsupportedImage(_)
            | AnalystError::ConfigError(_) => ErrorKind::Precondition,
            _ => ErrorKind::Remote,
        }
    }

    /// HTTP status returned by the endpoint, when the failure carried one.
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            AnalystError::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AnalystError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => AnalystError::ApiError {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => AnalystError::RequestError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for AnalystError {
    fn from(e: serde_json::Error) -> Self {
        AnalystError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalystError>;
