use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Server error: status code {status_code}, message: {message}")]
    ServerError {
        status_code: u16,
        message: String,
    },

    #[error("Daemon error {code}: {message}")]
    Daemon {
        code: i64,
        message: String,
    },

    #[error("File too large: {size} bytes, limit is {limit}")]
    FileTooLarge {
        size: u64,
        limit: u64,
    },

    #[error("No upload server found")]
    NoUploadServer,

    #[error("Daemon returned no outputs")]
    NoOutputs,

    #[error("Daemon returned no output with a claim id")]
    NoClaim,

    #[error("No single file found for claim {claim}, got {count}")]
    ClaimNotFound {
        claim: String,
        count: usize,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown destination: {0}")]
    UnknownDestination(String),

    #[error("Record sink error: {0}")]
    Sink(String),

    #[error("Upload was cancelled")]
    Cancelled,
}

impl UploadError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status_code,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink(message.into())
    }

    /// Precondition failures are raised before any transfer request is made.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::FileTooLarge { .. } | Self::NoUploadServer)
    }
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
