use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Subprocess failed: {0}")]
    Subprocess(String),

    #[error("Unexpected status {status} from {url}")]
    UpstreamStatus { url: String, status: u16 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error is worth retrying on the owning drain's next
    /// iteration. Invalid input and missing files are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Error::InvalidInput(_) | Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
