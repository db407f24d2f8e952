//! Client error types for the Consul agent client

/// Error type for Consul agent client operations
#[derive(Debug, thiserror::Error)]
pub enum ConsulClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid agent url: {0}")]
    Url(#[from] url::ParseError),

    #[error("agent url cannot be a base: {0}")]
    CannotBeABase(String),

    #[error("agent returned error: status={status}, message={message}")]
    Agent { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, ConsulClientError>;
