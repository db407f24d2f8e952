//! Error types for the Consul sidecar

/// Errors raised while building the sidecar's registration from configuration
#[derive(thiserror::Error, Debug)]
pub enum SidecarError {
    #[error(
        "consul service ids must not be empty, must start with a letter, end with a letter or digit, \
         and have as interior characters only letters, digits, and hyphen: '{0}'"
    )]
    InvalidServiceName(String),

    #[error("invalid value for property '{key}': {message}")]
    InvalidProperty { key: String, message: String },

    #[error("registration customizer '{name}' failed: {source}")]
    Customizer {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, SidecarError>;
