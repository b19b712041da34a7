use thiserror::Error;

/// Failures while resolving [`crate::config::Settings`]. Both are fatal at
/// startup.
#[derive(Debug, Error)]
pub enum Error {
    /// A required key is absent or a value has the wrong type.
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
