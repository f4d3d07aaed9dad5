use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A server-encoded list field could not be decoded.
    #[error("Malformed `{field}` payload: {reason}")]
    Decode { field: String, reason: String },

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn decode(field: &str, reason: impl ToString) -> Self {
        Self::Decode { field: field.to_string(), reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
