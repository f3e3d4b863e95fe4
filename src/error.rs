use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// `Validation` and `NotFound` are caller-correctable (4xx-equivalent);
/// `Database` is an internal fault (5xx-equivalent). Webhook transport
/// failures never appear here: they are retried and then recorded in
/// delivery state, not surfaced to the triggering caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid input: bad batch size, bad date range, malformed item.
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage adapter failure. Retryable from the caller's side.
    #[error("database error: {0}")]
    Database(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
