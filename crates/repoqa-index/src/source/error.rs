#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0} is a directory")]
    IsDirectory(String),

    #[error("cannot decode {path}: {reason}")]
    Decode { path: String, reason: String },

    /// Network failure, server error or rate limiting. Retrying later may succeed.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("unexpected HTTP status {status} for {resource}")]
    Status { status: u16, resource: String },

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("response body too large ({0} bytes)")]
    TooLarge(usize),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl SourceError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
