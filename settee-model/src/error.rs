use thiserror::Error;

/// Errors surfaced by database backends.
///
/// Read and write failures travel as in-band stream items so that a pipeline
/// consumer can keep going after a per-document failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid revision: {0}")]
    InvalidRevision(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("write failed: {0}")]
    WriteFailure(String),
}

impl DbError {
    /// True for errors that mean "this thing does not exist" rather than
    /// "something went wrong reaching it".
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }
}
