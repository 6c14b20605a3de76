use thiserror::Error;

#[derive(Debug, Error)]
pub enum LdscError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("ill-conditioned matrix: {0}")]
    IllConditioned(String),

    /// A filter or merge stage left too few rows to continue.
    #[error("{stage}: {message}")]
    EmptyStage { stage: String, message: String },

    /// An invariant the pipeline itself guarantees was broken. This is a bug,
    /// never a user error.
    #[error("internal error (this is a bug): {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LdscError {
    pub fn empty_stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmptyStage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

pub type Result<T> = std::result::Result<T, LdscError>;
