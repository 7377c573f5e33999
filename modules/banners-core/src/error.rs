use thiserror::Error;

pub type Result<T> = std::result::Result<T, BannerError>;

#[derive(Error, Debug)]
pub enum BannerError {
    #[error("topic {0} is already being watched")]
    AlreadyWatched(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("event not found: {0}")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BannerError {
    /// True for fetches that raced with retirement. Watchers and recall skip
    /// these instead of surfacing them.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
