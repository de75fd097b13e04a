/// Crate-wide result type for portal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors surfaced by a [`PortalSink`](crate::PortalSink) implementation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation is currently unavailable (framework not ready).
    #[error("portal operation unavailable: {message}")]
    Unavailable { message: String },
}

impl Error {
    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }
}
