use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Network-level failure: connect, timeout, reset, body read.
    #[error("hostex transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status without a decodable API envelope.
    #[error("hostex HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The API envelope carried a non-success `error_code`.
    #[error("hostex API error {code}: {message}")]
    Api {
        code: String,
        message: String,
        request_id: Option<String>,
    },

    #[error("failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("unknown hostex login: {login_id}")]
    UnknownLogin { login_id: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unknown_login(login_id: impl Into<String>) -> Self {
        Self::UnknownLogin {
            login_id: login_id.into(),
        }
    }

    #[must_use]
    pub fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            context: context.into(),
            source,
        }
    }

    /// Whether retrying the same request later may succeed.
    ///
    /// Semantic API errors (expired subscription, bad token) are not
    /// transient; transport failures, 5xx and 429 are.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl hostex_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

hostex_common::impl_context!();
