/// Core error type.
///
/// Adapter crates map their specific errors into this type so the router can
/// decide between a registration redirect and a generic apology.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// No backend account is bound to the chat.
    #[error("user not found")]
    UserNotFound,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected backend payload: {0}")]
    Decode(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn is_user_not_found(&self) -> bool {
        matches!(self, Error::UserNotFound)
    }

    /// Backend, transport and decoding failures all look the same to a user.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Error::Backend { .. } | Error::Transport(_) | Error::Decode(_) | Error::Auth(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
