/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the responder and
/// the delivery loops can handle failures consistently (user-facing apology vs
/// redelivery vs abort).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),

    /// The provider refused the request and retrying will not help
    /// (bot blocked, chat gone, malformed message).
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("already running (pid {pid})")]
    AlreadyRunning { pid: i32 },

    #[error("not running")]
    NotRunning,
}

impl Error {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Error::Rejected(_) | Error::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
