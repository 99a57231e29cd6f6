//! Error types for mail-courier

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// DNS, TCP, TLS or timeout failure. Retryable by the caller.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Credentials were rejected by the server.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The server answered a command with an unexpected or non-success
    /// tagged response.
    #[error("{operation} failed at {stage}: {message}")]
    Protocol {
        operation: &'static str,
        stage: &'static str,
        message: String,
    },

    /// A folder or message is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation is refused by this crate before touching the
    /// server (protected folder, reserved name, ...).
    #[error("Refused by policy: {0}")]
    Policy(String),

    /// A multi-step operation committed an earlier step and then
    /// failed at `stage`.
    #[error("{operation} partially failed at {stage} (message {uid}): {message}")]
    PartialFailure {
        operation: &'static str,
        stage: &'static str,
        uid: String,
        message: String,
    },

    #[error("Email parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a `map_err` adapter for an IMAP command failure.
    ///
    /// Transport-level failures (I/O, dropped connection) become
    /// [`Error::Connectivity`], arguments refused before sending become
    /// [`Error::Policy`], and everything else is a [`Error::Protocol`]
    /// tagged with `operation` and `stage`.
    pub(crate) fn imap(
        operation: &'static str,
        stage: &'static str,
    ) -> impl FnOnce(async_imap::error::Error) -> Self {
        move |e| match e {
            async_imap::error::Error::Validate(v) => Self::Policy(format!("{operation}: {v}")),
            e if is_transport_failure(&e) => {
                Self::Connectivity(format!("{operation} ({stage}): {e}"))
            }
            e => Self::Protocol {
                operation,
                stage,
                message: e.to_string(),
            },
        }
    }

    /// True for errors a caller may retry without changing anything.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

/// I/O errors and lost connections, as opposed to `NO`/`BAD` replies.
pub(crate) const fn is_transport_failure(e: &async_imap::error::Error) -> bool {
    matches!(
        e,
        async_imap::error::Error::Io(_) | async_imap::error::Error::ConnectionLost
    )
}

/// A `NO`/`BAD` reply meaning the mailbox is already there.
pub(crate) fn is_already_exists(e: &async_imap::error::Error) -> bool {
    let text = e.to_string().to_ascii_lowercase();
    text.contains("alreadyexists") || text.contains("already exists")
}
