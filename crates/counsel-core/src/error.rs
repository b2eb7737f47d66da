use thiserror::Error;

/// Anything that went wrong while calling `/query` or `/draft`.
///
/// The session treats every variant the same way; the split only exists so
/// logs say what actually happened.
#[derive(Debug, Error)]
pub enum DispatchFailure {
    #[error("could not reach the server: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("server replied with status {0}")]
    Status(u16),

    #[error("malformed reply: {0}")]
    Malformed(String),

    #[error("request task did not finish: {0}")]
    Interrupted(String),
}

impl From<reqwest::Error> for DispatchFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DispatchFailure::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            DispatchFailure::Status(status.as_u16())
        } else {
            DispatchFailure::Transport(err)
        }
    }
}

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),

    #[error("clipboard write failed: {0}")]
    Write(String),
}
