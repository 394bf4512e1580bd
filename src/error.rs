use thiserror::Error;

/// Everything that can abort the checker, plus the one kind that must not.
///
/// `Notify` is handled where it happens (the polling cycle logs it and moves
/// on); all other variants bubble up to `main` and terminate the process.
#[derive(Debug, Error)]
pub enum SlotCheckerError {
    #[error("there seems to be a problem with your configuration file: {0}")]
    Config(String),

    #[error("network error while logging in the Intra")]
    AuthNetwork(#[source] reqwest::Error),

    #[error("the sign-in page did not contain an authenticity token")]
    MissingToken,

    #[error("the Intra refused the sign-in: {0}")]
    AuthRejected(String),

    #[error("unable to retrieve available project slots")]
    SlotQuery(#[source] reqwest::Error),

    #[error("failed to deliver notification")]
    Notify(#[source] teloxide::RequestError),
}

impl SlotCheckerError {
    /// Refused logins get their own exit code; everything else exits 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            SlotCheckerError::AuthRejected(_) => 42,
            _ => 1,
        }
    }
}
