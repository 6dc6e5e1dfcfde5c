use thiserror::Error;

/// Protocol-level failures the sync engine distinguishes.
///
/// `DecryptFailure` is always field-scoped and recoverable: the caller skips
/// the field and keeps the previous local value. Pull-side remote errors
/// abort the session; push-side remote errors are recorded per step.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport/network failure — the backend could not be reached at all.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The backend answered with an application-level error payload.
    #[error("remote rejected request: {0}")]
    RemoteRejected(String),

    /// The secret codec could not recover a plaintext.
    #[error("decrypt failed: {0}")]
    DecryptFailure(String),

    /// A required field was missing, detected before any I/O.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Another sync session for this user is still in flight.
    #[error("a sync session is already in flight")]
    SessionInFlight,

    /// The local store failed to read or write.
    #[error("local store failure: {0}")]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::Store(err)
    }
}
