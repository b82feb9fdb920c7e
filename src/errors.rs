use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("ceremony {0} does not exist")]
    CeremonyMissing(String),

    #[error("ceremony {0} is not closed")]
    CeremonyNotClosed(String),

    #[error("circuit {0} does not exist")]
    CircuitMissing(String),

    #[error("no circuit at sequence position {0}")]
    CircuitPositionMissing(u64),

    #[error("command {0} failed on worker {1}")]
    CommandFailed(String, String),

    #[error("command {0} timed out on worker {1}")]
    CommandTimedOut(String, String),

    #[error("contribution {0} does not exist")]
    ContributionMissing(String),

    #[error("document at {0} already exists")]
    DocumentAlreadyExists(String),

    #[error("document at {0} does not exist")]
    DocumentMissing(String),

    #[error("document at {0} holds a different kind of object")]
    DocumentKindMismatch(String),

    #[error("circuit {0} has no final contribution")]
    FinalContributionMissing(String),

    #[error("{0}: {1}")]
    Crate(&'static str, String),

    #[error("request is missing the {0} input")]
    MissingInput(&'static str),

    #[error("request carries no authentication principal")]
    MissingAuthentication,

    #[error("the {0} environment variable is not set")]
    MissingVerificationSoftware(&'static str),

    #[error("participant {0} does not exist")]
    ParticipantMissing(String),

    #[error("participant {0} is not contributing")]
    ParticipantNotContributing(String),

    #[error("participant {0} is not finalizing the ceremony")]
    ParticipantNotFinalizing(String),

    #[error("participant {0} is not at the head of the waiting queue")]
    QueueHeadMismatch(String),

    #[error("expected exactly one pending contribution record, found {0}")]
    PendingContributionAmbiguous(usize),

    #[error("role {0} is not authorized for this operation")]
    UnauthorizedRole(String),

    #[error("worker {0} failed to start")]
    WorkerStartFailed(String),

    #[error("worker {0} is unavailable: {1}")]
    WorkerUnavailable(String, String),

    #[error("storage conflict: {0}")]
    StorageConflict(String),
}

impl From<std::io::Error> for CoordinatorError {
    fn from(error: std::io::Error) -> Self {
        CoordinatorError::Crate("std::io", format!("{:?}", error))
    }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(error: serde_json::Error) -> Self {
        CoordinatorError::Crate("serde_json", format!("{:?}", error))
    }
}

impl CoordinatorError {
    /// Returns `true` if the error may succeed on retry, per the platform's
    /// retry policy for trigger handlers.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoordinatorError::StorageConflict(_))
    }
}
