use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by an external collaborator.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("storage error: {0}")]
    Storage(#[source] BoxError),

    #[error("upstream service error: {0}")]
    Upstream(#[source] BoxError),

    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout {
        operation: &'static str,
        timeout_secs: u64,
    },
}

impl PortError {
    pub fn storage(err: impl Into<BoxError>) -> Self {
        PortError::Storage(err.into())
    }

    pub fn upstream(err: impl Into<BoxError>) -> Self {
        PortError::Upstream(err.into())
    }
}

/// The single unrecoverable error returned by an on-demand pipeline call.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid cid: must not be empty")]
    InvalidCid,

    #[error("no profile stored for cid {0}")]
    NoProfile(String),

    #[error("failed to list candidates: {0}")]
    CandidateListing(#[source] PortError),

    #[error("push to {0} was rejected")]
    PushRejected(String),

    #[error(transparent)]
    Port(#[from] PortError),
}
