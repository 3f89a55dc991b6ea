use thiserror::Error;

/// Failure of a call to the RAG backend.
///
/// Transport errors, non-success statuses and undecodable bodies all collapse
/// into this one kind. `endpoint` and `reason` exist for the log only; callers
/// never branch on them.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request to {endpoint} failed: {reason}")]
    RequestFailed {
        endpoint: &'static str,
        reason: String,
    },
}

impl RequestError {
    pub fn failed(endpoint: &'static str, reason: impl ToString) -> Self {
        RequestError::RequestFailed {
            endpoint,
            reason: reason.to_string(),
        }
    }
}

pub type RequestResult<T> = std::result::Result<T, RequestError>;
