use spotfleet_common::{ErrorClass, QuotaShortfall, RequestError};
use thiserror::Error;

/// Batch-level aborts. Instance-level failures never surface here; they become
/// `Failed` records in the report.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("cannot prepare init payload '{source_ref}': {message}")]
    InitPayload { source_ref: String, message: String },

    #[error("quota preflight blocked the batch ({}); set force to override", join(.shortfalls))]
    QuotaBlocked { shortfalls: Vec<QuotaShortfall> },

    #[error("infrastructure step '{step}' failed [{class}]: {message}")]
    Infrastructure {
        step: &'static str,
        class: ErrorClass,
        message: String,
    },
}

fn join(shortfalls: &[QuotaShortfall]) -> String {
    shortfalls
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl OrchestratorError {
    /// Short machine tag for the aborted-batch JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::InvalidRequest(_) => "invalid-request",
            OrchestratorError::InitPayload { .. } => "init-payload",
            OrchestratorError::QuotaBlocked { .. } => "quota-blocked",
            OrchestratorError::Infrastructure { .. } => "infrastructure",
        }
    }
}
