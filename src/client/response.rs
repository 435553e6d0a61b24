//! Response handling and submission bookkeeping.

use serde::Serialize;
use tracing::{error, info};

use super::transport::TransportResponse;
use crate::error::Result;

/// Status code the registration endpoint returns for an accepted document.
const STATUS_OK: u16 = 200;

/// What happened to a single submission.
///
/// This is informational only. Rate limiting and transport problems are
/// reported here and in the log, never as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The endpoint answered 200
    Accepted { status: u16 },
    /// The endpoint answered with any other status
    Rejected { status: u16 },
    /// The request could not be delivered
    TransportFailed,
    /// The submitter was closed before the request was admitted
    Cancelled,
    /// The document could not be serialized; nothing was sent
    Unserializable,
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted { .. })
    }
}

/// Running totals for a submitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionStats {
    /// Requests that passed admission control
    pub admitted: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub unserializable: u64,
}

impl SubmissionStats {
    /// Count a finished submission.
    pub fn record(&mut self, outcome: SubmitOutcome) {
        match outcome {
            SubmitOutcome::Accepted { .. } => self.accepted += 1,
            SubmitOutcome::Rejected { .. } => self.rejected += 1,
            SubmitOutcome::TransportFailed => self.failed += 1,
            SubmitOutcome::Cancelled => self.cancelled += 1,
            SubmitOutcome::Unserializable => self.unserializable += 1,
        }
    }

    /// Submissions whose request completed, successfully or not.
    pub fn completed(&self) -> u64 {
        self.accepted + self.rejected + self.failed
    }
}

/// Turn a transport result into an outcome, logging it.
pub fn handle_response(result: Result<TransportResponse>) -> SubmitOutcome {
    match result {
        Ok(response) if response.status == STATUS_OK => {
            info!(status = response.status, body = %response.body, "Document accepted");
            SubmitOutcome::Accepted {
                status: response.status,
            }
        }
        Ok(response) => {
            error!(
                status = response.status,
                body = %response.body,
                "Failed with HTTP error {}",
                response.status
            );
            SubmitOutcome::Rejected {
                status: response.status,
            }
        }
        Err(e) => {
            error!(error = %e, "Request failed");
            SubmitOutcome::TransportFailed
        }
    }
}
