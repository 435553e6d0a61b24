//! Client for the document registration endpoint.

mod payload;
mod response;
mod submitter;
mod transport;

pub use payload::SubmissionRequest;
pub use response::{handle_response, SubmissionStats, SubmitOutcome};
pub use submitter::Submitter;
pub use transport::{parse_endpoint, HttpTransport, Transport, TransportResponse};
